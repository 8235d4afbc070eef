use std::env;
use std::io::Write;
use std::sync::{Mutex, OnceLock};

use procura_cli::commands::{config, doctor, run};
use serde_json::Value;

#[test]
fn run_fails_cleanly_on_missing_roster() {
    with_env(&[], || {
        let result = run::run(run::RunArgs {
            roster: "does-not-exist.json".into(),
            channel: None,
            out: None,
            config: None,
            timeout_secs: None,
            poll_interval_secs: None,
            log_level: None,
            dry_run: false,
        });
        assert_eq!(result.exit_code, 2, "expected roster failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "roster");
    });
}

#[test]
fn run_fails_when_explicit_config_file_is_missing() {
    with_env(&[], || {
        let result = run::run(run::RunArgs {
            roster: "does-not-exist.json".into(),
            channel: None,
            out: None,
            config: Some("no-such-config.toml".into()),
            timeout_secs: None,
            poll_interval_secs: None,
            log_level: None,
            dry_run: false,
        });
        assert_eq!(result.exit_code, 2, "expected config failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn run_refuses_roster_channels_with_no_adapter() {
    with_env(&[("PROCURA_TELEGRAM_BOT_TOKEN", "123456:test-secret")], || {
        let mut roster_file =
            tempfile::NamedTempFile::new().expect("temp roster file should be creatable");
        write!(
            roster_file,
            r#"{{"suppliers": [{{"name": "Acme", "contact": "sales@acme.example"}}]}}"#
        )
        .expect("roster file should be writable");

        let result = run::run(run::RunArgs {
            roster: roster_file.path().to_path_buf(),
            channel: None,
            out: None,
            config: None,
            timeout_secs: None,
            poll_interval_secs: None,
            log_level: None,
            dry_run: false,
        });
        assert_eq!(result.exit_code, 2, "expected preflight failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "configuration");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("email"), "message should name the missing channel: {message}");
    });
}

#[test]
fn dry_run_walks_the_loop_and_writes_a_report() {
    // No timeout overrides: the dry run must finish quickly even with the
    // default fifteen-minute outreach deadline.
    with_env(&[], || {
        let mut roster_file =
            tempfile::NamedTempFile::new().expect("temp roster file should be creatable");
        write!(
            roster_file,
            r#"{{"suppliers": [{{"name": "Acme", "contact": "sales@acme.example"}}]}}"#
        )
        .expect("roster file should be writable");
        let out_file =
            tempfile::NamedTempFile::new().expect("temp report file should be creatable");

        let started = std::time::Instant::now();
        let result = run::run(run::RunArgs {
            roster: roster_file.path().to_path_buf(),
            channel: None,
            out: Some(out_file.path().to_path_buf()),
            config: None,
            timeout_secs: None,
            poll_interval_secs: None,
            log_level: None,
            dry_run: true,
        });
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        assert!(
            started.elapsed() < std::time::Duration::from_secs(30),
            "dry run should not wait out the configured deadline"
        );

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("1 suppliers"), "summary should count the roster: {message}");

        let report: Value = serde_json::from_str(
            &std::fs::read_to_string(out_file.path()).expect("report should be written"),
        )
        .expect("report should be valid JSON");
        assert_eq!(report["reports"][0]["status"]["outcome"], "timed_out");
    });
}

#[test]
fn run_rejects_an_unknown_channel_filter() {
    with_env(&[], || {
        let mut roster_file =
            tempfile::NamedTempFile::new().expect("temp roster file should be creatable");
        write!(
            roster_file,
            r#"{{"suppliers": [{{"name": "Acme", "contact": "sales@acme.example"}}]}}"#
        )
        .expect("roster file should be writable");

        let result = run::run(run::RunArgs {
            roster: roster_file.path().to_path_buf(),
            channel: Some("fax".to_string()),
            out: None,
            config: None,
            timeout_secs: None,
            poll_interval_secs: None,
            log_level: None,
            dry_run: false,
        });
        assert_eq!(result.exit_code, 2, "expected usage failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "configuration");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("fax"), "message should echo the bad channel: {message}");
    });
}

#[test]
fn doctor_fails_without_any_channel_configured() {
    with_env(&[], || {
        let output = doctor::run(true);
        let payload = parse_payload(&output);
        assert_eq!(payload["overall_status"], "fail");

        let checks = payload["checks"].as_array().expect("doctor report should list checks");
        let adapters = checks
            .iter()
            .find(|check| check["name"] == "channel_adapters")
            .expect("channel adapter check should be present");
        assert_eq!(adapters["status"], "fail");
    });
}

#[test]
fn doctor_passes_with_one_channel_configured() {
    with_env(&[("PROCURA_TELEGRAM_BOT_TOKEN", "123456:test-secret")], || {
        let output = doctor::run(true);
        let payload = parse_payload(&output);
        assert_eq!(payload["overall_status"], "pass", "unexpected report: {output}");
    });
}

#[test]
fn config_redacts_secrets_and_names_sources() {
    with_env(
        &[
            ("PROCURA_TELEGRAM_BOT_TOKEN", "123456:test-secret"),
            ("PROCURA_LLM_MODEL", "llama3.2"),
        ],
        || {
            let output = config::run();
            assert!(output.contains("telegram.bot_token = <redacted>"));
            assert!(!output.contains("test-secret"));
            assert!(output.contains("llm.model = llama3.2 (source: env (PROCURA_LLM_MODEL))"));
            assert!(output.contains("outreach.company_name = XYZ Company (source: default)"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PROCURA_OUTREACH_COMPANY_NAME",
        "PROCURA_OUTREACH_CONTACT_PERSON",
        "PROCURA_OUTREACH_OVERALL_TIMEOUT_SECS",
        "PROCURA_OUTREACH_POLL_INTERVAL_SECS",
        "PROCURA_OUTREACH_MAX_FOLLOW_UPS",
        "PROCURA_EMAIL_SMTP_HOST",
        "PROCURA_EMAIL_SMTP_PORT",
        "PROCURA_EMAIL_IMAP_HOST",
        "PROCURA_EMAIL_IMAP_PORT",
        "PROCURA_EMAIL_USERNAME",
        "PROCURA_EMAIL_PASSWORD",
        "PROCURA_EMAIL_FROM_ADDRESS",
        "PROCURA_TELEGRAM_BOT_TOKEN",
        "PROCURA_TELEGRAM_API_BASE_URL",
        "PROCURA_LLM_PROVIDER",
        "PROCURA_LLM_API_KEY",
        "PROCURA_LLM_BASE_URL",
        "PROCURA_LLM_MODEL",
        "PROCURA_LLM_TIMEOUT_SECS",
        "PROCURA_LLM_MAX_RETRIES",
        "PROCURA_LOGGING_LEVEL",
        "PROCURA_LOGGING_FORMAT",
        "PROCURA_LOG_LEVEL",
        "PROCURA_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
