use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use procura_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "outreach.company_name",
        &config.outreach.company_name,
        source("outreach.company_name", "PROCURA_OUTREACH_COMPANY_NAME"),
    ));
    lines.push(render_line(
        "outreach.contact_person",
        &config.outreach.contact_person,
        source("outreach.contact_person", "PROCURA_OUTREACH_CONTACT_PERSON"),
    ));
    lines.push(render_line(
        "outreach.overall_timeout_secs",
        &config.outreach.overall_timeout_secs.to_string(),
        source("outreach.overall_timeout_secs", "PROCURA_OUTREACH_OVERALL_TIMEOUT_SECS"),
    ));
    lines.push(render_line(
        "outreach.poll_interval_secs",
        &config.outreach.poll_interval_secs.to_string(),
        source("outreach.poll_interval_secs", "PROCURA_OUTREACH_POLL_INTERVAL_SECS"),
    ));
    lines.push(render_line(
        "outreach.max_follow_ups",
        &config.outreach.max_follow_ups.to_string(),
        source("outreach.max_follow_ups", "PROCURA_OUTREACH_MAX_FOLLOW_UPS"),
    ));
    let field_names: Vec<&str> =
        config.outreach.fields.iter().map(|entry| entry.name.as_str()).collect();
    lines.push(render_line(
        "outreach.fields",
        &field_names.join(", "),
        source("outreach.fields", "PROCURA_OUTREACH_FIELDS"),
    ));

    match &config.email {
        Some(email) => {
            lines.push(render_line(
                "email.smtp_host",
                &format!("{}:{}", email.smtp_host, email.smtp_port),
                source("email.smtp_host", "PROCURA_EMAIL_SMTP_HOST"),
            ));
            lines.push(render_line(
                "email.imap_host",
                &format!("{}:{}", email.imap_host, email.imap_port),
                source("email.imap_host", "PROCURA_EMAIL_IMAP_HOST"),
            ));
            lines.push(render_line(
                "email.username",
                &email.username,
                source("email.username", "PROCURA_EMAIL_USERNAME"),
            ));
            lines.push(render_line(
                "email.password",
                "<redacted>",
                source("email.password", "PROCURA_EMAIL_PASSWORD"),
            ));
            lines.push(render_line(
                "email.mailbox",
                &email.mailbox,
                source("email.mailbox", "PROCURA_EMAIL_MAILBOX"),
            ));
        }
        None => lines.push("- email = <unset> (channel disabled)".to_string()),
    }

    match &config.telegram {
        Some(telegram) => {
            lines.push(render_line(
                "telegram.bot_token",
                "<redacted>",
                source("telegram.bot_token", "PROCURA_TELEGRAM_BOT_TOKEN"),
            ));
            lines.push(render_line(
                "telegram.api_base_url",
                &telegram.api_base_url,
                source("telegram.api_base_url", "PROCURA_TELEGRAM_API_BASE_URL"),
            ));
        }
        None => lines.push("- telegram = <unset> (channel disabled)".to_string()),
    }

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", "PROCURA_LLM_PROVIDER"),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", "PROCURA_LLM_MODEL"),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", "PROCURA_LLM_BASE_URL"),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", "PROCURA_LLM_API_KEY"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "PROCURA_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "PROCURA_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("procura.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/procura.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
