use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use procura_agent::{
    cancel_pair, BatchRunner, HttpLlmClient, LlmFieldExtractor, LoopSettings, MessageTemplates,
    OutreachLoop,
};
use procura_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use procura_core::{ApplicationError, BatchReport, Channel, SupplierRoster};
use procura_transport::{
    ChannelRouter, EmailTransport, NoopTransport, TelegramTransport, Transport,
};

use super::CommandResult;

const COMMAND: &str = "run";
const DRY_RUN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct RunArgs {
    pub roster: PathBuf,
    pub channel: Option<String>,
    pub out: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub log_level: Option<String>,
    pub dry_run: bool,
}

pub fn run(args: RunArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path: args.config.clone(),
        require_file: args.config.is_some(),
        overrides: ConfigOverrides {
            log_level: args.log_level.clone(),
            overall_timeout_secs: args.timeout_secs,
            poll_interval_secs: args.poll_interval_secs,
            ..ConfigOverrides::default()
        },
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2);
        }
    };
    init_logging(&config);

    let schema = match config.outreach.schema() {
        Ok(schema) => schema,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2);
        }
    };

    let mut roster = match load_roster(&args.roster) {
        Ok(roster) => roster,
        Err(error) => return CommandResult::failure(COMMAND, "roster", format!("{error:#}"), 2),
    };
    if let Some(raw) = &args.channel {
        let channel = match raw.parse::<Channel>() {
            Ok(channel) => channel,
            Err(error) => {
                return abort(ApplicationError::Configuration(error.to_string()));
            }
        };
        roster = roster.restricted_to(channel);
    }

    let templates = MessageTemplates::from_config(&config.outreach);
    let router = match build_router(&config, &roster, &templates, args.dry_run) {
        Ok(router) => router,
        Err(error) => return abort(ApplicationError::Configuration(format!("{error:#}"))),
    };

    let llm = match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => return abort(ApplicationError::Configuration(error.to_string())),
    };

    let mut settings = LoopSettings::from_config(&config.outreach);
    if args.dry_run {
        // A dry run has no inbound channel, so every supplier rides out the
        // deadline; clamp it so validation finishes in about a second per
        // supplier instead of the configured timeout.
        settings.overall_timeout = settings.overall_timeout.min(DRY_RUN_TIMEOUT);
        settings.poll_interval = settings.poll_interval.min(DRY_RUN_TIMEOUT);
    }

    let runner = BatchRunner::new(OutreachLoop::new(
        Arc::new(router),
        Arc::new(LlmFieldExtractor::new(llm)),
        templates,
        settings,
    ));

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            );
        }
    };

    let report = runtime.block_on(async {
        let (handle, signal) = cancel_pair();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(event_name = "run.interrupted", "interrupt received; finishing up");
                handle.cancel();
            }
        });
        runner.run(&roster, &schema, &signal).await
    });

    if let Some(out) = &args.out {
        if let Err(error) = write_report(out, &report) {
            return CommandResult::failure(COMMAND, "report_io", format!("{error:#}"), 1);
        }
    }

    CommandResult::success(COMMAND, summarize(&report, args.out.as_deref()))
}

/// Failures that happen before any supplier is contacted. The taxonomy's
/// `aborts_run` distinction maps onto the exit code: run-aborting errors are
/// usage errors (2), the rest are runtime errors (1).
fn abort(error: ApplicationError) -> CommandResult {
    let exit_code = if error.aborts_run() { 2 } else { 1 };
    CommandResult::failure(COMMAND, error.error_class(), error.to_string(), exit_code)
}

fn load_roster(path: &PathBuf) -> Result<SupplierRoster> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read roster `{}`", path.display()))?;
    SupplierRoster::from_json_str(&raw)
        .with_context(|| format!("could not parse roster `{}`", path.display()))
}

fn build_router(
    config: &AppConfig,
    roster: &SupplierRoster,
    templates: &MessageTemplates,
    dry_run: bool,
) -> Result<ChannelRouter> {
    if dry_run {
        // Accept every channel without touching the network; the batch walks
        // the whole loop and every supplier times out with an empty record.
        let noop: Arc<dyn Transport> = Arc::new(NoopTransport);
        return Ok(ChannelRouter::new().with_email(noop.clone()).with_telegram(noop));
    }

    let mut router = ChannelRouter::new();
    if let Some(email) = &config.email {
        let transport = EmailTransport::from_config(email, templates.subject())
            .context("email adapter setup failed")?;
        router = router.with_email(Arc::new(transport));
    }
    if let Some(telegram) = &config.telegram {
        router = router.with_telegram(Arc::new(TelegramTransport::from_config(telegram)));
    }

    // Refuse to start a run that would silently skip a whole channel.
    let unsupported: Vec<&str> = roster
        .required_channels()
        .into_iter()
        .filter(|channel| !router.supports(*channel))
        .map(|channel| channel.as_str())
        .collect();
    if !unsupported.is_empty() {
        bail!("roster needs channels with no configured section: {}", unsupported.join(", "));
    }
    Ok(router)
}

fn write_report(path: &std::path::Path, report: &BatchReport) -> Result<()> {
    let json =
        serde_json::to_string_pretty(report).context("could not serialize batch report")?;
    fs::write(path, json).with_context(|| format!("could not write report `{}`", path.display()))
}

fn summarize(report: &BatchReport, out: Option<&std::path::Path>) -> String {
    let mut message = format!(
        "run {}: {} suppliers, {} complete, {} failed",
        report.run_id,
        report.reports.len(),
        report.completed(),
        report.failed(),
    );
    if let Some(out) = out {
        message.push_str(&format!("; report written to {}", out.display()));
    }
    message
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // try_init so repeated invocations in one process (tests) stay quiet.
    let _ = match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };
}
