use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::contact::Contact;
use crate::domain::schema::{FieldSchema, FieldSpec};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub outreach: OutreachConfig,
    pub email: Option<EmailConfig>,
    pub telegram: Option<TelegramConfig>,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct OutreachConfig {
    pub company_name: String,
    pub contact_person: String,
    pub overall_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub max_follow_ups: u32,
    pub fields: Vec<FieldEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    pub label: String,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: Option<String>,
    pub mailbox: String,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub overall_timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            outreach: OutreachConfig::default(),
            email: None,
            telegram: None,
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            company_name: "XYZ Company".to_string(),
            contact_person: "Procurement Team".to_string(),
            overall_timeout_secs: 900,
            poll_interval_secs: 30,
            max_follow_ups: 5,
            fields: default_fields(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 465,
            imap_host: String::new(),
            imap_port: 993,
            username: String::new(),
            password: String::new().into(),
            from_address: None,
            mailbox: "INBOX".to_string(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new().into(),
            api_base_url: "https://api.telegram.org".to_string(),
        }
    }
}

fn default_fields() -> Vec<FieldEntry> {
    vec![
        FieldEntry { name: "product_name".into(), label: "Product name".into() },
        FieldEntry { name: "min_order_quantity".into(), label: "Minimum order quantity".into() },
        FieldEntry { name: "unit_price".into(), label: "Price per unit".into() },
        FieldEntry { name: "delivery_time".into(), label: "Delivery time".into() },
        FieldEntry { name: "warranty".into(), label: "Warranty".into() },
    ]
}

impl OutreachConfig {
    pub fn schema(&self) -> Result<FieldSchema, ConfigError> {
        let specs = self
            .fields
            .iter()
            .map(|entry| FieldSpec::new(&entry.name, &entry.label))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| ConfigError::Validation(format!("outreach.fields: {error}")))?;
        FieldSchema::new(specs)
            .map_err(|error| ConfigError::Validation(format!("outreach.fields: {error}")))
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("procura.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(outreach) = patch.outreach {
            if let Some(company_name) = outreach.company_name {
                self.outreach.company_name = company_name;
            }
            if let Some(contact_person) = outreach.contact_person {
                self.outreach.contact_person = contact_person;
            }
            if let Some(overall_timeout_secs) = outreach.overall_timeout_secs {
                self.outreach.overall_timeout_secs = overall_timeout_secs;
            }
            if let Some(poll_interval_secs) = outreach.poll_interval_secs {
                self.outreach.poll_interval_secs = poll_interval_secs;
            }
            if let Some(max_follow_ups) = outreach.max_follow_ups {
                self.outreach.max_follow_ups = max_follow_ups;
            }
            if let Some(fields) = outreach.fields {
                self.outreach.fields = fields;
            }
        }

        if let Some(email) = patch.email {
            let target = self.email.get_or_insert_with(EmailConfig::default);
            if let Some(smtp_host) = email.smtp_host {
                target.smtp_host = smtp_host;
            }
            if let Some(smtp_port) = email.smtp_port {
                target.smtp_port = smtp_port;
            }
            if let Some(imap_host) = email.imap_host {
                target.imap_host = imap_host;
            }
            if let Some(imap_port) = email.imap_port {
                target.imap_port = imap_port;
            }
            if let Some(username) = email.username {
                target.username = username;
            }
            if let Some(password_value) = email.password {
                target.password = secret_value(password_value);
            }
            if let Some(from_address) = email.from_address {
                target.from_address = Some(from_address);
            }
            if let Some(mailbox) = email.mailbox {
                target.mailbox = mailbox;
            }
        }

        if let Some(telegram) = patch.telegram {
            let target = self.telegram.get_or_insert_with(TelegramConfig::default);
            if let Some(bot_token_value) = telegram.bot_token {
                target.bot_token = secret_value(bot_token_value);
            }
            if let Some(api_base_url) = telegram.api_base_url {
                target.api_base_url = api_base_url;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PROCURA_OUTREACH_COMPANY_NAME") {
            self.outreach.company_name = value;
        }
        if let Some(value) = read_env("PROCURA_OUTREACH_CONTACT_PERSON") {
            self.outreach.contact_person = value;
        }
        if let Some(value) = read_env("PROCURA_OUTREACH_OVERALL_TIMEOUT_SECS") {
            self.outreach.overall_timeout_secs =
                parse_u64("PROCURA_OUTREACH_OVERALL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PROCURA_OUTREACH_POLL_INTERVAL_SECS") {
            self.outreach.poll_interval_secs =
                parse_u64("PROCURA_OUTREACH_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("PROCURA_OUTREACH_MAX_FOLLOW_UPS") {
            self.outreach.max_follow_ups = parse_u32("PROCURA_OUTREACH_MAX_FOLLOW_UPS", &value)?;
        }

        if let Some(value) = read_env("PROCURA_EMAIL_SMTP_HOST") {
            self.email.get_or_insert_with(EmailConfig::default).smtp_host = value;
        }
        if let Some(value) = read_env("PROCURA_EMAIL_SMTP_PORT") {
            self.email.get_or_insert_with(EmailConfig::default).smtp_port =
                parse_u16("PROCURA_EMAIL_SMTP_PORT", &value)?;
        }
        if let Some(value) = read_env("PROCURA_EMAIL_IMAP_HOST") {
            self.email.get_or_insert_with(EmailConfig::default).imap_host = value;
        }
        if let Some(value) = read_env("PROCURA_EMAIL_IMAP_PORT") {
            self.email.get_or_insert_with(EmailConfig::default).imap_port =
                parse_u16("PROCURA_EMAIL_IMAP_PORT", &value)?;
        }
        if let Some(value) = read_env("PROCURA_EMAIL_USERNAME") {
            self.email.get_or_insert_with(EmailConfig::default).username = value;
        }
        if let Some(value) = read_env("PROCURA_EMAIL_PASSWORD") {
            self.email.get_or_insert_with(EmailConfig::default).password = secret_value(value);
        }
        if let Some(value) = read_env("PROCURA_EMAIL_FROM_ADDRESS") {
            self.email.get_or_insert_with(EmailConfig::default).from_address = Some(value);
        }

        if let Some(value) = read_env("PROCURA_TELEGRAM_BOT_TOKEN") {
            self.telegram.get_or_insert_with(TelegramConfig::default).bot_token =
                secret_value(value);
        }
        if let Some(value) = read_env("PROCURA_TELEGRAM_API_BASE_URL") {
            self.telegram.get_or_insert_with(TelegramConfig::default).api_base_url = value;
        }

        if let Some(value) = read_env("PROCURA_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("PROCURA_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PROCURA_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PROCURA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PROCURA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PROCURA_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PROCURA_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("PROCURA_LLM_MAX_RETRIES", &value)?;
        }

        let log_level = read_env("PROCURA_LOGGING_LEVEL").or_else(|| read_env("PROCURA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PROCURA_LOGGING_FORMAT").or_else(|| read_env("PROCURA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(overall_timeout_secs) = overrides.overall_timeout_secs {
            self.outreach.overall_timeout_secs = overall_timeout_secs;
        }
        if let Some(poll_interval_secs) = overrides.poll_interval_secs {
            self.outreach.poll_interval_secs = poll_interval_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_outreach(&self.outreach)?;
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(telegram) = &self.telegram {
            validate_telegram(telegram)?;
        }
        validate_llm(&self.llm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("procura.toml"), PathBuf::from("config/procura.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_outreach(outreach: &OutreachConfig) -> Result<(), ConfigError> {
    if outreach.company_name.trim().is_empty() {
        return Err(ConfigError::Validation("outreach.company_name must not be empty".to_string()));
    }
    if outreach.contact_person.trim().is_empty() {
        return Err(ConfigError::Validation(
            "outreach.contact_person must not be empty".to_string(),
        ));
    }

    if outreach.overall_timeout_secs == 0 || outreach.overall_timeout_secs > 86_400 {
        return Err(ConfigError::Validation(
            "outreach.overall_timeout_secs must be in range 1..=86400".to_string(),
        ));
    }
    if outreach.poll_interval_secs == 0
        || outreach.poll_interval_secs > outreach.overall_timeout_secs
    {
        return Err(ConfigError::Validation(
            "outreach.poll_interval_secs must be in range 1..=overall_timeout_secs".to_string(),
        ));
    }

    if outreach.fields.is_empty() {
        return Err(ConfigError::Validation(
            "outreach.fields must list at least one field (name + label)".to_string(),
        ));
    }
    outreach.schema().map(|_| ())
}

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    if email.smtp_host.trim().is_empty() || email.imap_host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.smtp_host and email.imap_host are required when [email] is configured"
                .to_string(),
        ));
    }
    if email.smtp_port == 0 || email.imap_port == 0 {
        return Err(ConfigError::Validation(
            "email.smtp_port and email.imap_port must be greater than zero".to_string(),
        ));
    }
    if email.username.trim().is_empty() {
        return Err(ConfigError::Validation("email.username must not be empty".to_string()));
    }
    if email.password.expose_secret().is_empty() {
        return Err(ConfigError::Validation("email.password must not be empty".to_string()));
    }
    if email.mailbox.trim().is_empty() {
        return Err(ConfigError::Validation("email.mailbox must not be empty".to_string()));
    }

    let from = email.from_address.as_deref().unwrap_or(&email.username);
    if Contact::parse(from).is_err() {
        return Err(ConfigError::Validation(format!(
            "email.from_address `{from}` is not a valid email address"
        )));
    }

    Ok(())
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let token = telegram.bot_token.expose_secret();
    if token.is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required when [telegram] is configured. Get it from @BotFather"
                .to_string(),
        ));
    }

    let token_shape_ok = token
        .split_once(':')
        .is_some_and(|(id, rest)| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && !rest.is_empty());
    if !token_shape_ok {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<numeric-id>:<secret>`".to_string(),
        ));
    }

    if !telegram.api_base_url.starts_with("http://")
        && !telegram.api_base_url.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "telegram.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    outreach: Option<OutreachPatch>,
    email: Option<EmailPatch>,
    telegram: Option<TelegramPatch>,
    llm: Option<LlmPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct OutreachPatch {
    company_name: Option<String>,
    contact_person: Option<String>,
    overall_timeout_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    max_follow_ups: Option<u32>,
    fields: Option<Vec<FieldEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    from_address: Option<String>,
    mailbox: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
