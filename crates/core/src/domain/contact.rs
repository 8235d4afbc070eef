use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

pub const TELEGRAM_CONTACT_PREFIX: &str = "telegram:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Telegram,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = ContactError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "telegram" => Ok(Self::Telegram),
            other => Err(ContactError::UnknownChannel(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContactError {
    #[error("contact is empty")]
    Empty,
    #[error("invalid email address `{0}`")]
    InvalidEmail(String),
    #[error("invalid telegram contact `{0}` (expected `telegram:@handle`)")]
    InvalidTelegramContact(String),
    #[error("unknown channel `{0}` (expected email|telegram)")]
    UnknownChannel(String),
}

/// A channel-qualified supplier address. Immutable once parsed; parsing is the
/// only constructor, so an existing `Contact` is always valid for its channel.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Contact {
    channel: Channel,
    address: String,
}

impl Contact {
    /// Parses a raw contact string. `telegram:@handle` selects the telegram
    /// channel; anything else must be a plain email address.
    pub fn parse(raw: &str) -> Result<Self, ContactError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ContactError::Empty);
        }

        if let Some(rest) = trimmed.strip_prefix(TELEGRAM_CONTACT_PREFIX) {
            let handle = rest
                .strip_prefix('@')
                .ok_or_else(|| ContactError::InvalidTelegramContact(trimmed.to_string()))?;
            if !is_valid_telegram_handle(handle) {
                return Err(ContactError::InvalidTelegramContact(trimmed.to_string()));
            }
            return Ok(Self {
                channel: Channel::Telegram,
                address: handle.to_ascii_lowercase(),
            });
        }

        if !is_valid_email(trimmed) {
            return Err(ContactError::InvalidEmail(trimmed.to_string()));
        }
        Ok(Self { channel: Channel::Email, address: trimmed.to_string() })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// The bare address: an email address, or a telegram handle without the
    /// `telegram:@` prefix.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Channel::Email => f.write_str(&self.address),
            Channel::Telegram => write!(f, "{TELEGRAM_CONTACT_PREFIX}@{}", self.address),
        }
    }
}

impl Serialize for Contact {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

fn is_valid_telegram_handle(handle: &str) -> bool {
    let length_ok = (5..=32).contains(&handle.len());
    length_ok
        && handle.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        && handle.chars().next().is_some_and(|ch| ch.is_ascii_alphabetic())
}

fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    // Quoted local parts are refused outright: `"` and `\` would need
    // escaping everywhere the address is spliced into a protocol string,
    // IMAP SEARCH included.
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(|ch| ch.is_whitespace() || ch == '"' || ch == '\\')
}
