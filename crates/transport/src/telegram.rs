use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use procura_core::config::TelegramConfig;
use procura_core::{Channel, Contact};

use crate::adapter::{Inbound, Transport, TransportError};

/// Telegram Bot API adapter. Outbound messages go through `sendMessage`;
/// inbound polling drains `getUpdates` into per-handle queues so each update
/// is consumed exactly once regardless of which supplier's poll fetched it.
pub struct TelegramTransport {
    client: Client,
    api_base_url: String,
    bot_token: SecretString,
    state: Mutex<PollState>,
}

#[derive(Default)]
struct PollState {
    next_offset: i64,
    // A bot can address a user by numeric chat id only after that user has
    // messaged it; handles learned from updates are cached here.
    chat_ids: HashMap<String, i64>,
    pending: HashMap<String, VecDeque<String>>,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "Option::default")]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    from: Option<MessageSender>,
    chat: MessageChat,
}

#[derive(Debug, Deserialize)]
struct MessageSender {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageChat {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

impl TelegramTransport {
    pub fn from_config(config: &TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            state: Mutex::new(PollState::default()),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base_url, self.bot_token.expose_secret())
    }

    /// Calls one Bot API method. Error strings are built from
    /// `reqwest::Error::without_url` so the bot token never leaks into logs
    /// or reports.
    async fn call<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T, String> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|error| format!("{method}: {}", error.without_url()))?;

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|error| format!("{method}: {}", error.without_url()))?;

        if !envelope.ok {
            let description = envelope.description.unwrap_or_else(|| "unknown error".to_string());
            return Err(format!("{method}: api rejected request: {description}"));
        }
        envelope.result.ok_or_else(|| format!("{method}: api returned no result"))
    }

    async fn drain_updates(&self, state: &mut PollState) -> Result<(), String> {
        let payload = json!({ "offset": state.next_offset, "timeout": 0 });
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", &payload).await?;

        for update in updates {
            state.next_offset = state.next_offset.max(update.update_id + 1);

            let Some(message) = update.message else { continue };
            let Some(text) = message.text else { continue };
            let handle = message
                .from
                .and_then(|sender| sender.username)
                .or_else(|| message.chat.username.clone());
            let Some(handle) = handle else {
                debug!(chat_id = message.chat.id, "dropping update without a sender handle");
                continue;
            };

            let handle = handle.to_ascii_lowercase();
            state.chat_ids.insert(handle.clone(), message.chat.id);
            state.pending.entry(handle).or_default().push_back(text);
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, contact: &Contact, text: &str) -> Result<(), TransportError> {
        if contact.channel() != Channel::Telegram {
            return Err(TransportError::ChannelUnavailable(contact.channel()));
        }

        let chat_id = {
            let state = self.state.lock().await;
            state.chat_ids.get(contact.address()).copied()
        };
        let chat_value = match chat_id {
            Some(id) => Value::from(id),
            None => Value::String(format!("@{}", contact.address())),
        };

        let payload = json!({ "chat_id": chat_value, "text": text });
        self.call::<Value>("sendMessage", &payload).await.map_err(TransportError::Send)?;

        debug!(
            event_name = "transport.telegram.message_sent",
            contact = %contact,
            "telegram message sent"
        );
        Ok(())
    }

    async fn receive(&self, contact: &Contact) -> Result<Inbound, TransportError> {
        if contact.channel() != Channel::Telegram {
            return Err(TransportError::ChannelUnavailable(contact.channel()));
        }

        // The lock is held across the API call: one outstanding network call
        // per bot connection, and offset advancement stays atomic with queue
        // updates.
        let mut state = self.state.lock().await;
        self.drain_updates(&mut state).await.map_err(TransportError::Receive)?;

        match state.pending.get_mut(contact.address()).and_then(VecDeque::pop_front) {
            Some(text) => Ok(Inbound::Message(text)),
            None => Ok(Inbound::NoNewMessage),
        }
    }
}

#[cfg(test)]
mod tests {
    use procura_core::Contact;

    use crate::adapter::Transport;

    use super::{ApiEnvelope, TelegramUpdate};

    #[test]
    fn deserializes_get_updates_envelope() {
        let raw = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 873,
                    "message": {
                        "message_id": 5,
                        "text": "Unit price is 10 USD",
                        "from": {"id": 7, "username": "Bolt_Trading"},
                        "chat": {"id": 42, "username": "Bolt_Trading", "type": "private"}
                    }
                },
                {"update_id": 874}
            ]
        }"#;

        let envelope: ApiEnvelope<Vec<TelegramUpdate>> = serde_json::from_str(raw).unwrap();
        assert!(envelope.ok);

        let updates = envelope.result.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].update_id, 873);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.text.as_deref(), Some("Unit price is 10 USD"));
        assert_eq!(message.chat.id, 42);
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn deserializes_api_rejection() {
        let raw = r#"{"ok": false, "description": "Unauthorized"}"#;
        let envelope: ApiEnvelope<Vec<TelegramUpdate>> = serde_json::from_str(raw).unwrap();
        assert!(!envelope.ok);
        assert_eq!(envelope.description.as_deref(), Some("Unauthorized"));
    }

    #[tokio::test]
    async fn rejects_email_contacts() {
        let transport = super::TelegramTransport::from_config(
            &procura_core::config::TelegramConfig::default(),
        );
        let contact = Contact::parse("sales@acme-parts.example").unwrap();

        let error = transport.send(&contact, "hello").await.unwrap_err();
        assert!(matches!(error, crate::adapter::TransportError::ChannelUnavailable(_)));
    }
}
