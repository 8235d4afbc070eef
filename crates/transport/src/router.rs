use std::sync::Arc;

use async_trait::async_trait;

use procura_core::{Channel, Contact};

use crate::adapter::{Inbound, Transport, TransportError};

/// Dispatches sends and polls to the adapter configured for the contact's
/// channel. A missing adapter is `ChannelUnavailable`, deliberately distinct
/// from an empty poll, which only a configured adapter can report.
#[derive(Clone, Default)]
pub struct ChannelRouter {
    email: Option<Arc<dyn Transport>>,
    telegram: Option<Arc<dyn Transport>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, transport: Arc<dyn Transport>) -> Self {
        self.email = Some(transport);
        self
    }

    pub fn with_telegram(mut self, transport: Arc<dyn Transport>) -> Self {
        self.telegram = Some(transport);
        self
    }

    pub fn supports(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email.is_some(),
            Channel::Telegram => self.telegram.is_some(),
        }
    }

    fn adapter_for(&self, channel: Channel) -> Result<&Arc<dyn Transport>, TransportError> {
        let adapter = match channel {
            Channel::Email => self.email.as_ref(),
            Channel::Telegram => self.telegram.as_ref(),
        };
        adapter.ok_or(TransportError::ChannelUnavailable(channel))
    }
}

#[async_trait]
impl Transport for ChannelRouter {
    async fn send(&self, contact: &Contact, text: &str) -> Result<(), TransportError> {
        self.adapter_for(contact.channel())?.send(contact, text).await
    }

    async fn receive(&self, contact: &Contact) -> Result<Inbound, TransportError> {
        self.adapter_for(contact.channel())?.receive(contact).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use procura_core::{Channel, Contact};
    use tokio::sync::Mutex;

    use super::ChannelRouter;
    use crate::adapter::{Inbound, Transport, TransportError};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, contact: &Contact, text: &str) -> Result<(), TransportError> {
            self.sent.lock().await.push(format!("{contact}: {text}"));
            Ok(())
        }

        async fn receive(&self, _contact: &Contact) -> Result<Inbound, TransportError> {
            Ok(Inbound::Message("reply".to_string()))
        }
    }

    #[tokio::test]
    async fn routes_by_contact_channel() {
        let email = Arc::new(RecordingTransport::default());
        let router = ChannelRouter::new().with_email(email.clone());

        let contact = Contact::parse("sales@acme-parts.example").unwrap();
        router.send(&contact, "hello").await.unwrap();

        assert_eq!(
            email.sent.lock().await.as_slice(),
            ["sales@acme-parts.example: hello".to_string()]
        );
        assert_eq!(router.receive(&contact).await.unwrap(), Inbound::Message("reply".to_string()));
    }

    #[tokio::test]
    async fn unconfigured_channel_is_a_distinct_error() {
        let router = ChannelRouter::new().with_email(Arc::new(RecordingTransport::default()));
        let contact = Contact::parse("telegram:@bolt_trading").unwrap();

        let error = router.send(&contact, "hello").await.unwrap_err();
        assert_eq!(error, TransportError::ChannelUnavailable(Channel::Telegram));
        assert!(!router.supports(Channel::Telegram));
        assert!(router.supports(Channel::Email));
    }
}
