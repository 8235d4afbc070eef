use async_trait::async_trait;
use thiserror::Error;

use procura_core::{Channel, Contact};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport failed to send: {0}")]
    Send(String),
    #[error("transport failed to receive: {0}")]
    Receive(String),
    #[error("no transport configured for channel `{0}`")]
    ChannelUnavailable(Channel),
}

/// Outcome of one inbound poll. "Nothing new yet" is a normal outcome, not an
/// error, and carries no payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Message(String),
    NoNewMessage,
}

/// One supplier-facing channel. `receive` must be idempotent within a polling
/// window: repeated calls before a new message arrives return `NoNewMessage`,
/// and no message is delivered twice.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, contact: &Contact, text: &str) -> Result<(), TransportError>;
    async fn receive(&self, contact: &Contact) -> Result<Inbound, TransportError>;
}

/// Accepts every send and never has inbound mail. Useful for dry runs and as
/// a placeholder in wiring tests.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn send(&self, _contact: &Contact, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn receive(&self, _contact: &Contact) -> Result<Inbound, TransportError> {
        Ok(Inbound::NoNewMessage)
    }
}

#[cfg(test)]
mod tests {
    use procura_core::Contact;

    use super::{Inbound, NoopTransport, Transport};

    #[tokio::test]
    async fn noop_transport_swallows_sends_and_stays_quiet() {
        let transport = NoopTransport;
        let contact = Contact::parse("sales@acme-parts.example").unwrap();

        transport.send(&contact, "hello").await.unwrap();
        assert_eq!(transport.receive(&contact).await.unwrap(), Inbound::NoNewMessage);
    }
}
