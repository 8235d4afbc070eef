use async_trait::async_trait;
use futures::TryStreamExt;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use procura_core::config::EmailConfig;
use procura_core::{Channel, Contact};

use crate::adapter::{Inbound, Transport, TransportError};

type ImapSession = async_imap::Session<async_native_tls::TlsStream<TcpStream>>;

/// Email adapter: SMTP submission outbound, IMAP INBOX polling inbound.
/// Polling fetches the oldest unseen message from the supplier's address;
/// the `RFC822` fetch marks it seen, so the next poll's `UNSEEN` search never
/// re-delivers it.
pub struct EmailTransport {
    smtp: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    subject: String,
    imap_host: String,
    imap_port: u16,
    username: String,
    password: SecretString,
    mailbox: String,
    // One outstanding IMAP conversation per adapter handle.
    poll_lock: Mutex<()>,
}

impl EmailTransport {
    pub fn from_config(
        config: &EmailConfig,
        subject: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let smtp = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|error| TransportError::Connect(error.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ))
            .build();

        let from_raw = config.from_address.clone().unwrap_or_else(|| config.username.clone());
        let from = from_raw.parse::<Mailbox>().map_err(|error| {
            TransportError::Connect(format!("invalid from address `{from_raw}`: {error}"))
        })?;

        Ok(Self {
            smtp,
            from,
            subject: subject.into(),
            imap_host: config.imap_host.clone(),
            imap_port: config.imap_port,
            username: config.username.clone(),
            password: config.password.clone(),
            mailbox: config.mailbox.clone(),
            poll_lock: Mutex::new(()),
        })
    }

    async fn open_session(&self) -> Result<ImapSession, TransportError> {
        let tcp = TcpStream::connect((self.imap_host.as_str(), self.imap_port))
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let tls = async_native_tls::TlsConnector::new()
            .connect(self.imap_host.as_str(), tcp)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        let client = async_imap::Client::new(tls);
        client
            .login(&self.username, self.password.expose_secret())
            .await
            .map_err(|(error, _client)| TransportError::Connect(error.to_string()))
    }

    async fn fetch_latest_unseen(
        &self,
        session: &mut ImapSession,
        sender: &str,
    ) -> Result<Inbound, TransportError> {
        session
            .select(&self.mailbox)
            .await
            .map_err(|error| TransportError::Receive(error.to_string()))?;

        let query = format!("UNSEEN FROM \"{sender}\"");
        let sequences = session
            .search(&query)
            .await
            .map_err(|error| TransportError::Receive(error.to_string()))?;
        let Some(oldest) = sequences.into_iter().min() else {
            return Ok(Inbound::NoNewMessage);
        };

        let fetches: Vec<_> = {
            let stream = session
                .fetch(oldest.to_string(), "RFC822")
                .await
                .map_err(|error| TransportError::Receive(error.to_string()))?;
            stream
                .try_collect()
                .await
                .map_err(|error| TransportError::Receive(error.to_string()))?
        };

        let Some(body) = fetches.first().and_then(|fetch| fetch.body()) else {
            return Ok(Inbound::NoNewMessage);
        };

        let text = plain_text_body(body)
            .map_err(|error| TransportError::Receive(error.to_string()))?;
        Ok(Inbound::Message(text))
    }
}

#[async_trait]
impl Transport for EmailTransport {
    async fn send(&self, contact: &Contact, text: &str) -> Result<(), TransportError> {
        if contact.channel() != Channel::Email {
            return Err(TransportError::ChannelUnavailable(contact.channel()));
        }

        let to = contact
            .address()
            .parse::<Mailbox>()
            .map_err(|error| TransportError::Send(format!("invalid recipient: {error}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&self.subject)
            .body(text.to_string())
            .map_err(|error| TransportError::Send(error.to_string()))?;

        self.smtp
            .send(message)
            .await
            .map_err(|error| TransportError::Send(error.to_string()))?;

        debug!(
            event_name = "transport.email.message_sent",
            contact = %contact,
            subject = %self.subject,
            "email sent"
        );
        Ok(())
    }

    async fn receive(&self, contact: &Contact) -> Result<Inbound, TransportError> {
        if contact.channel() != Channel::Email {
            return Err(TransportError::ChannelUnavailable(contact.channel()));
        }

        let _guard = self.poll_lock.lock().await;
        let mut session = self.open_session().await?;
        let result = self.fetch_latest_unseen(&mut session, contact.address()).await;
        let _ = session.logout().await;
        result
    }
}

/// Extracts the reply text from a raw RFC822 message: the first `text/plain`
/// part, falling back to any text part, then to the top-level body.
fn plain_text_body(raw: &[u8]) -> Result<String, mailparse::MailParseError> {
    let parsed = mailparse::parse_mail(raw)?;

    if let Some(text) = find_part(&parsed, "text/plain") {
        return Ok(text);
    }
    if let Some(text) = find_part(&parsed, "text/") {
        return Ok(text);
    }
    parsed.get_body()
}

fn find_part(part: &mailparse::ParsedMail<'_>, mimetype_prefix: &str) -> Option<String> {
    if part.subparts.is_empty() {
        if part.ctype.mimetype.starts_with(mimetype_prefix) {
            return part.get_body().ok();
        }
        return None;
    }
    part.subparts.iter().find_map(|subpart| find_part(subpart, mimetype_prefix))
}
