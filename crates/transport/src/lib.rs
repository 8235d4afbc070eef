//! Transport Adapter - outbound inquiries and inbound reply polling
//!
//! This crate is the narrow boundary between the outreach loop and the
//! outside world:
//! - **Adapter contract** (`adapter`) - the `Transport` trait: send one
//!   message, poll for the next inbound one
//! - **Email** (`email`) - SMTP submission plus IMAP inbox polling
//! - **Telegram** (`telegram`) - Bot API `sendMessage` / `getUpdates`
//! - **Routing** (`router`) - per-channel dispatch over a shared trait object
//!
//! # Receive semantics
//!
//! `receive` is idempotent within a polling window: until a new inbound
//! message arrives it returns `Inbound::NoNewMessage`, and a message already
//! handed out is never re-delivered as new. A channel with no configured
//! adapter is a distinct `TransportError::ChannelUnavailable`, never an empty
//! poll.

pub mod adapter;
pub mod email;
pub mod router;
pub mod telegram;

pub use adapter::{Inbound, NoopTransport, Transport, TransportError};
pub use email::EmailTransport;
pub use router::ChannelRouter;
pub use telegram::TelegramTransport;
