//! # mailflash
//!
//! Compose MIME email and send it over SMTP.
//!
//! ## Features
//!
//! - **Messages**: plain text, HTML alternatives and attachments with
//!   sanitized, RFC 2047/IDNA encoded headers
//! - **Connections**: STARTTLS or implicit TLS, AUTH, and a reconnect after a
//!   configurable number of messages
//! - **Testing**: suppressed sending and [`MailService::record_messages`] to
//!   capture outgoing mail
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailflash::{MailConfig, MailService, Message};
//!
//! #[tokio::main]
//! async fn main() -> mailflash::Result<()> {
//!     let mail = MailService::new(MailConfig::from_env()?);
//!
//!     let mut message = Message::new("Build finished")
//!         .sender("ci@example.com")
//!         .to("team@example.com")
//!         .body("All green.")
//!         .html("<p>All <b>green</b>.</p>");
//!     message.attach(Some("report.txt".into()), "text/plain", b"42 passed".to_vec());
//!
//!     mail.send(&mut message).await
//! }
//! ```
//!
//! ## Logging
//!
//! Everything goes through `tracing`. Set `debug` in [`MailConfig`] to see
//! the SMTP conversation at `DEBUG` level under `mailflash_smtp::wire`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod attachment;
mod config;
mod connection;
mod error;
mod host;
mod message;
mod notify;
mod service;
mod transport;

pub use attachment::Attachment;
pub use config::MailConfig;
pub use connection::Connection;
pub use error::{Error, Result};
pub use message::Message;
pub use notify::{Dispatch, DispatchNotifier, ListenerId, Subscription};
pub use service::{MailService, Outbox};
pub use transport::{Connector, Envelope, Session, SmtpConnector, SmtpSession};

pub use mailflash_mime as mime;
pub use mailflash_smtp as smtp;
