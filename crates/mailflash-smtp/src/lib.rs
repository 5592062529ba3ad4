//! # mailflash-smtp
//!
//! Async SMTP client used by `mailflash` to hand messages to a relay.
//!
//! ## Features
//!
//! - **Type-state connection management**: invalid command orders do not compile
//! - **Protocol**: EHLO with HELO fallback, MAIL FROM/RCPT TO with ESMTP
//!   parameters, DATA with dot-stuffing, RSET, QUIT
//! - **TLS**: implicit TLS (port 465) and STARTTLS via rustls
//! - **Authentication**: PLAIN and LOGIN
//! - **Wire logging**: every line through `tracing`, credentials masked
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailflash_smtp::{Address, Client};
//! use mailflash_smtp::connection::connect;
//!
//! #[tokio::main]
//! async fn main() -> mailflash_smtp::Result<()> {
//!     let stream = connect("smtp.example.com", 587).await?.with_debug(true);
//!     let client = Client::from_stream(stream).await?;
//!
//!     let client = client
//!         .ehlo("client.example.com")
//!         .await?
//!         .starttls("smtp.example.com")
//!         .await?
//!         .auth("user@example.com", "password")
//!         .await?;
//!
//!     let from = Address::new("sender@example.com")?;
//!     let to = Address::new("recipient@example.com")?;
//!     let message = b"Subject: Test\r\n\r\nHello, World!\r\n";
//!
//!     let client = client
//!         .send_mail(Some(from), &[to], message, &[], &[])
//!         .await?;
//!     client.quit().await
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Connected ── ehlo() ──→ Ready ──┬── starttls() / auth() ──→ Ready
//!                                 └── send_mail() ──→ Ready
//! ```
//!
//! `send_mail` walks MAIL FROM, RCPT TO, DATA internally. A refused
//! transaction is reset and the client comes back inside the
//! [`TransactionError`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
pub mod command;
pub mod connection;
mod error;
mod extension;
mod reply;

pub use address::Address;
pub use connection::{Client, Connected, Ready, ServerInfo, SmtpStream, TransactionError};
pub use error::{Error, Result};
pub use extension::{AuthMechanism, Extension, Extensions};
pub use reply::{Reply, ReplyCode};
