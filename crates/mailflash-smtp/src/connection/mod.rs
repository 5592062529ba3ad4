//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{Client, Connected, Ready, TransactionError, encode_data};
pub use stream::{SmtpStream, connect, connect_tls};

use crate::extension::Extensions;

/// What the server told us about itself.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Name this client greeted with.
    pub local_name: String,
    /// Extensions from the latest EHLO (empty after a HELO fallback).
    pub extensions: Extensions,
}
