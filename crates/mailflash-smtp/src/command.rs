//! SMTP command serialization.

use crate::address::Address;
use crate::error::{Error, Result};
use crate::extension::AuthMechanism;

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - Extended HELLO
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// HELO - Basic HELLO (fallback for servers without ESMTP)
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Start authentication
    Auth {
        /// Mechanism name
        mechanism: AuthMechanism,
        /// Base64 initial response, if sent with the command
        initial_response: Option<String>,
    },
    /// Base64 answer to a 334 challenge
    AuthResponse(String),
    /// MAIL FROM - Begin a transaction
    MailFrom {
        /// Reverse path; `None` is the null sender `<>`
        from: Option<Address>,
        /// ESMTP parameters, see [`check_parameters`]
        parameters: Vec<String>,
    },
    /// RCPT TO - Add a recipient
    RcptTo {
        /// Forward path
        to: Address,
        /// ESMTP parameters, see [`check_parameters`]
        parameters: Vec<String>,
    },
    /// DATA - Begin message content
    Data,
    /// RSET - Abort the transaction
    Rset,
    /// QUIT - Close the session
    Quit,
}

impl Command {
    /// Serializes the command to wire format, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        format!("{}\r\n", self.line(false)).into_bytes()
    }

    /// Returns the command line for logging, with credentials masked.
    #[must_use]
    pub fn log_line(&self) -> String {
        self.line(true)
    }

    fn line(&self, redact: bool) -> String {
        let secret = |value: &str| {
            if redact {
                "<redacted>".to_string()
            } else {
                value.to_string()
            }
        };

        match self {
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response: Some(response),
            } => format!("AUTH {} {}", mechanism.as_str(), secret(response)),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => format!("AUTH {}", mechanism.as_str()),
            Self::AuthResponse(response) => secret(response),
            Self::MailFrom { from, parameters } => {
                let path = from.as_ref().map_or("", Address::as_str);
                with_parameters(format!("MAIL FROM:<{path}>"), parameters)
            }
            Self::RcptTo { to, parameters } => {
                with_parameters(format!("RCPT TO:<{to}>"), parameters)
            }
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
        }
    }
}

/// Rejects ESMTP parameters that would break the command line.
///
/// A parameter is `keyword[=value]`: non-empty, no whitespace and no
/// control characters.
///
/// # Errors
///
/// Returns `Error::Protocol` naming the first offending parameter.
pub fn check_parameters(parameters: &[String]) -> Result<()> {
    match parameters
        .iter()
        .find(|p| p.is_empty() || p.chars().any(|c| c.is_whitespace() || c.is_control()))
    {
        Some(bad) => Err(Error::Protocol(format!("invalid ESMTP parameter {bad:?}"))),
        None => Ok(()),
    }
}

fn with_parameters(mut line: String, parameters: &[String]) -> String {
    for parameter in parameters {
        line.push(' ');
        line.push_str(parameter);
    }
    line
}
