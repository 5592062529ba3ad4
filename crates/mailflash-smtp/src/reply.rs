//! SMTP reply types and parsing.

use crate::error::{Error, Result};

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply message lines.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Parses a reply from its raw lines (without line terminators).
    ///
    /// SMTP replies can be single-line or multi-line:
    /// - Single: `250 OK`
    /// - Multi: `250-First line`, `250-Second line`, `250 Last line`
    ///
    /// # Errors
    ///
    /// Returns an error if the reply is malformed.
    pub fn parse(lines: &[String]) -> Result<Self> {
        let first = lines
            .first()
            .ok_or_else(|| Error::Protocol("Empty reply".into()))?;

        let code = first
            .get(..3)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| Error::Protocol(format!("Invalid reply code: {first}")))?;

        let message = lines
            .iter()
            .map(|line| match line.len() {
                3 => Ok(String::new()),
                n if n > 3 => Ok(line.get(4..).unwrap_or_default().to_string()),
                _ => Err(Error::Protocol(format!("Malformed reply line: {line}"))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(ReplyCode::new(code), message))
    }

    /// Returns true if `line` ends a (possibly multi-line) reply.
    ///
    /// Continuation lines use `-` after the code, the last line uses a space
    /// or nothing at all.
    #[must_use]
    pub fn is_last_line(line: &str) -> bool {
        line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] != b'-')
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Converts a non-success reply into an error.
    pub(crate) fn into_error(self) -> Error {
        Error::smtp_error(self.code.as_u16(), self.message_text())
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Reply codes the client branches on
impl ReplyCode {
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
}
