//! Envelope addresses.

use crate::error::{Error, Result};
use std::fmt;

/// An address usable in `MAIL FROM` or `RCPT TO`.
///
/// Only the addr-spec is stored; display names never reach the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a validated address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is empty, lacks a local part or
    /// domain, or contains characters that would break the command line.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        if address.contains(|c: char| c.is_whitespace() || matches!(c, '<' | '>')) {
            return Err(Error::InvalidAddress(address));
        }

        match address.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(Self(address)),
            _ => Err(Error::InvalidAddress(address)),
        }
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the local part (before the last `@`).
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(local, _)| local)
    }

    /// Returns the domain (after the last `@`).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Address {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}
