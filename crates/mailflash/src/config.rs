//! Mail service configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settings for a [`MailService`](crate::MailService).
///
/// Every field has a default, so partial documents deserialize:
///
/// ```
/// let config: mailflash::MailConfig =
///     serde_json::from_str(r#"{ "server": "smtp.example.com", "use_tls": true }"#).unwrap();
/// assert_eq!(config.port, 25);
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct MailConfig {
    /// Relay hostname.
    pub server: String,
    /// Relay port.
    pub port: u16,
    /// Login name; authentication happens only when a password is set too.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Upgrade the plain connection with STARTTLS.
    pub use_tls: bool,
    /// Connect with implicit TLS.
    pub use_ssl: bool,
    /// Sender used when a message has none.
    pub default_sender: Option<String>,
    /// Log SMTP wire traffic at `DEBUG`.
    pub debug: bool,
    /// Messages per session before reconnecting; `None` or `0` never reconnects.
    pub max_emails: Option<usize>,
    /// Build and announce messages without transmitting them.
    pub suppress: bool,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".to_string(),
            port: 25,
            username: None,
            password: None,
            use_tls: false,
            use_ssl: false,
            default_sender: None,
            debug: false,
            max_emails: None,
            suppress: false,
        }
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("use_tls", &self.use_tls)
            .field("use_ssl", &self.use_ssl)
            .field("default_sender", &self.default_sender)
            .field("debug", &self.debug)
            .field("max_emails", &self.max_emails)
            .field("suppress", &self.suppress)
            .finish()
    }
}

impl MailConfig {
    /// Reads `MAIL_*` environment variables on top of the defaults.
    ///
    /// Recognized: `MAIL_SERVER`, `MAIL_PORT`, `MAIL_USERNAME`,
    /// `MAIL_PASSWORD`, `MAIL_USE_TLS`, `MAIL_USE_SSL`, `MAIL_DEFAULT_SENDER`,
    /// `MAIL_DEBUG`, `MAIL_MAX_EMAILS`, `MAIL_SUPPRESS_SEND`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a numeric or boolean variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup using the `MAIL_*` names.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a numeric or boolean value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(server) = lookup("MAIL_SERVER") {
            config.server = server;
        }
        if let Some(port) = lookup("MAIL_PORT") {
            config.port = parse_value("MAIL_PORT", &port)?;
        }
        config.username = lookup("MAIL_USERNAME").or(config.username);
        config.password = lookup("MAIL_PASSWORD").or(config.password);
        config.default_sender = lookup("MAIL_DEFAULT_SENDER").or(config.default_sender);

        for (key, flag) in [
            ("MAIL_USE_TLS", &mut config.use_tls),
            ("MAIL_USE_SSL", &mut config.use_ssl),
            ("MAIL_DEBUG", &mut config.debug),
            ("MAIL_SUPPRESS_SEND", &mut config.suppress),
        ] {
            if let Some(value) = lookup(key) {
                *flag = parse_flag(key, &value)?;
            }
        }

        if let Some(max) = lookup("MAIL_MAX_EMAILS") {
            config.max_emails = Some(parse_value("MAIL_MAX_EMAILS", &max)?);
        }

        Ok(config)
    }

    /// Returns the reconnect threshold, treating `Some(0)` as unlimited.
    #[must_use]
    pub fn reconnect_threshold(&self) -> Option<usize> {
        self.max_emails.filter(|&max| max > 0)
    }

    /// Returns the credentials when both halves are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.as_str(), pass.as_str()))
            }
            _ => None,
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: invalid value {value:?}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!("{key}: expected a boolean, got {value:?}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MailConfig::default();
        assert_eq!(config.server, "127.0.0.1");
        assert_eq!(config.port, 25);
        assert!(!config.use_tls && !config.use_ssl && !config.suppress);
        assert_eq!(config.max_emails, None);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_from_lookup() {
        let config = MailConfig::from_lookup(lookup(&[
            ("MAIL_SERVER", "smtp.example.com"),
            ("MAIL_PORT", "587"),
            ("MAIL_USERNAME", "bot"),
            ("MAIL_PASSWORD", "hunter2"),
            ("MAIL_USE_TLS", "True"),
            ("MAIL_MAX_EMAILS", "50"),
            ("MAIL_SUPPRESS_SEND", "1"),
        ]))
        .unwrap();

        assert_eq!(config.server, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert!(config.use_tls);
        assert!(!config.use_ssl);
        assert!(config.suppress);
        assert_eq!(config.reconnect_threshold(), Some(50));
        assert_eq!(config.credentials(), Some(("bot", "hunter2")));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        assert!(matches!(
            MailConfig::from_lookup(lookup(&[("MAIL_PORT", "smtp")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            MailConfig::from_lookup(lookup(&[("MAIL_DEBUG", "maybe")])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_zero_max_emails_is_unlimited() {
        let config = MailConfig {
            max_emails: Some(0),
            ..MailConfig::default()
        };
        assert_eq!(config.reconnect_threshold(), None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = MailConfig {
            password: Some("hunter2".into()),
            ..MailConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_serde_partial_document() {
        let config: MailConfig =
            serde_json::from_str(r#"{"server": "mx.test", "max_emails": 3}"#).unwrap();
        assert_eq!(config.server, "mx.test");
        assert_eq!(config.port, 25);
        assert_eq!(config.max_emails, Some(3));
    }
}
