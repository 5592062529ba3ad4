//! Transport seam between connections and the wire.
//!
//! A [`Connector`] opens [`Session`]s; [`SmtpConnector`] is the production
//! implementation on top of `mailflash-smtp`. Tests plug in their own.

use crate::config::MailConfig;
use crate::error::{Error, Result};
use crate::host;
use crate::message::Message;
use mailflash_mime::address::{parse_address, sanitize_address};
use mailflash_mime::encoding::DEFAULT_CHARSET;
use mailflash_smtp::connection::{connect, connect_tls};
use mailflash_smtp::{Address, Client, Ready};
use std::future::Future;

/// Opens transport sessions.
pub trait Connector: Send + Sync {
    /// Session type produced by this connector.
    type Session: Session;

    /// Opens and prepares a session (TLS, greeting, authentication).
    fn open(&self, config: &MailConfig) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// An open transport session.
pub trait Session: Send {
    /// Transmits one message.
    fn send_mail(&mut self, envelope: &Envelope) -> impl Future<Output = Result<()>> + Send;

    /// Ends the session gracefully.
    fn quit(self) -> impl Future<Output = Result<()>> + Send;
}

/// Everything a session needs to transmit one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Reverse path address; `None` is the null sender.
    pub from: Option<String>,
    /// Forward path addresses, deduplicated.
    pub recipients: Vec<String>,
    /// Rendered MIME document.
    pub data: String,
    /// ESMTP parameters for `MAIL FROM`.
    pub mail_options: Vec<String>,
    /// ESMTP parameters for each `RCPT TO`.
    pub rcpt_options: Vec<String>,
}

impl Envelope {
    /// Renders `message` and extracts sanitized envelope addresses.
    ///
    /// `sender` is the effective From (message sender or service default).
    ///
    /// # Errors
    ///
    /// Returns an error if an address cannot be sanitized.
    pub fn new(message: &Message, sender: Option<&str>, default_from: Option<&str>) -> Result<Self> {
        let charset = message.charset.as_deref().unwrap_or(DEFAULT_CHARSET);
        let addr_spec = |text: &str| -> Result<String> {
            Ok(parse_address(&sanitize_address(text, charset)?).1)
        };

        let from = sender.map(addr_spec).transpose()?;
        let mut recipients: Vec<String> = Vec::new();
        for recipient in message.send_to() {
            let address = addr_spec(recipient)?;
            if !recipients.contains(&address) {
                recipients.push(address);
            }
        }

        Ok(Self {
            from,
            recipients,
            data: message.as_string(default_from)?,
            mail_options: message.mail_options.clone(),
            rcpt_options: message.rcpt_options.clone(),
        })
    }
}

/// Opens SMTP sessions with [`mailflash_smtp`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpConnector;

impl Connector for SmtpConnector {
    type Session = SmtpSession;

    async fn open(&self, config: &MailConfig) -> Result<SmtpSession> {
        tracing::debug!(
            server = %config.server,
            port = config.port,
            ssl = config.use_ssl,
            starttls = config.use_tls,
            "opening SMTP session"
        );

        let stream = if config.use_ssl {
            connect_tls(&config.server, config.port).await?
        } else {
            connect(&config.server, config.port).await?
        }
        .with_debug(config.debug);

        let local_name = host::hostname();
        let mut client = Client::from_stream(stream).await?.ehlo(&local_name).await?;
        if config.use_tls {
            client = client.starttls(&config.server).await?;
        }
        if let Some((username, password)) = config.credentials() {
            client = client.auth(username, password).await?;
        }

        Ok(SmtpSession {
            client: Some(client),
        })
    }
}

/// A live SMTP session.
///
/// A refused message leaves the session usable. After a transport or
/// protocol failure the client is gone and later sends return
/// [`Error::SessionLost`].
#[derive(Debug)]
pub struct SmtpSession {
    client: Option<Client<Ready>>,
}

impl Session for SmtpSession {
    async fn send_mail(&mut self, envelope: &Envelope) -> Result<()> {
        let from = envelope.from.as_deref().map(Address::new).transpose()?;
        let recipients = envelope
            .recipients
            .iter()
            .map(|r| Address::new(r.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let client = self.client.take().ok_or(Error::SessionLost)?;
        match client
            .send_mail(
                from,
                &recipients,
                envelope.data.as_bytes(),
                &envelope.mail_options,
                &envelope.rcpt_options,
            )
            .await
        {
            Ok(client) => {
                self.client = Some(client);
                Ok(())
            }
            Err(failed) => {
                let (err, client) = failed.into_parts();
                if client.is_none() {
                    tracing::warn!(error = %err, "SMTP session lost");
                }
                self.client = client;
                Err(err.into())
            }
        }
    }

    async fn quit(self) -> Result<()> {
        match self.client {
            Some(client) => Ok(client.quit().await?),
            None => Ok(()),
        }
    }
}
