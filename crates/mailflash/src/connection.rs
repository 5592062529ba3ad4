//! Connection lifecycle: open, send with periodic reconnect, close.

use crate::error::{Error, Result};
use crate::message::Message;
use crate::service::MailService;
use crate::transport::{Connector, Envelope, Session, SmtpConnector};
use chrono::Utc;
use std::fmt;

/// Where a connection's messages go.
enum Link<S> {
    /// Sending is suppressed; nothing touches the network.
    Suppressed,
    /// A live session.
    Open(S),
    /// A reconnect failed part way; the connection cannot send.
    Lost,
}

/// One session with the mail server, opened by [`MailService::connect`].
///
/// Call [`close`](Self::close) when done. A connection dropped without
/// closing releases its socket without saying QUIT and logs a warning.
pub struct Connection<'a, C: Connector = SmtpConnector> {
    service: &'a MailService<C>,
    link: Link<C::Session>,
    num_emails: usize,
}

impl<'a, C: Connector> Connection<'a, C> {
    pub(crate) async fn open(service: &'a MailService<C>) -> Result<Self> {
        let link = if service.config().suppress {
            tracing::debug!("sending suppressed, no session opened");
            Link::Suppressed
        } else {
            Link::Open(service.connector().open(service.config()).await?)
        };

        Ok(Self {
            service,
            link,
            num_emails: 0,
        })
    }

    /// Returns the number of messages sent since the last (re)connect.
    #[must_use]
    pub const fn num_emails(&self) -> usize {
        self.num_emails
    }

    /// Returns true if messages are built and announced but not transmitted.
    #[must_use]
    pub const fn is_suppressed(&self) -> bool {
        matches!(self.link, Link::Suppressed)
    }

    /// Validates, transmits and announces a message.
    ///
    /// Sets the message date when unset. After `max_emails` messages the
    /// session is closed and reopened.
    ///
    /// # Errors
    ///
    /// - `NoRecipients` when To, Cc and Bcc are all empty
    /// - `BadHeader` when a header field contains a line break
    /// - transport errors, propagated unchanged
    pub async fn send(&mut self, message: &mut Message) -> Result<()> {
        if message.send_to().is_empty() {
            return Err(Error::NoRecipients);
        }

        let default_sender = self.service.default_sender();
        let default_sender = default_sender.as_str();
        if let Some(field) = message.bad_header_field(Some(default_sender)) {
            return Err(Error::BadHeader(field));
        }

        if message.date.is_none() {
            message.date = Some(Utc::now());
        }

        match &mut self.link {
            Link::Open(session) => {
                let sender = message.sender.as_deref().unwrap_or(default_sender);
                let envelope = Envelope::new(message, Some(sender), Some(default_sender))?;
                session.send_mail(&envelope).await?;
                tracing::debug!(
                    message_id = message.message_id(),
                    recipients = envelope.recipients.len(),
                    "message sent"
                );
            }
            Link::Suppressed => {}
            Link::Lost => return Err(Error::SessionLost),
        }

        self.service.notify(message);

        self.num_emails += 1;
        if Some(self.num_emails) == self.service.config().reconnect_threshold() {
            self.num_emails = 0;
            self.reconnect().await?;
        }

        Ok(())
    }

    /// Sends a message built by the caller, taking ownership of it.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_message(&mut self, mut message: Message) -> Result<()> {
        self.send(&mut message).await
    }

    /// Says QUIT if a session is open.
    ///
    /// # Errors
    ///
    /// Returns the transport error if QUIT fails.
    pub async fn close(mut self) -> Result<()> {
        match std::mem::replace(&mut self.link, Link::Suppressed) {
            Link::Open(session) => {
                tracing::debug!("closing SMTP session");
                session.quit().await
            }
            Link::Suppressed | Link::Lost => Ok(()),
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.link, Link::Lost) {
            Link::Open(session) => {
                tracing::debug!("send limit reached, reconnecting");
                session.quit().await?;
                let config = self.service.config();
                self.link = Link::Open(self.service.connector().open(config).await?);
            }
            other => self.link = other,
        }
        Ok(())
    }
}

impl<C: Connector> fmt::Debug for Connection<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = match self.link {
            Link::Suppressed => "suppressed",
            Link::Open(_) => "open",
            Link::Lost => "lost",
        };
        f.debug_struct("Connection")
            .field("link", &link)
            .field("num_emails", &self.num_emails)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for Connection<'_, C> {
    fn drop(&mut self) {
        if matches!(self.link, Link::Open(_)) {
            tracing::warn!("connection dropped without close(); socket released without QUIT");
        }
    }
}
