//! The mail service: configuration, connections and message capture.

use crate::config::MailConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::host;
use crate::message::Message;
use crate::notify::{Dispatch, DispatchNotifier, Subscription};
use crate::transport::{Connector, SmtpConnector};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Sends mail according to a [`MailConfig`].
///
/// ```no_run
/// use mailflash::{MailConfig, MailService, Message};
///
/// # async fn run() -> mailflash::Result<()> {
/// let mail = MailService::new(MailConfig {
///     server: "smtp.example.com".into(),
///     port: 587,
///     use_tls: true,
///     ..MailConfig::default()
/// });
///
/// let mut message = Message::new("Hello").to("user@example.com").body("Hi!");
/// mail.send(&mut message).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MailService<C: Connector = SmtpConnector> {
    config: MailConfig,
    connector: C,
    notifier: Option<DispatchNotifier>,
    local_sender: OnceLock<String>,
}

impl MailService {
    /// Creates a service that talks SMTP.
    #[must_use]
    pub fn new(config: MailConfig) -> Self {
        Self::with_connector(config, SmtpConnector)
    }
}

impl<C: Connector> MailService<C> {
    /// Creates a service on top of a custom transport.
    #[must_use]
    pub fn with_connector(config: MailConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            notifier: Some(DispatchNotifier::new()),
            local_sender: OnceLock::new(),
        }
    }

    /// Shares an existing notifier, for example one owned by the application.
    #[must_use]
    pub fn with_notifier(mut self, notifier: DispatchNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Disables dispatch notifications; [`record_messages`](Self::record_messages)
    /// then fails with `Error::Config`.
    #[must_use]
    pub fn without_notifications(mut self) -> Self {
        self.notifier = None;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MailConfig {
        &self.config
    }

    /// Returns the transport connector.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns the dispatch notifier, if notifications are enabled.
    #[must_use]
    pub const fn notifier(&self) -> Option<&DispatchNotifier> {
        self.notifier.as_ref()
    }

    /// Returns the configured default sender, or `<user>@<hostname>`.
    #[must_use]
    pub fn default_sender(&self) -> String {
        self.config
            .default_sender
            .clone()
            .unwrap_or_else(|| self.local_sender.get_or_init(host::local_sender).clone())
    }

    /// Overrides the default sender.
    pub fn set_default_sender(&mut self, sender: impl Into<String>) {
        self.config.default_sender = Some(sender.into());
    }

    /// Opens a connection. Close it with [`Connection::close`].
    ///
    /// # Errors
    ///
    /// Returns the transport error if the session cannot be opened.
    pub async fn connect(&self) -> Result<Connection<'_, C>> {
        Connection::open(self).await
    }

    /// Runs `f` on a fresh connection and closes it afterwards, whether or
    /// not `f` succeeded.
    ///
    /// ```no_run
    /// # async fn run(mail: mailflash::MailService, batch: Vec<mailflash::Message>) -> mailflash::Result<()> {
    /// mail.with_connection(async |conn| {
    ///     for message in batch {
    ///         conn.send_message(message).await?;
    ///     }
    ///     Ok(())
    /// })
    /// .await
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the first error among opening, `f` and closing.
    pub async fn with_connection<'s, T, F>(&'s self, f: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Connection<'s, C>) -> Result<T>,
    {
        let mut connection = self.connect().await?;
        let result = f(&mut connection).await;
        finish(result, connection.close().await)
    }

    /// Sends one message on its own connection.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub async fn send(&self, message: &mut Message) -> Result<()> {
        let mut connection = self.connect().await?;
        let result = connection.send(message).await;
        finish(result, connection.close().await)
    }

    /// Sends a message built by the caller, taking ownership of it.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub async fn send_message(&self, mut message: Message) -> Result<()> {
        self.send(&mut message).await
    }

    /// Captures every dispatched message until the returned guard drops.
    ///
    /// ```
    /// use mailflash::{MailConfig, MailService, Message};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> mailflash::Result<()> {
    /// let mail = MailService::new(MailConfig { suppress: true, ..MailConfig::default() });
    /// let outbox = mail.record_messages()?;
    ///
    /// mail.send_message(Message::new("testing").to("a@example.com")).await?;
    ///
    /// assert_eq!(outbox.len(), 1);
    /// assert_eq!(outbox.messages()[0].subject, "testing");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if notifications are disabled.
    pub fn record_messages(&self) -> Result<Outbox> {
        let notifier = self.notifier.as_ref().ok_or_else(|| {
            Error::Config("dispatch notifications are disabled for this service".into())
        })?;

        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        let subscription = notifier.subscribe(move |dispatch| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(dispatch.message.clone());
        });

        Ok(Outbox {
            messages,
            _subscription: subscription,
        })
    }

    pub(crate) fn notify(&self, message: &Message) {
        if let Some(notifier) = &self.notifier {
            notifier.send(&Dispatch {
                message,
                config: &self.config,
            });
        }
    }
}

fn finish<T>(result: Result<T>, closed: Result<()>) -> Result<T> {
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), closed) => {
            if let Err(close_err) = closed {
                tracing::warn!(error = %close_err, "QUIT failed while cleaning up");
            }
            Err(err)
        }
    }
}

/// Messages captured by [`MailService::record_messages`], in dispatch order.
///
/// Recording stops when the outbox is dropped.
#[derive(Debug)]
pub struct Outbox {
    messages: Arc<Mutex<Vec<Message>>>,
    _subscription: Subscription,
}

impl Outbox {
    /// Returns a snapshot of the captured messages.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    /// Returns the number of captured messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
