//! Type-state SMTP client.

use super::{ServerInfo, SmtpStream};
use crate::address::Address;
use crate::command::{Command, check_parameters};
use crate::error::{Error, Result};
use crate::extension::{AuthMechanism, Extensions};
use crate::reply::{Reply, ReplyCode};
use base64::Engine;
use std::marker::PhantomData;

/// Type-state marker: greeting received, no EHLO yet.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker: session greeted, ready for a transaction.
#[derive(Debug)]
pub struct Ready;

// Transaction states, only entered inside `send_mail`.
#[derive(Debug)]
enum MailTransaction {}

#[derive(Debug)]
enum RecipientAdded {}

#[derive(Debug)]
enum Data {}

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = stream.read_reply().await?;
        if !greeting.is_success() {
            return Err(greeting.into_error());
        }

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                local_name: String::new(),
                extensions: Extensions::default(),
            },
            _state: PhantomData,
        })
    }

    /// Greets the server with EHLO, falling back to HELO.
    ///
    /// # Errors
    ///
    /// Returns an error if both greetings are refused.
    pub async fn ehlo(mut self, local_name: &str) -> Result<Client<Ready>> {
        self.server_info.local_name = local_name.to_string();
        let reply = self
            .send_command(&Command::Ehlo {
                hostname: local_name.to_string(),
            })
            .await?;

        if reply.is_success() {
            self.server_info.extensions = Extensions::from_ehlo(&reply.message);
        } else {
            tracing::debug!(code = %reply.code, "EHLO refused, falling back to HELO");
            let reply = self
                .send_command(&Command::Helo {
                    hostname: local_name.to_string(),
                })
                .await?;
            if !reply.is_success() {
                return Err(reply.into_error());
            }
            self.server_info.extensions = Extensions::default();
        }

        Ok(self.into_state())
    }
}

impl Client<Ready> {
    /// Upgrades the connection to TLS using STARTTLS and greets again.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not supported or if the upgrade fails.
    pub async fn starttls(mut self, hostname: &str) -> Result<Self> {
        if !self.server_info.extensions.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let reply = self.send_command(&Command::StartTls).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        self.stream = self.stream.upgrade_to_tls(hostname).await?;

        // Capabilities may differ once encrypted
        let reply = self
            .send_command(&Command::Ehlo {
                hostname: self.server_info.local_name.clone(),
            })
            .await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        self.server_info.extensions = Extensions::from_ehlo(&reply.message);

        Ok(self)
    }

    /// Authenticates with the best mechanism the server offers.
    ///
    /// PLAIN is preferred over LOGIN.
    ///
    /// # Errors
    ///
    /// Returns `NotSupported` if neither mechanism is offered, or the
    /// server's error if authentication fails.
    pub async fn auth(self, username: &str, password: &str) -> Result<Self> {
        let mechanisms = self.server_info.extensions.auth_mechanisms();
        if mechanisms.contains(&AuthMechanism::Plain) {
            self.auth_plain(username, password).await
        } else if mechanisms.contains(&AuthMechanism::Login) {
            self.auth_login(username, password).await
        } else {
            Err(Error::NotSupported("AUTH PLAIN or LOGIN".into()))
        }
    }

    /// Authenticates using the PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_plain(mut self, username: &str, password: &str) -> Result<Self> {
        // \0username\0password
        let credentials = format!("\0{username}\0{password}");
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(encode(credentials.as_bytes())),
        };

        let reply = self.send_command(&cmd).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        tracing::debug!(username, "authenticated with PLAIN");
        Ok(self)
    }

    /// Authenticates using the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_login(mut self, username: &str, password: &str) -> Result<Self> {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };

        let mut reply = self.send_command(&cmd).await?;
        for secret in [username, password] {
            if reply.code != ReplyCode::AUTH_CONTINUE {
                return Err(reply.into_error());
            }
            reply = self
                .send_command(&Command::AuthResponse(encode(secret.as_bytes())))
                .await?;
        }

        if !reply.is_success() {
            return Err(reply.into_error());
        }
        tracing::debug!(username, "authenticated with LOGIN");
        Ok(self)
    }

    /// Runs a complete transaction: MAIL FROM, RCPT TO for each recipient,
    /// DATA and the message.
    ///
    /// Recipients the server refuses are logged and skipped. If every
    /// recipient is refused the transaction is reset and the last refusal
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns a [`TransactionError`]. When the server refused the
    /// transaction and RSET succeeded, the error hands the client back
    /// ready for the next transaction; after a transport or protocol
    /// failure the session is gone.
    pub async fn send_mail(
        mut self,
        from: Option<Address>,
        recipients: &[Address],
        message: &[u8],
        mail_options: &[String],
        rcpt_options: &[String],
    ) -> std::result::Result<Self, TransactionError> {
        if let Err(err) = check_parameters(mail_options).and(check_parameters(rcpt_options)) {
            return Err(TransactionError::recovered(err, self));
        }

        let reply = self
            .send_command(&Command::MailFrom {
                from,
                parameters: mail_options.to_vec(),
            })
            .await?;
        if !reply.is_success() {
            return Err(self.recover(reply.into_error()).await);
        }
        let mut transaction: Client<MailTransaction> = self.into_state();

        let mut accepted = 0_usize;
        let mut last_refusal = None;
        for to in recipients {
            let reply = transaction
                .send_command(&Command::RcptTo {
                    to: to.clone(),
                    parameters: rcpt_options.to_vec(),
                })
                .await?;
            if reply.is_success() {
                accepted += 1;
            } else {
                let err = reply.into_error();
                tracing::warn!(recipient = %to, error = %err, "recipient refused");
                last_refusal = Some(err);
            }
        }

        if accepted == 0 {
            let err = last_refusal.unwrap_or_else(|| Error::Protocol("No recipients".into()));
            return Err(transaction.recover(err).await);
        }

        let mut client: Client<RecipientAdded> = transaction.into_state();
        let reply = client.send_command(&Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(client.recover(reply.into_error()).await);
        }

        let mut client: Client<Data> = client.into_state();
        let data = encode_data(message);
        client
            .stream
            .log_sent(&format!("<message data, {} bytes>", data.len()));
        client.stream.write_all(&data).await?;

        let reply = client.stream.read_reply().await?;
        if !reply.is_success() {
            return Err(client.recover(reply.into_error()).await);
        }
        Ok(client.into_state())
    }
}

/// A failed [`Client::send_mail`].
///
/// Carries the client back when the server refused the transaction but the
/// session is still usable.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct TransactionError {
    error: Error,
    client: Option<Box<Client<Ready>>>,
}

impl TransactionError {
    const fn lost(error: Error) -> Self {
        Self {
            error,
            client: None,
        }
    }

    fn recovered(error: Error, client: Client<Ready>) -> Self {
        Self {
            error,
            client: Some(Box::new(client)),
        }
    }

    /// Returns the underlying error.
    #[must_use]
    pub const fn error(&self) -> &Error {
        &self.error
    }

    /// Returns true if the session survived the failure.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.client.is_some()
    }

    /// Splits into the error and, if the session survived, the client.
    #[must_use]
    pub fn into_parts(self) -> (Error, Option<Client<Ready>>) {
        (self.error, self.client.map(|client| *client))
    }
}

impl From<Error> for TransactionError {
    fn from(error: Error) -> Self {
        Self::lost(error)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        err.error
    }
}

// Common implementation for all states
impl<S> Client<S> {
    /// Returns what the server announced about itself.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(&Command::Quit).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        Ok(())
    }

    async fn send_command(&mut self, cmd: &Command) -> Result<Reply> {
        self.stream.log_sent(&cmd.log_line());
        self.stream.write_all(&cmd.serialize()).await?;
        self.stream.read_reply().await
    }

    /// Resets after a refusal so the session can carry the next message.
    ///
    /// A 421 means the server is closing the channel; no RSET is tried.
    async fn recover(mut self, error: Error) -> TransactionError {
        if matches!(error, Error::SmtpError { code: 421, .. }) {
            return TransactionError::lost(error);
        }
        match self.send_command(&Command::Rset).await {
            Ok(reply) if reply.is_success() => TransactionError::recovered(error, self.into_state()),
            Ok(reply) => {
                tracing::warn!(code = %reply.code, "RSET refused, dropping session");
                TransactionError::lost(error)
            }
            Err(rset_err) => {
                tracing::warn!(error = %rset_err, "RSET failed, dropping session");
                TransactionError::lost(error)
            }
        }
    }

    fn into_state<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }
}

fn encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Prepares a message for the DATA phase.
///
/// Returns CRLF-terminated, dot-stuffed lines followed by the `.` terminator.
#[must_use]
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 5);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);

    if !message.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b".\r\n");
    out
}
