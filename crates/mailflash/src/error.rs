//! Errors surfaced by the mailer.

/// Result type alias for mailer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Mailer errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message has no recipients in To, Cc or Bcc.
    #[error("No recipients have been added")]
    NoRecipients,

    /// A header field contains a line break.
    #[error("Header injection detected in {0}")]
    BadHeader(&'static str),

    /// The transport failed while opening, sending or closing.
    #[error(transparent)]
    Smtp(#[from] mailflash_smtp::Error),

    /// A message could not be rendered.
    #[error(transparent)]
    Mime(#[from] mailflash_mime::Error),

    /// The service is not set up for the requested feature.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An earlier transport failure left the connection without a session.
    #[error("SMTP session lost after an earlier failure")]
    SessionLost,
}
