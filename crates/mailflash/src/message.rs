//! Message composition and MIME rendering.

use crate::attachment::Attachment;
use crate::connection::Connection;
use crate::error::Result;
use crate::host;
use crate::transport::Connector;
use chrono::{DateTime, Local, Utc};
use mailflash_mime::address::{format_address, sanitize_address, sanitize_addresses};
use mailflash_mime::encoding::{DEFAULT_CHARSET, encode_rfc2047};
use mailflash_mime::Part;
use rand::Rng;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// One email message.
///
/// Fields are public and may be changed freely until the message is sent;
/// the Message-ID is fixed at construction and survives cloning.
///
/// ```
/// use mailflash::Message;
///
/// let message = Message::new("Quarterly report")
///     .named_sender("Reports", "reports@example.com")
///     .to("alice@example.com")
///     .cc("bob@example.com")
///     .body("See attached.");
///
/// assert_eq!(message.send_to(), ["alice@example.com", "bob@example.com"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Subject line.
    pub subject: String,
    /// From address; the service default applies when unset.
    pub sender: Option<String>,
    /// To addresses.
    pub recipients: Vec<String>,
    /// Cc addresses.
    pub cc: Vec<String>,
    /// Bcc addresses (envelope only, never rendered).
    pub bcc: Vec<String>,
    /// Plain text body.
    pub body: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Reply-To address.
    pub reply_to: Option<String>,
    /// Date header value; set to the send time when unset.
    pub date: Option<DateTime<Utc>>,
    /// Charset for text parts and encoded headers; UTF-8 when unset.
    pub charset: Option<String>,
    /// Additional headers rendered verbatim after the standard ones.
    pub extra_headers: Vec<(String, String)>,
    /// ESMTP parameters for `MAIL FROM`.
    pub mail_options: Vec<String>,
    /// ESMTP parameters for each `RCPT TO`.
    pub rcpt_options: Vec<String>,
    /// Attachments in the order they are rendered.
    pub attachments: Vec<Attachment>,
    message_id: String,
}

impl Message {
    /// Creates an empty message with a fresh Message-ID.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            sender: None,
            recipients: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            body: None,
            html: None,
            reply_to: None,
            date: None,
            charset: None,
            extra_headers: Vec::new(),
            mail_options: Vec::new(),
            rcpt_options: Vec::new(),
            attachments: Vec::new(),
            message_id: make_msgid(),
        }
    }

    /// Sets the sender address.
    #[must_use]
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Sets the sender from a display name and an address.
    #[must_use]
    pub fn named_sender(mut self, name: &str, address: &str) -> Self {
        self.sender = Some(format_address(name, address));
        self
    }

    /// Adds a To recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Adds a Cc recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a Bcc recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Sets the Reply-To address.
    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Sets the Date header.
    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the charset.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Sets an extra header, replacing an earlier one of the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .extra_headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.extra_headers.push((name, value)),
        }
        self
    }

    /// Adds an ESMTP `MAIL FROM` parameter such as `SMTPUTF8`.
    #[must_use]
    pub fn mail_option(mut self, option: impl Into<String>) -> Self {
        self.mail_options.push(option.into());
        self
    }

    /// Adds an ESMTP `RCPT TO` parameter such as `NOTIFY=NEVER`.
    #[must_use]
    pub fn rcpt_option(mut self, option: impl Into<String>) -> Self {
        self.rcpt_options.push(option.into());
        self
    }

    /// Adds a prepared attachment.
    #[must_use]
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Returns the Message-ID, angle brackets included.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Appends a To recipient.
    pub fn add_recipient(&mut self, recipient: impl Into<String>) {
        self.recipients.push(recipient.into());
    }

    /// Appends an attachment and returns it for further changes.
    pub fn attach(
        &mut self,
        filename: Option<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> &mut Attachment {
        let attachments = &mut self.attachments;
        attachments.push(Attachment::new(filename, content_type, data));
        attachments
            .last_mut()
            .unwrap_or_else(|| unreachable!("attachment was just pushed"))
    }

    /// Returns every envelope recipient once: To, then Cc, then Bcc.
    #[must_use]
    pub fn send_to(&self) -> Vec<&str> {
        let mut all: Vec<&str> = Vec::new();
        for address in self.recipients.iter().chain(&self.cc).chain(&self.bcc) {
            if !all.contains(&address.as_str()) {
                all.push(address);
            }
        }
        all
    }

    /// Returns true if a header field would allow header injection.
    ///
    /// Checks the subject, the effective sender, Reply-To and the To list.
    /// Cc and Bcc are not checked: a line break in a Cc address reaches the
    /// rendered Cc header, so callers taking Cc from untrusted input must
    /// validate it themselves. Bcc never reaches the headers, and the SMTP
    /// envelope refuses addresses containing whitespace.
    #[must_use]
    pub fn has_bad_headers(&self, default_from: Option<&str>) -> bool {
        self.bad_header_field(default_from).is_some()
    }

    /// Names the first field containing CR or LF.
    pub(crate) fn bad_header_field(&self, default_from: Option<&str>) -> Option<&'static str> {
        let has_break = |value: &str| value.contains(['\r', '\n']);

        if has_break(&self.subject) {
            return Some("Subject");
        }
        if self
            .sender
            .as_deref()
            .or(default_from)
            .is_some_and(has_break)
        {
            return Some("From");
        }
        if self.reply_to.as_deref().is_some_and(has_break) {
            return Some("Reply-To");
        }
        if self.recipients.iter().any(|r| has_break(r)) {
            return Some("To");
        }
        None
    }

    /// Builds the MIME tree.
    ///
    /// # Errors
    ///
    /// Returns an error if an address cannot be sanitized.
    pub fn to_mime(&self, default_from: Option<&str>) -> Result<Part> {
        let charset = self.charset.as_deref().unwrap_or(DEFAULT_CHARSET);
        let plain = || Part::text(self.body.as_deref().unwrap_or_default(), "plain", charset);

        let mut root = if self.html.is_none() && self.attachments.is_empty() {
            plain()
        } else {
            let text = match &self.html {
                Some(html) => Part::multipart(
                    "alternative",
                    vec![plain(), Part::text(html, "html", charset)],
                ),
                None => plain(),
            };
            let parts = std::iter::once(text)
                .chain(self.attachments.iter().map(Attachment::to_part))
                .collect();
            Part::multipart("mixed", parts)
        };

        let date = self.date.unwrap_or_else(Utc::now).with_timezone(&Local);
        let headers = root.headers_mut();
        headers.add("MIME-Version", "1.0");
        headers.add("Subject", encode_rfc2047(&self.subject, charset));
        if let Some(sender) = self.sender.as_deref().or(default_from) {
            headers.add("From", sanitize_address(sender, charset)?);
        }
        if !self.recipients.is_empty() {
            headers.add("To", sanitize_addresses(&self.recipients, charset)?.join(", "));
        }
        headers.add("Date", date.to_rfc2822());
        headers.add("Message-ID", self.message_id.as_str());
        if !self.cc.is_empty() {
            headers.add("Cc", sanitize_addresses(&self.cc, charset)?.join(", "));
        }
        if let Some(reply_to) = &self.reply_to {
            headers.add("Reply-To", sanitize_address(reply_to, charset)?);
        }
        for (name, value) in &self.extra_headers {
            headers.add(name.as_str(), value.as_str());
        }

        Ok(root)
    }

    /// Renders the complete document with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns an error if an address cannot be sanitized.
    pub fn as_string(&self, default_from: Option<&str>) -> Result<String> {
        Ok(self.to_mime(default_from)?.to_string())
    }

    /// Sends the message through an open connection.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub async fn send<C: Connector>(&mut self, connection: &mut Connection<'_, C>) -> Result<()> {
        connection.send(self).await
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self.as_string(None).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

/// Builds a globally unique Message-ID.
fn make_msgid() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    static HOSTNAME: OnceLock<String> = OnceLock::new();

    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let pid = std::process::id();
    let random: u64 = rand::thread_rng().r#gen();
    let sequence = COUNTER.fetch_add(1, Ordering::Relaxed);
    let hostname = HOSTNAME.get_or_init(host::hostname);
    format!("<{timestamp}.{pid}.{random}{sequence}@{hostname}>")
}
