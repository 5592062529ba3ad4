//! File attachments.

use mailflash_mime::encoding::encode_rfc2231;
use mailflash_mime::{ContentType, Part};

/// Charset label written in `filename*` parameters.
const FILENAME_CHARSET: &str = "UTF8";

/// One file attached to a [`Message`](crate::Message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: Option<String>,
    /// MIME type such as `image/png`.
    pub content_type: String,
    /// Raw file contents.
    pub data: Vec<u8>,
    /// Content-Disposition type, `attachment` unless changed.
    pub disposition: String,
    /// Extra headers appended to the part in order.
    pub headers: Vec<(String, String)>,
}

impl Attachment {
    /// Creates an attachment with the `attachment` disposition.
    #[must_use]
    pub fn new(
        filename: Option<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename,
            content_type: content_type.into(),
            data: data.into(),
            disposition: "attachment".to_string(),
            headers: Vec::new(),
        }
    }

    /// Sets the disposition (for example `inline`).
    #[must_use]
    pub fn with_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.disposition = disposition.into();
        self
    }

    /// Appends an extra header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Renders the Content-Disposition value.
    ///
    /// Non-ASCII names use the RFC 2231 `filename*` form.
    #[must_use]
    pub fn content_disposition(&self) -> String {
        let Some(filename) = &self.filename else {
            return self.disposition.clone();
        };

        if filename.is_ascii() {
            let needs_quotes = filename.is_empty()
                || filename
                    .contains(|c: char| c.is_ascii_whitespace() || "()<>@,;:\\\"/[]?=".contains(c));
            if needs_quotes {
                let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
                format!("{}; filename=\"{escaped}\"", self.disposition)
            } else {
                format!("{}; filename={filename}", self.disposition)
            }
        } else {
            let encoded = encode_rfc2231(filename, FILENAME_CHARSET);
            format!("{}; filename*={encoded}", self.disposition)
        }
    }

    /// Builds the Base64 MIME part for this attachment.
    pub(crate) fn to_part(&self) -> Part {
        let content_type = ContentType::parse(&self.content_type)
            .unwrap_or_else(|_| ContentType::new("application", "octet-stream"));

        let mut part = Part::binary(&content_type, &self.data);
        let headers = part.headers_mut();
        headers.add("Content-Disposition", self.content_disposition());
        for (name, value) in &self.headers {
            headers.add(name.as_str(), value.as_str());
        }
        part
    }
}
