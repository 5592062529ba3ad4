//! MIME part tree and its wire rendering.

use crate::content_type::ContentType;
use crate::encoding::{
    DEFAULT_CHARSET, decode_base64, decode_quoted_printable, encode_base64_lines, encode_charset,
    encode_quoted_printable,
};
use crate::error::Result;
use crate::header::Headers;
use rand::Rng;
use std::fmt;

/// Longest line allowed in a 7bit/8bit body (RFC 5322 section 2.1.1).
const MAX_RAW_LINE: usize = 998;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Parses transfer encoding from a header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            _ => Self::SevenBit,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
        }
    }
}

/// Body of a MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Leaf content, already transfer-encoded.
    Single(String),
    /// Child parts separated by the boundary in the part's content type.
    Multipart(Vec<Part>),
}

/// MIME part: headers plus a leaf or multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    headers: Headers,
    body: Body,
}

impl Part {
    /// Creates a `text/<sub_type>` part.
    ///
    /// UTF-8 text travels as `7bit`/`8bit`. Text in any other charset, or
    /// text with lines too long for SMTP, travels quoted-printable. Text the
    /// charset cannot represent is sent as UTF-8 instead.
    #[must_use]
    pub fn text(text: &str, sub_type: &str, charset: &str) -> Self {
        let (bytes, charset) = encode_charset(text, charset);
        let too_long = text.lines().any(|line| line.len() > MAX_RAW_LINE);

        let (encoding, body) = if charset == DEFAULT_CHARSET && !too_long {
            let encoding = if text.is_ascii() {
                TransferEncoding::SevenBit
            } else {
                TransferEncoding::EightBit
            };
            (encoding, normalize_line_endings(text))
        } else {
            (
                TransferEncoding::QuotedPrintable,
                encode_quoted_printable(&bytes),
            )
        };

        let mut headers = Headers::new();
        headers.add("Content-Type", ContentType::text(sub_type, charset).to_string());
        headers.add("Content-Transfer-Encoding", encoding.to_string());
        Self {
            headers,
            body: Body::Single(body),
        }
    }

    /// Creates a Base64-encoded part holding binary data.
    #[must_use]
    pub fn binary(content_type: &ContentType, data: &[u8]) -> Self {
        let mut headers = Headers::new();
        headers.add("Content-Type", content_type.to_string());
        headers.add("Content-Transfer-Encoding", TransferEncoding::Base64.to_string());
        Self {
            headers,
            body: Body::Single(encode_base64_lines(data)),
        }
    }

    /// Creates a `multipart/<sub_type>` part with a fresh random boundary.
    ///
    /// The boundary is regenerated until it does not occur in any child.
    #[must_use]
    pub fn multipart(sub_type: &str, parts: Vec<Self>) -> Self {
        let rendered: Vec<String> = parts.iter().map(ToString::to_string).collect();
        let mut boundary = generate_boundary();
        while rendered.iter().any(|part| part.contains(&boundary)) {
            boundary = generate_boundary();
        }
        Self::multipart_with_boundary(sub_type, &boundary, parts)
    }

    /// Creates a `multipart/<sub_type>` part with a caller-chosen boundary.
    #[must_use]
    pub fn multipart_with_boundary(sub_type: &str, boundary: &str, parts: Vec<Self>) -> Self {
        let mut headers = Headers::new();
        headers.add(
            "Content-Type",
            ContentType::multipart(sub_type, boundary).to_string(),
        );
        Self {
            headers,
            body: Body::Multipart(parts),
        }
    }

    /// Returns the part headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the part headers for modification.
    pub const fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Returns the child parts (empty for leaf parts).
    #[must_use]
    pub fn parts(&self) -> &[Self] {
        match &self.body {
            Body::Multipart(parts) => parts,
            Body::Single(_) => &[],
        }
    }

    /// Gets the content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers.get("content-type").map_or_else(
            || Ok(ContentType::text("plain", "us-ascii")),
            ContentType::parse,
        )
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Decodes a leaf body according to its transfer encoding.
    ///
    /// Multipart bodies decode to an empty buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        let Body::Single(body) = &self.body else {
            return Ok(Vec::new());
        };
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(body),
            TransferEncoding::QuotedPrintable => decode_quoted_printable(body),
            TransferEncoding::SevenBit | TransferEncoding::EightBit => {
                Ok(body.as_bytes().to_vec())
            }
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.headers)?;
        match &self.body {
            Body::Single(body) => f.write_str(body),
            Body::Multipart(parts) => {
                let content_type = self.content_type().map_err(|_| fmt::Error)?;
                let boundary = content_type.boundary().ok_or(fmt::Error)?;
                for part in parts {
                    write!(f, "--{boundary}\r\n{part}\r\n")?;
                }
                write!(f, "--{boundary}--\r\n")
            }
        }
    }
}

fn generate_boundary() -> String {
    let token: u64 = rand::thread_rng().gen_range(0..10_000_000_000_000_000_000);
    format!("==============={token:019}==")
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}
