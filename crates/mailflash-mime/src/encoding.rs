//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 header encoding and
//! RFC 2231 parameter encoding. Charsets other than UTF-8 go through
//! `encoding_rs`; text a charset cannot represent falls back to UTF-8.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::{Encoding, UTF_8};
use std::fmt::Write as _;

/// Charset used when none is configured or the configured one cannot be used.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Maximum line length for Base64 and Quoted-Printable bodies (RFC 2045).
const MAX_LINE_LENGTH: usize = 76;

/// Maximum length of a single RFC 2047 encoded-word.
const MAX_ENCODED_WORD: usize = 75;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 wrapped into 76-column lines joined by CRLF.
///
/// The result carries no trailing line break.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = encode_base64(data);
    let lines: Vec<&str> = encoded
        .as_bytes()
        .chunks(MAX_LINE_LENGTH)
        // Base64 output is pure ASCII, so every chunk is valid UTF-8.
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    lines.join("\r\n")
}

/// Decodes Base64 data, ignoring embedded line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Resolves the encoding to use for `text` in `charset`.
///
/// Returns the `encoding_rs` encoding together with the charset label to
/// advertise. Unknown labels, non-ASCII-compatible encodings and charsets
/// that cannot represent every character of `text` resolve to UTF-8.
#[must_use]
pub fn resolve_charset(text: &str, charset: &str) -> (&'static Encoding, String) {
    if let Some(encoding) = Encoding::for_label(charset.trim().as_bytes()) {
        if encoding == UTF_8 {
            return (UTF_8, DEFAULT_CHARSET.to_string());
        }
        // UTF-16 and friends encode to UTF-8 in encoding_rs.
        if encoding.output_encoding() == encoding {
            let (_, _, had_errors) = encoding.encode(text);
            if !had_errors {
                return (encoding, charset.trim().to_ascii_lowercase());
            }
        }
    }
    (UTF_8, DEFAULT_CHARSET.to_string())
}

/// Encodes `text` into bytes of the resolved charset.
///
/// Returns the bytes and the charset label actually used.
#[must_use]
pub fn encode_charset(text: &str, charset: &str) -> (Vec<u8>, String) {
    let (encoding, label) = resolve_charset(text, charset);
    let (bytes, _, _) = encoding.encode(text);
    (bytes.into_owned(), label)
}

/// Encodes bytes using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks in the input (LF or CRLF) become hard CRLF breaks; long
/// lines get soft breaks so no output line exceeds 76 characters.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut result = String::new();
    let mut lines = data.split(|&b| b == b'\n').peekable();

    while let Some(line) = lines.next() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let mut line_length = 0;

        for (i, byte) in line.iter().enumerate() {
            let is_last = i + 1 == line.len();
            let mut token = String::with_capacity(3);
            match byte {
                b'!'..=b'<' | b'>'..=b'~' => token.push(*byte as char),
                // Trailing whitespace would be stripped in transit
                b' ' | b'\t' if !is_last => token.push(*byte as char),
                _ => {
                    let _ = write!(token, "={byte:02X}");
                }
            }

            if line_length + token.len() > MAX_LINE_LENGTH - 1 {
                result.push_str("=\r\n");
                line_length = 0;
            }
            result.push_str(&token);
            line_length += token.len();
        }

        if lines.peek().is_some() {
            result.push_str("\r\n");
        }
    }

    result
}

/// Decodes Quoted-Printable text (RFC 2045) into raw bytes.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'=' if bytes[i + 1..].starts_with(b"\r\n") => i += 3,
            b'=' if bytes[i + 1..].starts_with(b"\n") => i += 2,
            b'=' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".into()))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
                result.push(byte);
                i += 3;
            }
            other => {
                result.push(other);
                i += 1;
            }
        }
    }

    Ok(result)
}

/// Returns true if a header value must be RFC 2047 encoded.
fn needs_rfc2047(text: &str) -> bool {
    text.contains("=?")
        || text
            .chars()
            .any(|c| !c.is_ascii() || (c.is_ascii_control() && c != '\t'))
}

/// Encodes a header value using RFC 2047 `B` encoding.
///
/// Values that are plain printable ASCII are returned unchanged. Others are
/// split into encoded-words of at most 75 characters, never splitting a
/// character, and folded with CRLF + space.
///
/// Format: `=?charset?b?encoded-text?=`
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    if !needs_rfc2047(text) {
        return text.to_string();
    }

    let (encoding, label) = resolve_charset(text, charset);
    let overhead = label.len() + "=?".len() + "?b?".len() + "?=".len();
    let max_bytes = (MAX_ENCODED_WORD.saturating_sub(overhead) / 4).max(1) * 3;

    let mut words = Vec::new();
    let mut chunk: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4];
    for c in text.chars() {
        let (bytes, _, _) = encoding.encode(c.encode_utf8(&mut buf));
        if !chunk.is_empty() && chunk.len() + bytes.len() > max_bytes {
            words.push(format!("=?{label}?b?{}?=", encode_base64(&chunk)));
            chunk.clear();
        }
        chunk.extend_from_slice(&bytes);
    }
    if !chunk.is_empty() {
        words.push(format!("=?{label}?b?{}?=", encode_base64(&chunk)));
    }

    words.join("\r\n ")
}

/// Encodes a parameter value using RFC 2231 extended notation.
///
/// Produces `charset''percent-encoded-value`; the caller emits it as
/// `name*=...`.
#[must_use]
pub fn encode_rfc2231(value: &str, charset: &str) -> String {
    let mut result = format!("{charset}''");
    for byte in value.as_bytes() {
        match byte {
            b'a'..=b'z'
            | b'A'..=b'Z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => result.push(*byte as char),
            _ => {
                let _ = write!(result, "%{byte:02X}");
            }
        }
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // Inverse of `encode_rfc2047`, enough to check round trips.
    fn decode_rfc2047(text: &str) -> Result<String> {
        let mut result = String::new();
        let mut previous_encoded = false;

        for (i, token) in text.split_whitespace().enumerate() {
            let encoded = token.starts_with("=?") && token.ends_with("?=") && token.len() > 4;
            if i > 0 && !(encoded && previous_encoded) {
                result.push(' ');
            }
            if encoded {
                result.push_str(&decode_encoded_word(&token[2..token.len() - 2])?);
            } else {
                result.push_str(token);
            }
            previous_encoded = encoded;
        }

        Ok(result)
    }

    fn decode_encoded_word(inner: &str) -> Result<String> {
        let parts: Vec<&str> = inner.split('?').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidEncoding("Invalid RFC 2047 format".into()));
        }

        let bytes = match parts[1].to_ascii_uppercase().as_str() {
            "B" => decode_base64(parts[2])?,
            "Q" => decode_quoted_printable(&parts[2].replace('_', " "))?,
            other => {
                return Err(Error::InvalidEncoding(format!("Unknown encoding: {other}")));
            }
        };

        let encoding = Encoding::for_label(parts[0].as_bytes()).unwrap_or(UTF_8);
        let (decoded, _, _) = encoding.decode(&bytes);
        Ok(decoded.into_owned())
    }

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_lines_wrap_at_76() {
        let data = vec![0xABu8; 200];
        let encoded = encode_base64_lines(&data);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= 76));
        assert_eq!(lines[0].len(), 76);
        assert_eq!(decode_base64(&encoded).unwrap(), data);
    }

    #[test]
    fn test_base64_lines_empty() {
        assert_eq!(encode_base64_lines(b""), "");
    }

    #[test]
    fn test_quoted_printable_encode() {
        assert_eq!(encode_quoted_printable(b"Hello, World!"), "Hello, World!");

        let encoded = encode_quoted_printable("Héllo, Wørld!".as_bytes());
        assert!(encoded.contains("=C3=A9"));
    }

    #[test]
    fn test_quoted_printable_keeps_line_breaks() {
        let encoded = encode_quoted_printable(b"one\ntwo\r\nthree");
        assert_eq!(encoded, "one\r\ntwo\r\nthree");
    }

    #[test]
    fn test_quoted_printable_trailing_space() {
        assert_eq!(encode_quoted_printable(b"end \nnext"), "end=20\r\nnext");
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let long = "x".repeat(200);
        let encoded = encode_quoted_printable(long.as_bytes());
        assert!(encoded.split("\r\n").all(|l| l.len() <= 76));
        assert_eq!(decode_quoted_printable(&encoded).unwrap(), long.as_bytes());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable("H=C3=A9llo").unwrap(), "Héllo".as_bytes());
        assert_eq!(decode_quoted_printable("Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert!(decode_quoted_printable("bad=4").is_err());
    }

    #[test]
    fn test_resolve_charset_fallback() {
        let (_, label) = resolve_charset("café", "iso-8859-1");
        assert_eq!(label, "iso-8859-1");

        // Latin-1 cannot carry CJK
        let (encoding, label) = resolve_charset("日本", "iso-8859-1");
        assert_eq!(encoding, UTF_8);
        assert_eq!(label, "utf-8");

        let (_, label) = resolve_charset("abc", "no-such-charset");
        assert_eq!(label, "utf-8");
    }

    #[test]
    fn test_rfc2047_plain_ascii_untouched() {
        assert_eq!(encode_rfc2047("Hello", "utf-8"), "Hello");
        assert_eq!(encode_rfc2047("Re: is it ok?", "utf-8"), "Re: is it ok?");
    }

    #[test]
    fn test_rfc2047_encode() {
        let encoded = encode_rfc2047("Héllo", "utf-8");
        assert_eq!(encoded, "=?utf-8?b?SMOpbGxv?=");
    }

    #[test]
    fn test_rfc2047_latin1() {
        let encoded = encode_rfc2047("café", "ISO-8859-1");
        assert!(encoded.starts_with("=?iso-8859-1?b?"));
        assert_eq!(decode_rfc2047(&encoded).unwrap(), "café");
    }

    #[test]
    fn test_rfc2047_long_value_is_split() {
        let text = "ü".repeat(60);
        let encoded = encode_rfc2047(&text, "utf-8");
        let words: Vec<&str> = encoded.split("\r\n ").collect();
        assert!(words.len() > 1);
        assert!(words.iter().all(|w| w.len() <= 75));
        assert_eq!(decode_rfc2047(&encoded).unwrap(), text);
    }

    #[test]
    fn test_rfc2231_encode() {
        assert_eq!(encode_rfc2231("naïve.txt", "UTF8"), "UTF8''na%C3%AFve.txt");
        assert_eq!(encode_rfc2231("a b", "UTF8"), "UTF8''a%20b");
    }
}
