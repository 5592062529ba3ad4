//! Address sanitizing for header fields.
//!
//! Turns free-form address text (`user@example.com`, `Name <user@example.com>`,
//! `"Doe, Jane" <jane@example.com>`) into header-ready strings: display names
//! are RFC 2047 encoded, non-ASCII domains are IDNA encoded and non-ASCII
//! local parts are RFC 2047 encoded.

use crate::encoding::encode_rfc2047;
use crate::error::{Error, Result};

/// Characters that force a display name into a quoted-string (RFC 5322 specials).
const SPECIALS: &str = "()<>[]:;@\\,.\"";

/// Splits address text into `(display_name, address)`.
///
/// Missing parts come back empty; quotes around the display name are removed.
#[must_use]
pub fn parse_address(text: &str) -> (String, String) {
    let text = text.trim();

    if let Some(open) = text.rfind('<') {
        if let Some(close) = text[open..].find('>') {
            let address = text[open + 1..open + close].trim().to_string();
            let name = unquote(text[..open].trim());
            return (name, address);
        }
    }

    (String::new(), text.to_string())
}

fn unquote(name: &str) -> String {
    match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => name.to_string(),
    }
}

/// Formats a display name and address into a single address string.
///
/// An empty name yields the bare address. Names with specials are quoted.
#[must_use]
pub fn format_address(name: &str, address: &str) -> String {
    if name.is_empty() {
        return address.to_string();
    }

    if name.contains(|c: char| SPECIALS.contains(c)) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\" <{address}>")
    } else {
        format!("{name} <{address}>")
    }
}

/// Sanitizes address text for use in a header.
///
/// # Errors
///
/// Returns an error if the domain cannot be IDNA encoded.
pub fn sanitize_address(text: &str, charset: &str) -> Result<String> {
    let (name, address) = parse_address(text);
    sanitize_mailbox(&name, &address, charset)
}

/// Sanitizes an explicit display name and address pair.
///
/// # Errors
///
/// Returns an error if the domain cannot be IDNA encoded.
pub fn sanitize_mailbox(name: &str, address: &str, charset: &str) -> Result<String> {
    let name = encode_rfc2047(name, charset);

    let address = if address.is_ascii() {
        address.to_string()
    } else if let Some((local, domain)) = address.split_once('@') {
        let domain = idna::domain_to_ascii(domain)
            .map_err(|e| Error::InvalidAddress(format!("{address}: {e:?}")))?;
        format!("{}@{domain}", encode_rfc2047(local, charset))
    } else {
        encode_rfc2047(address, charset)
    };

    Ok(format_address(&name, &address))
}

/// Sanitizes a collection of addresses, dropping duplicates.
///
/// Duplicates are detected after sanitizing; the first occurrence wins.
///
/// # Errors
///
/// Returns an error if any address cannot be sanitized.
pub fn sanitize_addresses<I, S>(addresses: I, charset: &str) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sanitized: Vec<String> = Vec::new();
    for address in addresses {
        let address = sanitize_address(address.as_ref(), charset)?;
        if !sanitized.contains(&address) {
            sanitized.push(address);
        }
    }
    Ok(sanitized)
}
