//! # mailflash-mime
//!
//! MIME generation primitives for the `mailflash` mailer.
//!
//! ## Features
//!
//! - **Part tree**: Single-part and multipart bodies rendered with CRLF line endings
//! - **Encodings**: Base64, Quoted-Printable, RFC 2047 headers, RFC 2231 parameters
//! - **Charsets**: Any `encoding_rs` charset, falling back to UTF-8
//! - **Addresses**: Header-ready address sanitizing with IDNA domains
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailflash_mime::{Part, address::sanitize_address};
//!
//! let mut message = Part::multipart("alternative", vec![
//!     Part::text("Plain text version", "plain", "utf-8"),
//!     Part::text("<h1>HTML version</h1>", "html", "utf-8"),
//! ]);
//! message.headers_mut().add("To", sanitize_address("Zoë <zoe@bücher.example>", "utf-8")?);
//!
//! println!("{message}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod part;

pub mod address;
pub mod encoding;

pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use part::{Body, Part, TransferEncoding};
