//! # SSDP Codec Module
//!
//! Parses and formats the HTTP-like text messages carried in SSDP datagrams.
//!
//! ## Key Types
//!
//! - [`SsdpRequest`] - `METHOD * HTTP/1.1` messages (M-SEARCH, NOTIFY)
//! - [`SsdpResponse`] - `HTTP/1.1 200 OK` search responses
//! - [`HeaderMap`] - ordered, case-insensitive header multimap
//! - [`WireEncode`] / [`WireDecode`] - traits for writing and parsing wire text
//!
//! ## Example
//!
//! ```ignore
//! use rssdp::codec::{SsdpRequest, WireDecode};
//!
//! let req = SsdpRequest::decode("M-SEARCH * HTTP/1.1\r\nST: ssdp:all\r\n\r\n")?;
//! assert_eq!(req.header("ST"), Some("ssdp:all"));
//! ```

pub mod headers;
pub mod message;
pub mod traits;

pub use headers::HeaderMap;
pub use message::{HttpVersion, SsdpRequest, SsdpResponse, METHOD_NOTIFY, METHOD_SEARCH};
pub use traits::{WireDecode, WireEncode};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("message is empty")]
    Empty,

    #[error("message is not terminated by a blank line")]
    MissingTerminator,

    #[error("malformed start line: {0:?}")]
    InvalidStartLine(String),

    #[error("malformed protocol version: {0:?}")]
    InvalidVersion(String),

    #[error("malformed status code: {0:?}")]
    InvalidStatusCode(String),
}

/// Current time formatted for the DATE header (RFC 1123).
pub fn http_date_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// True if the datagram text looks like a response (`HTTP/` start line).
pub fn is_response_text(text: &str) -> bool {
    text.len() >= 5 && text.as_bytes()[..5].eq_ignore_ascii_case(b"HTTP/")
}
