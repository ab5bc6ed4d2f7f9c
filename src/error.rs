//! Error types shared by every SSDP component.

use crate::codec::FormatError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SsdpError>;

#[derive(Error, Debug)]
pub enum SsdpError {
    /// A caller supplied an invalid argument (empty string, bad port, bad duration...).
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Wire text could not be decoded.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// The named component has been disposed.
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    /// The operation conflicts with one already in progress.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SsdpError {
    pub fn argument(msg: impl Into<String>) -> Self {
        SsdpError::Argument(msg.into())
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, SsdpError::Disposed(_))
    }
}
