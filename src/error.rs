use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the store and its codecs. Every operation returns its
/// failure to the caller; the only fatal condition (serial exhaustion) is a
/// panic raised at the allocation site, not a variant here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("format error: {0}")]
    Format(String),
    #[error("length error: {0}")]
    Length(String),
    #[error("value exceeds {0}-bit range")]
    Range(u32),
    #[error("signature error: {0}")]
    Signature(String),
    #[error("duplicate event")]
    Duplicate,
    #[error("not found")]
    NotFound,
    #[error("corrupt record: {0}")]
    Corruption(String),
    #[error("storage error: {0}")]
    Engine(#[from] rocksdb::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<base64::DecodeError> for StoreError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<hex::FromHexError> for StoreError {
    fn from(err: hex::FromHexError) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Format(err.to_string())
    }
}
