use std::path::PathBuf;

use crate::provider::ProviderError;

/// Core error type.
///
/// Provider adapters report [`ProviderError`]; the resolver and orchestrator
/// translate those into the outcome classes callers act on (not found vs.
/// download failure vs. fatal auth problem).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("authorization required: {0}")]
    AuthRequired(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("index {index} out of range (album has {len} item(s))")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("corrupt cache entry {path}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },
}

impl Error {
    /// True for outcomes a caller reports as "media not found" (404-equivalent).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::IndexOutOfRange { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
