//! Errors - バックエンドエラーの型と分類
//!
//! 外部システム（DB, blob storage, SNS platform）ごとにエラー型を分けます。
//! リトライするかどうかは呼び出し側（publish pipeline, relationship tracker）が
//! 文脈に応じて `Outcome` に変換して決めます。同じ RateLimited でも、
//! 投稿なら打ち切り、フォローなら次回に持ち越しです。

use std::path::PathBuf;

use thiserror::Error;

use super::ids::AssetKey;
use super::record::RecordMismatch;

/// Persistence gateway failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not connect to the database after {attempts} attempt(s): {reason}")]
    Connect { attempts: u32, reason: String },

    #[error("database operation failed: {0}")]
    Query(String),

    #[error("stored value is malformed: {0}")]
    Malformed(String),

    #[error(transparent)]
    Mismatch(#[from] RecordMismatch),
}

/// Asset pool failures, one variant per failure class the pipeline reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The asset was removed from storage after being queued.
    #[error("asset {0} does not exist in the bucket")]
    NotFound(AssetKey),

    #[error("destination folder {} does not exist", .0.display())]
    FolderMissing(PathBuf),

    /// The key names a folder rather than a file (malformed key).
    #[error("destination {} is a directory (attempted to download a folder instead of a file)", .0.display())]
    IsDirectory(PathBuf),

    #[error("asset storage I/O failed: {0}")]
    Io(String),
}

/// Social platform failures, classified by backend signal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("request limit reached")]
    RateLimited,

    /// Pending request, block, or suspension on the other side.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("platform server error")]
    ServerError,

    #[error("service unavailable")]
    Unavailable,

    #[error("{reason} ({status})")]
    Other { status: u16, reason: String },

    /// No backend status at all (timeout, connection reset, broken pipe).
    #[error("failed to send request: {0}")]
    Transport(String),

    /// The request could not be built (unsupported payload shape).
    #[error("could not encode request: {0}")]
    Encoding(String),
}

impl PlatformError {
    /// Map an HTTP-style status onto the classification.
    pub fn from_status(status: u16, reason: impl Into<String>) -> Self {
        match status {
            429 => PlatformError::RateLimited,
            403 => PlatformError::Forbidden(reason.into()),
            500 => PlatformError::ServerError,
            503 => PlatformError::Unavailable,
            _ => PlatformError::Other {
                status,
                reason: reason.into(),
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::RateLimited => Some(429),
            PlatformError::Forbidden(_) => Some(403),
            PlatformError::ServerError => Some(500),
            PlatformError::Unavailable => Some(503),
            PlatformError::Other { status, .. } => Some(*status),
            PlatformError::Transport(_) | PlatformError::Encoding(_) => None,
        }
    }
}
