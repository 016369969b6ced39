use thiserror::Error;

use crate::app::BuildError;
use crate::config::ConfigError;
use crate::domain::{FetchError, PlatformError, StoreError};

/// Any failure that leaves the crate's public entry points.
///
/// Components only let `Store` escape a cycle; the other variants surface from
/// wiring (config, builder) and from one-shot commands.
#[derive(Debug, Error)]
pub enum SpindleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("local filesystem error: {0}")]
    Io(#[from] std::io::Error),
}
