use craq_client::{ClientError, FailureReason};
use location_cache::CacheError;

use crate::config::ConfigError;

/// Errors returned by the object segmentation.
#[derive(Debug, thiserror::Error)]
pub enum OsegError {
    /// The segmentation was stopped before the lookup finished.
    #[error("object segmentation stopped")]
    Stopped,

    /// The store kept answering NOT_FOUND until the retry limit.
    #[error("object location unresolved")]
    Unresolved,

    /// The store could not be reached within the attempt limit.
    #[error("backend failure: {0}")]
    Backend(FailureReason),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
