//! Error types for metric storage operations.

/// Errors that can occur during metric store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested metric does not exist.
    #[error("metric not found: {0}")]
    NotFound(String),

    /// Malformed input: bad metric key, bad series payload, or bad filter.
    #[error("validation error: {0}")]
    Validation(String),

    /// A stored series file could not be decoded.
    ///
    /// Distinct from [`StoreError::Validation`]: the caller's input was
    /// fine, the data on disk is not.
    #[error("corrupt series file for {metric}: {detail}")]
    Corrupt {
        /// The affected metric key.
        metric: String,
        /// Decoder diagnostic.
        detail: String,
    },

    /// The inventory cache is being (re)built; retry later.
    #[error("inventory cache is building, retry later")]
    CacheBuilding,

    /// An I/O error from the backing filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Shorthand for a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
