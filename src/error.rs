//! Error types for netgraph

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during topology analysis
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A link, policy, or lookup referenced a name that does not exist
    #[error("unknown reference: {0}")]
    UnknownReference(String),

    /// A selection expression was malformed or matched nothing where a
    /// match is required
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// Invalid configuration (bad mode, probability out of range, ...)
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// NaN or infinity reached a capacity or cost where a finite value is
    /// required
    #[error("numeric failure: {0}")]
    NumericFailure(String),

    /// Internal error (bug)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unknown-reference error
    pub fn unknown_reference(msg: impl Into<String>) -> Self {
        Self::UnknownReference(msg.into())
    }

    /// Create an invalid-selector error
    pub fn invalid_selector(msg: impl Into<String>) -> Self {
        Self::InvalidSelector(msg.into())
    }

    /// Create an invalid-config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a numeric-failure error
    pub fn numeric(msg: impl Into<String>) -> Self {
        Self::NumericFailure(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
