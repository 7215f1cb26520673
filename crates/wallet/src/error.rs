//! Wallet error types and result alias.
//!
//! Every [`CredentialStore`](crate::CredentialStore) implementation maps its
//! internal failures onto [`WalletError`].
//!
//! # Error Types
//!
//! - [`WalletError::InvalidLabel`] - Label is empty, too long, or contains disallowed characters
//! - [`WalletError::Io`] - Filesystem failure in a durable store
//! - [`WalletError::Serialization`] - A stored record could not be encoded or decoded
//! - [`WalletError::Internal`] - Store-specific internal errors
//!
//! Note that an already-bound label is *not* an error: `put_if_absent`
//! reports it as [`PutOutcome::AlreadyPresent`](crate::PutOutcome::AlreadyPresent).
//!
//! # Example
//!
//! ```
//! use claimnet_wallet::{WalletError, WalletResult};
//!
//! fn check(label: &str) -> WalletResult<()> {
//!     Err(WalletError::invalid_label(label, "contains a path separator"))
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;

/// Errors that can occur while reading or writing credentials.
///
/// Errors preserve their source chain via the `#[source]` attribute.
///
/// # Non-exhaustive
///
/// New variants may be added without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WalletError {
    /// The label cannot be used as a store key.
    #[error("Invalid label '{label}': {reason}")]
    InvalidLabel {
        /// The rejected label.
        label: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Filesystem error in a durable store.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the failed operation.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: Option<BoxError>,
    },

    /// A record could not be encoded for storage or decoded on load.
    ///
    /// On read this usually means the stored file was edited by hand or
    /// written by an incompatible version.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// Catch-all for store-specific failures.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl WalletError {
    /// Creates a new `InvalidLabel` error.
    #[must_use]
    pub fn invalid_label(label: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidLabel { label: label.into(), reason }
    }

    /// Creates a new `Io` error with a message and source error.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }
}
