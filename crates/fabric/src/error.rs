//! Error types for certificate authority and ledger gateway operations.
//!
//! [`FabricError`] is the single error type surfaced by this crate. Its
//! variants map one-to-one onto the failure classes callers act on:
//!
//! | Variant | Raised by | Meaning |
//! |---------|-----------|---------|
//! | `Auth` | enroll | CA rejected the enrollment id / secret |
//! | `Network` | CA, ledger transport | endpoint unreachable, TLS failure, timeout |
//! | `AlreadyRegistered` | registrar | id is known to the CA or already in the wallet |
//! | `RegistrarAuth` | registrar | CA rejected the registrar's token or authority |
//! | `InvalidRegistrar` | registrar | registrar label misused (see variant docs) |
//! | `UnknownIdentity` | gateway, registrar | label not bound in the wallet |
//! | `UnsupportedOperation` | gateway | operation name outside the closed set |
//! | `InvalidArguments` | gateway | arguments do not match the operation's shape |
//! | `MissingRole` | gateway | identity lacks the role a write requires |
//! | `LedgerWrite` / `LedgerRead` | gateway | submit / evaluate failed |
//!
//! Payload-decoding failures of list queries are *not* represented here:
//! they are absorbed by [`crate::query`] into an empty result.

use std::sync::Arc;

use claimnet_wallet::{BoxError, Label, Role, WalletError};
use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, FabricError>;

/// Errors raised while provisioning identities or talking to the ledger.
///
/// # Non-exhaustive
///
/// New variants may be added without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FabricError {
    /// The CA rejected the enrollment credentials.
    #[error("Enrollment of '{enrollment_id}' rejected: {message}")]
    Auth {
        /// Enrollment id that was rejected.
        enrollment_id: String,
        /// CA-provided reason.
        message: String,
    },

    /// CA or ledger endpoint unreachable, TLS failure, or timeout.
    #[error("Network error: {message}")]
    Network {
        /// Description of the failure.
        message: String,
        /// The underlying transport error.
        #[source]
        source: Option<BoxError>,
    },

    /// The identity is already registered.
    #[error("Identity '{id}' is already registered")]
    AlreadyRegistered {
        /// The enrollment id or label that already exists.
        id: String,
    },

    /// The CA rejected the registrar's authority.
    #[error("Registrar '{registrar}' not authorised: {message}")]
    RegistrarAuth {
        /// Label of the registrar identity.
        registrar: String,
        /// CA-provided reason.
        message: String,
    },

    /// The registrar label cannot be used to register this identity.
    ///
    /// Raised when the registrar and the new identity share a label, or when
    /// the selected registrar is an operational identity.
    #[error("Invalid registrar '{label}': {reason}")]
    InvalidRegistrar {
        /// Label of the rejected registrar.
        label: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Any other error response from the CA.
    #[error("CA error (HTTP {status}{}): {message}", code_suffix(.code))]
    Ca {
        /// HTTP status code.
        status: u16,
        /// CA error code, when reported.
        code: Option<i64>,
        /// CA-provided message.
        message: String,
    },

    /// No identity is bound to the label.
    #[error("Unknown identity '{label}'")]
    UnknownIdentity {
        /// The missing label.
        label: Label,
    },

    /// The operation name is not one of the supported chaincode functions.
    #[error("Unsupported ledger operation '{name}'")]
    UnsupportedOperation {
        /// The rejected name.
        name: String,
    },

    /// Arguments do not match the operation's parameter shape.
    #[error("Invalid arguments for '{operation}': {message}")]
    InvalidArguments {
        /// Chaincode function name.
        operation: &'static str,
        /// What was wrong.
        message: String,
    },

    /// The identity lacks a role attribute permitted for this write.
    #[error("Identity '{label}' may not submit '{operation}' (requires one of {required:?})")]
    MissingRole {
        /// Label of the identity.
        label: Label,
        /// Chaincode function name.
        operation: &'static str,
        /// Roles permitted to submit the operation.
        required: &'static [Role],
    },

    /// A ledger write (submit) failed.
    #[error("Ledger write '{operation}' failed: {message}")]
    LedgerWrite {
        /// Chaincode function name.
        operation: &'static str,
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// A ledger read (evaluate) failed at the transport or chaincode level.
    #[error("Ledger read '{operation}' failed: {message}")]
    LedgerRead {
        /// Chaincode function name.
        operation: &'static str,
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// Key generation, CSR construction, or request signing failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential store error.
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl FabricError {
    /// Creates a new `Network` error with the given message.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into(), source: None }
    }

    /// Creates a new `Network` error with a message and source error.
    #[must_use]
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a `LedgerRead` error for `operation`.
    #[must_use]
    pub fn ledger_read(operation: &'static str, message: impl Into<String>) -> Self {
        Self::LedgerRead { operation, message: message.into(), source: None }
    }

    /// Creates a `LedgerWrite` error for `operation`.
    #[must_use]
    pub fn ledger_write(operation: &'static str, message: impl Into<String>) -> Self {
        Self::LedgerWrite { operation, message: message.into(), source: None }
    }

    /// Creates an `InvalidArguments` error for `operation`.
    #[must_use]
    pub fn invalid_arguments(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArguments { operation, message: message.into() }
    }

    /// Returns `true` for failures that may succeed on retry.
    ///
    /// Only transport-level failures qualify. Only idempotent operations
    /// (ledger evaluate) are retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Re-classifies a transport failure during a read as `LedgerRead`.
    ///
    /// Errors that already carry a more specific class pass through.
    #[must_use]
    pub fn into_read_failure(self, operation: &'static str) -> Self {
        match self {
            Self::Network { message, source } => Self::LedgerRead { operation, message, source },
            other => other,
        }
    }

    /// Re-classifies a transport failure during a write as `LedgerWrite`.
    #[must_use]
    pub fn into_write_failure(self, operation: &'static str) -> Self {
        match self {
            Self::Network { message, source } => Self::LedgerWrite { operation, message, source },
            other => other,
        }
    }
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(", code {c}")).unwrap_or_default()
}

impl From<reqwest::Error> for FabricError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_owned()
        } else if err.is_connect() {
            "connection failed".to_owned()
        } else if err.is_decode() {
            "failed to decode response body".to_owned()
        } else {
            "request failed".to_owned()
        };
        Self::network_with_source(message, err)
    }
}
