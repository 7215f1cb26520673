//! Ledger sessions.
//!
//! A session is bound to one identity and lives for one gateway call. The
//! transport is pluggable through [`LedgerConnector`]; the gateway wraps every
//! session it opens in a [`SessionGuard`] so that it is released on every
//! exit path, including cancellation of the calling future.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use claimnet_wallet::{Identity, Label};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identifier of a committed ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wraps a transaction id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open connection to the ledger, bound to one identity.
#[async_trait]
pub trait LedgerSession: Send + Sync {
    /// Evaluates a read-only chaincode function and returns its raw payload.
    async fn evaluate(&self, function: &'static str, args: &[String]) -> Result<Bytes>;

    /// Submits a chaincode transaction and waits for it to commit.
    async fn submit(&self, function: &'static str, args: &[String]) -> Result<TransactionId>;

    /// Closes the session gracefully.
    async fn close(&mut self) -> Result<()>;

    /// Releases the session immediately without waiting on the network.
    ///
    /// Called from `Drop` when a session is abandoned, so it must not block.
    /// Calling it after [`close`](Self::close) must be harmless.
    fn abort(&mut self);
}

/// Opens sessions for identities.
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    /// Opens a session authenticated as `identity`.
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn LedgerSession>>;
}

#[async_trait]
impl<C: LedgerConnector + ?Sized> LedgerConnector for std::sync::Arc<C> {
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn LedgerSession>> {
        (**self).connect(identity).await
    }
}

/// Scoped ownership of a session.
///
/// [`close`](Self::close) releases it gracefully. If the guard is dropped
/// first (an early return or a cancelled future), `Drop` aborts the session
/// and logs a warning.
pub struct SessionGuard {
    label: Label,
    session: Option<Box<dyn LedgerSession>>,
}

impl SessionGuard {
    /// Takes ownership of `session` opened for `label`.
    #[must_use]
    pub fn new(label: Label, session: Box<dyn LedgerSession>) -> Self {
        Self { label, session: Some(session) }
    }

    /// Returns the label the session is bound to.
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.label
    }

    /// Returns the guarded session.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Network`](crate::FabricError::Network) if the
    /// session was already released.
    pub fn session(&self) -> Result<&dyn LedgerSession> {
        self.session
            .as_deref()
            .ok_or_else(|| crate::FabricError::network("ledger session already released"))
    }

    /// Closes the session.
    ///
    /// If this future is itself cancelled, `Drop` still aborts the session.
    ///
    /// # Errors
    ///
    /// Returns whatever the transport reports while closing.
    pub async fn close(mut self) -> Result<()> {
        let result = match self.session.as_mut() {
            Some(session) => session.close().await,
            None => Ok(()),
        };
        self.session = None;
        result
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("label", &self.label)
            .field("open", &self.session.is_some())
            .finish()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::warn!(label = %self.label, "ledger session dropped without close, aborting");
            session.abort();
        }
    }
}
