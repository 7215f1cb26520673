//! Credential store trait definition.
//!
//! This module defines [`CredentialStore`], the persistence abstraction for
//! enrolled identities. Production deployments use the durable
//! [`FileCredentialStore`](crate::FileCredentialStore); tests use
//! [`MemoryCredentialStore`](crate::MemoryCredentialStore).
//!
//! # Write Semantics
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`get`](CredentialStore::get) | Look up an identity by label |
//! | [`put_if_absent`](CredentialStore::put_if_absent) | Atomically bind a free label |
//! | [`labels`](CredentialStore::labels) | List bound labels |
//!
//! There is deliberately no `update` or `delete`. Once a label is bound it is
//! never silently overwritten; re-provisioning the same label is a no-op that
//! reports [`PutOutcome::AlreadyPresent`]. Identity rotation is a separate
//! concern that this crate does not implement.
//!
//! # Lifecycle
//!
//! Stores are explicit dependencies: open one at process start, share it via
//! `Arc`, and drop it at shutdown. There is no global wallet.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{error::WalletResult, identity::Identity, types::Label};

/// Result of a [`put_if_absent`](CredentialStore::put_if_absent) call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "an already-present label means the supplied identity was not stored"]
pub enum PutOutcome {
    /// The label was free and the identity is now stored under it.
    Inserted,
    /// The label was already bound; the store is unchanged.
    AlreadyPresent,
}

impl PutOutcome {
    /// Returns `true` if this call stored the identity.
    #[must_use]
    pub fn is_inserted(self) -> bool {
        matches!(self, PutOutcome::Inserted)
    }
}

/// Persistent mapping from [`Label`] to [`Identity`].
///
/// Implementations must be thread-safe and must make
/// [`put_if_absent`](CredentialStore::put_if_absent) atomic per label: when two
/// callers race on the same free label, exactly one observes
/// [`PutOutcome::Inserted`].
///
/// # Example
///
/// ```
/// use claimnet_wallet::{CredentialStore, Identity, Label, MemoryCredentialStore, PutOutcome};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryCredentialStore::new();
/// let label = Label::new("admin").unwrap();
/// let identity = Identity::builder()
///     .label(label.clone())
///     .certificate("CERT")
///     .private_key("KEY".to_owned())
///     .msp_id("Org1MSP")
///     .build();
///
/// assert_eq!(store.put_if_absent(identity.clone()).await.unwrap(), PutOutcome::Inserted);
/// assert_eq!(store.put_if_absent(identity).await.unwrap(), PutOutcome::AlreadyPresent);
/// assert!(store.get(&label).await.unwrap().is_some());
/// # });
/// ```
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieves the identity bound to `label`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(identity))` if the label is bound
    /// - `Ok(None)` if it is not
    /// - `Err(...)` on store errors
    #[must_use = "store operations may fail and errors must be handled"]
    async fn get(&self, label: &Label) -> WalletResult<Option<Identity>>;

    /// Stores `identity` under `identity.label` unless that label is bound.
    ///
    /// Atomic per label. An existing binding is never modified.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn put_if_absent(&self, identity: Identity) -> WalletResult<PutOutcome>;

    /// Lists bound labels in ascending order.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn labels(&self) -> WalletResult<Vec<Label>>;
}

#[async_trait]
impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    async fn get(&self, label: &Label) -> WalletResult<Option<Identity>> {
        (**self).get(label).await
    }

    async fn put_if_absent(&self, identity: Identity) -> WalletResult<PutOutcome> {
        (**self).put_if_absent(identity).await
    }

    async fn labels(&self) -> WalletResult<Vec<Label>> {
        (**self).labels().await
    }
}
