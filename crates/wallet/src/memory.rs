//! In-memory credential store.
//!
//! This module provides [`MemoryCredentialStore`], an implementation of
//! [`CredentialStore`] suitable for tests and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered**: Labels are kept in a [`BTreeMap`] so `labels()` is sorted
//! - **Atomic insert**: `put_if_absent` checks and inserts under one write lock
//!
//! # Limitations
//!
//! Nothing is persisted; all identities are lost when the process exits.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::WalletResult,
    identity::Identity,
    store::{CredentialStore, PutOutcome},
    types::Label,
};

/// In-memory credential store backed by a [`BTreeMap`].
///
/// Cheaply cloneable; all clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    identities: Arc<RwLock<BTreeMap<Label, Identity>>>,
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("len", &self.identities.read().len())
            .finish()
    }
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of bound labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.read().len()
    }

    /// Returns `true` if no label is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.read().is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    #[tracing::instrument(skip(self), fields(label = %label))]
    async fn get(&self, label: &Label) -> WalletResult<Option<Identity>> {
        Ok(self.identities.read().get(label).cloned())
    }

    #[tracing::instrument(skip(self, identity), fields(label = %identity.label))]
    async fn put_if_absent(&self, identity: Identity) -> WalletResult<PutOutcome> {
        let mut identities = self.identities.write();

        if identities.contains_key(&identity.label) {
            tracing::debug!("label already bound, leaving existing identity in place");
            return Ok(PutOutcome::AlreadyPresent);
        }

        identities.insert(identity.label.clone(), identity);
        Ok(PutOutcome::Inserted)
    }

    async fn labels(&self) -> WalletResult<Vec<Label>> {
        Ok(self.identities.read().keys().cloned().collect())
    }
}
