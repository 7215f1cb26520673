//! Per-label async locks for serializing provisioning.
//!
//! [`put_if_absent`](crate::CredentialStore::put_if_absent) makes the *write*
//! atomic, but a naive "get, enroll, put" sequence can still issue two CA
//! enrollments when two callers race on the same label. [`LabelLocks`] lets a
//! caller hold the label for the whole sequence while leaving distinct labels
//! free to proceed concurrently.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::Label;

type Registry = Arc<Mutex<HashMap<Label, Slot>>>;

/// A label's mutex and the number of tasks holding or waiting on it.
#[derive(Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    users: usize,
}

/// Registry of one async mutex per label.
///
/// Entries are created on first use and pruned when no task holds or waits on
/// them, including waiters that are cancelled before they acquire.
///
/// # Example
///
/// ```
/// use claimnet_wallet::{Label, LabelLocks};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let locks = LabelLocks::new();
/// let label = Label::new("admin").unwrap();
///
/// let guard = locks.lock(&label).await;
/// // check the store, enroll, put_if_absent ...
/// drop(guard);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct LabelLocks {
    inner: Registry,
}

impl std::fmt::Debug for LabelLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelLocks").field("tracked", &self.inner.lock().len()).finish()
    }
}

/// One task's interest in a label, from the start of its wait until release.
struct Interest {
    label: Label,
    registry: Registry,
}

impl Drop for Interest {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        if let Some(slot) = registry.get_mut(&self.label) {
            slot.users -= 1;
            if slot.users == 0 {
                registry.remove(&self.label);
            }
        }
    }
}

/// Exclusive hold on a label. Released on drop.
pub struct LabelGuard {
    // Field order matters: the mutex is released before the interest is
    // withdrawn, so a pruned slot is never still held.
    _guard: OwnedMutexGuard<()>,
    interest: Interest,
}

impl LabelGuard {
    /// Returns the held label.
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.interest.label
    }
}

impl std::fmt::Debug for LabelGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelGuard").field("label", self.label()).finish()
    }
}

impl LabelLocks {
    /// Creates an empty lock registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `label`.
    ///
    /// Dropping the returned future before it completes withdraws the wait.
    pub async fn lock(&self, label: &Label) -> LabelGuard {
        let (interest, mutex) = {
            let mut registry = self.inner.lock();
            let slot = registry.entry(label.clone()).or_default();
            slot.users += 1;
            let interest = Interest { label: label.clone(), registry: Arc::clone(&self.inner) };
            (interest, Arc::clone(&slot.mutex))
        };

        let guard = mutex.lock_owned().await;

        LabelGuard { _guard: guard, interest }
    }

    /// Returns the number of labels currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.inner.lock().len()
    }
}
