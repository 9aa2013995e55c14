//! Approval workflow primitives
//!
//! - `aggregate_status` derives a content status from its approvals
//! - `KeyedLocks` serializes work per content id

use crate::models::{ApprovalStatus, ContentStatus};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Derive the overall content status from a set of approvals.
///
/// Any rejection wins. A non-empty set of approvals that are all approved
/// gives `Approved`. Anything else with at least one approval (some still
/// pending) is `InReview`. An empty set returns `None`: the caller keeps the
/// stored status.
pub fn aggregate_status(approvals: &[ApprovalStatus]) -> Option<ContentStatus> {
    if approvals.is_empty() {
        return None;
    }
    if approvals.contains(&ApprovalStatus::Rejected) {
        return Some(ContentStatus::Rejected);
    }
    if approvals.iter().all(|s| *s == ApprovalStatus::Approved) {
        return Some(ContentStatus::Approved);
    }
    Some(ContentStatus::InReview)
}

/// Per-key async mutexes.
///
/// Holding the guard returned by [`KeyedLocks::lock`] excludes every other
/// holder of the same key; different keys never contend. Entries are kept as
/// weak references and pruned once no guard or waiter holds them.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<i64, Weak<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            match locks.get(&key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    locks.retain(|_, weak| weak.strong_count() > 0);
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(key, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked (live or not yet pruned)
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
