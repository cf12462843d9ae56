//! Per-run dedup memos.
//!
//! One `RunMemos` lives for the duration of a mirror invocation and is shared
//! by every worker. It guarantees each account is synced at most once and
//! each (list, account) pair gets at most one symlink creation attempt, even
//! when the same account appears in several lists.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::store::EntityHandle;

#[derive(Default)]
pub struct RunMemos {
    synced: Mutex<HashMap<u64, Arc<EntityHandle>>>,
    linked: Mutex<HashSet<(i64, u64)>>,
}

impl RunMemos {
    pub fn new() -> Self {
        RunMemos::default()
    }

    /// The entity already synced for this account, if any.
    pub fn entity_for(&self, account_id: u64) -> Option<Arc<EntityHandle>> {
        self.synced
            .lock()
            .expect("sync memo poisoned")
            .get(&account_id)
            .cloned()
    }

    /// Record a synced entity. The first write wins; returns false (and
    /// leaves the memo untouched) when the account was already recorded.
    pub fn record_entity(&self, account_id: u64, entity: Arc<EntityHandle>) -> bool {
        let mut synced = self.synced.lock().expect("sync memo poisoned");
        if synced.contains_key(&account_id) {
            return false;
        }
        synced.insert(account_id, entity);
        true
    }

    /// Claim the one symlink attempt for a (list entity, account) pair.
    /// Returns true exactly once per pair per run.
    pub fn claim_link(&self, list_entity_id: i64, account_id: u64) -> bool {
        self.linked
            .lock()
            .expect("link memo poisoned")
            .insert((list_entity_id, account_id))
    }
}
