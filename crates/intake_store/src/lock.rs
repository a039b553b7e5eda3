//! In-process serialization of work on one (subject, schema) pair.
//!
//! Distinct pairs never contend. Entries are dropped once no caller holds
//! or waits on them.

use intake_ids::{SchemaId, SubjectRef};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

type PairKey = (SubjectRef, SchemaId);

/// A keyed lock table.
#[derive(Debug, Default)]
pub struct PairLocks {
    table: Mutex<HashMap<PairKey, Arc<Mutex<()>>>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `(subject, schema_id)`.
    pub fn with_lock<T>(&self, subject: &SubjectRef, schema_id: &SchemaId, f: impl FnOnce() -> T) -> T {
        let key = (subject.clone(), schema_id.clone());
        let slot = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(key.clone()).or_default())
        };

        let result = {
            // The guarded value is `()`, so a poisoned lock carries no bad state.
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table plus ours: nobody else is waiting.
        if Arc::strong_count(&slot) == 2 {
            table.remove(&key);
        }
        result
    }

    /// Number of pairs currently tracked.
    pub fn tracked(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
