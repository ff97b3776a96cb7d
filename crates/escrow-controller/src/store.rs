//! # Record Store
//!
//! Thread-safe in-memory map of escrow records.
//!
//! The map itself sits behind a `parking_lot::RwLock` held only long enough
//! to look up or insert an entry. Each record then has its own `Mutex`, so
//! calls on one record are serialized (single writer) while calls on
//! different records run in parallel. `parking_lot` locks are not
//! poisonable: a panicking writer does not wedge the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use escrow_core::EscrowId;
use escrow_state::EscrowRecord;

/// A shared handle to one record's lock.
pub type RecordHandle = Arc<Mutex<EscrowRecord>>;

/// In-memory escrow records keyed by [`EscrowId`].
#[derive(Debug)]
pub struct RecordStore {
    records: RwLock<HashMap<EscrowId, RecordHandle>>,
    next_id: AtomicU64,
}

impl RecordStore {
    /// Create an empty store. Identifiers start at 1.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh, never-reused identifier.
    pub fn allocate_id(&self) -> EscrowId {
        EscrowId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert a newly created record.
    ///
    /// Returns `false` and leaves the store unchanged if the id is taken.
    pub fn insert(&self, record: EscrowRecord) -> bool {
        let mut records = self.records.write();
        let id = record.escrow_id();
        if records.contains_key(&id) {
            return false;
        }
        records.insert(id, Arc::new(Mutex::new(record)));
        true
    }

    /// The lock guarding one record.
    pub fn handle(&self, id: EscrowId) -> Option<RecordHandle> {
        self.records.read().get(&id).cloned()
    }

    /// A snapshot of one record.
    pub fn get(&self, id: EscrowId) -> Option<EscrowRecord> {
        self.handle(id).map(|h| h.lock().clone())
    }

    /// Snapshots of all records, ordered by id.
    pub fn list(&self) -> Vec<EscrowRecord> {
        let mut handles: Vec<(EscrowId, RecordHandle)> = self
            .records
            .read()
            .iter()
            .map(|(id, h)| (*id, Arc::clone(h)))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles.into_iter().map(|(_, h)| h.lock().clone()).collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
