//! MemoryStore: a `MetaStore` that keeps every meta table in memory.
//!
//! Rows live in per-table vectors in insertion (id) order, so duplicate keys
//! behave as they would in an unconstrained SQL table. Each trait call counts
//! as one round trip in [`StoreStats`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, ReentrantMutex};

use crate::error::Result;
use crate::types::{MetaId, MetaRow, PersistedRecord};

use super::table::Destination;
use super::traits::MetaStore;

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone)]
struct MemRow {
    id: MetaId,
    object: Option<u64>,
    /// Stored key (bucket-prefixed for options).
    key: String,
    value: String,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// table name → rows ordered by id
    tables: HashMap<String, Vec<MemRow>>,
    next_id: MetaId,
}

impl MemoryState {
    fn alloc_id(&mut self) -> MetaId {
        self.next_id += 1;
        self.next_id
    }
}

/// Number of store calls made, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub selects: usize,
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory meta store.
///
/// Interior mutability via `parking_lot::Mutex`. Every call also takes the
/// `ReentrantMutex` writer lock, which a transaction holds for its whole
/// closure: other threads wait for the commit or rollback, while the owning
/// thread re-enters freely and may open nested transactions.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    writer: ReentrantMutex<()>,
    selects: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one row directly, bypassing batching. Allows seeding duplicate
    /// keys for tests and fixtures.
    pub fn seed(&self, dest: &Destination, meta_key: &str, meta_value: &str) -> MetaId {
        let _writer = self.writer.lock();
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state
            .tables
            .entry(dest.table.name.clone())
            .or_default()
            .push(MemRow {
                id,
                object: dest.object_value(),
                key: dest.storage_key(meta_key),
                value: meta_value.to_string(),
            });
        id
    }

    /// All rows for the destination's object, ordered by id.
    pub fn rows(&self, dest: &Destination) -> Vec<PersistedRecord> {
        let state = self.state.lock();
        let object = dest.object_value();
        state
            .tables
            .get(&dest.table.name)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.object == object)
                    .filter_map(|r| {
                        dest.meta_key(&r.key).map(|meta_key| PersistedRecord {
                            id: r.id,
                            meta_key,
                            meta_value: r.value.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            selects: self.selects.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.selects.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.updates.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }
}

// ============================================================================
// MetaStore implementation
// ============================================================================

impl MetaStore for MemoryStore {
    fn select(&self, dest: &Destination, keys: &[String]) -> Result<Vec<PersistedRecord>> {
        let _writer = self.writer.lock();
        self.selects.fetch_add(1, Ordering::Relaxed);
        let wanted: Vec<String> = keys.iter().map(|k| dest.storage_key(k)).collect();
        let object = dest.object_value();

        let state = self.state.lock();
        let Some(rows) = state.tables.get(&dest.table.name) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|r| r.object == object && wanted.contains(&r.key))
            .filter_map(|r| {
                dest.meta_key(&r.key).map(|meta_key| PersistedRecord {
                    id: r.id,
                    meta_key,
                    meta_value: r.value.clone(),
                })
            })
            .collect())
    }

    fn insert_batch(&self, dest: &Destination, rows: &[MetaRow]) -> Result<usize> {
        let _writer = self.writer.lock();
        self.inserts.fetch_add(1, Ordering::Relaxed);
        let object = dest.object_value();

        let mut state = self.state.lock();
        let mut new_rows = Vec::with_capacity(rows.len());
        for row in rows {
            new_rows.push(MemRow {
                id: state.alloc_id(),
                object,
                key: dest.storage_key(&row.meta_key),
                value: row.meta_value.clone(),
            });
        }
        state
            .tables
            .entry(dest.table.name.clone())
            .or_default()
            .extend(new_rows);
        Ok(rows.len())
    }

    fn update_batch(&self, dest: &Destination, rows: &[MetaRow]) -> Result<usize> {
        let _writer = self.writer.lock();
        self.updates.fetch_add(1, Ordering::Relaxed);
        let values: HashMap<String, &str> = rows
            .iter()
            .map(|r| (dest.storage_key(&r.meta_key), r.meta_value.as_str()))
            .collect();
        let object = dest.object_value();

        let mut state = self.state.lock();
        let Some(table) = state.tables.get_mut(&dest.table.name) else {
            return Ok(0);
        };
        let mut affected = 0;
        for row in table.iter_mut().filter(|r| r.object == object) {
            if let Some(v) = values.get(&row.key) {
                row.value = (*v).to_string();
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn delete_one(&self, dest: &Destination, key: &str) -> Result<bool> {
        let _writer = self.writer.lock();
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let stored = dest.storage_key(key);
        let object = dest.object_value();

        let mut state = self.state.lock();
        let Some(table) = state.tables.get_mut(&dest.table.name) else {
            return Ok(false);
        };
        let before = table.len();
        table.retain(|r| !(r.object == object && r.key == stored));
        Ok(table.len() < before)
    }

    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let _writer = self.writer.lock();
        let snapshot = self.state.lock().clone();

        let result = f(self);
        if result.is_err() {
            *self.state.lock() = snapshot;
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
