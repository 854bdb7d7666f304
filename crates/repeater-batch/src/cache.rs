//! Object cache: the consumed cache interface, an in-memory implementation,
//! and the coordinator that keeps it coherent with batched writes.
//!
//! Two kinds of entry are touched:
//! - the composite entry for the whole object, `(<kind>_meta, <id>)`, which
//!   is dropped before a write starts
//! - one entry per record, `("acf", "load_value/post_id=<object>/name=<key>")`,
//!   written back after the store commits

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::object::ObjectRef;
use crate::types::FieldRecord;

/// Scope holding per-record entries.
pub const FIELD_SCOPE: &str = "acf";

/// Key of the per-record entry for `meta_key` on `object`.
pub fn field_cache_key(object: &ObjectRef, meta_key: &str) -> String {
    format!("load_value/post_id={object}/name={meta_key}")
}

/// Scope and key of the composite entry for `object`.
pub fn object_cache_entry(object: &ObjectRef) -> (String, String) {
    let id = match object.numeric_id() {
        Some(id) => id.to_string(),
        None => object.to_string(),
    };
    (format!("{}_meta", object.kind()), id)
}

// ============================================================================
// MetaCache
// ============================================================================

/// Scoped key/value cache.
pub trait MetaCache: Send + Sync {
    fn get(&self, scope: &str, key: &str) -> Option<Value>;

    fn set(&self, scope: &str, key: &str, value: Value);

    /// Returns whether an entry was removed.
    fn delete(&self, scope: &str, key: &str) -> bool;
}

/// Process-local cache backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(String, String), Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, scope: &str, key: &str) -> bool {
        self.entries
            .lock()
            .contains_key(&(scope.to_string(), key.to_string()))
    }
}

impl MetaCache for MemoryCache {
    fn get(&self, scope: &str, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .get(&(scope.to_string(), key.to_string()))
            .cloned()
    }

    fn set(&self, scope: &str, key: &str, value: Value) {
        self.entries
            .lock()
            .insert((scope.to_string(), key.to_string()), value);
    }

    fn delete(&self, scope: &str, key: &str) -> bool {
        self.entries
            .lock()
            .remove(&(scope.to_string(), key.to_string()))
            .is_some()
    }
}

// ============================================================================
// CacheCoordinator
// ============================================================================

pub struct CacheCoordinator<'a, C: MetaCache> {
    cache: &'a C,
}

impl<'a, C: MetaCache> CacheCoordinator<'a, C> {
    pub fn new(cache: &'a C) -> Self {
        Self { cache }
    }

    /// Drop the composite entry. Runs before the write, so it stands even
    /// if the write fails.
    pub fn invalidate(&self, object: &ObjectRef) {
        let (scope, key) = object_cache_entry(object);
        self.cache.delete(&scope, &key);
    }

    /// Store each record's value under its per-record key. Only call after
    /// the write committed.
    pub fn repopulate<'r>(&self, object: &ObjectRef, records: impl IntoIterator<Item = &'r FieldRecord>) {
        let mut count = 0usize;
        for record in records {
            self.cache.set(
                FIELD_SCOPE,
                &field_cache_key(object, &record.meta_key),
                record.meta_value.clone(),
            );
            count += 1;
        }
        tracing::debug!(object = %object, entries = count, "cache repopulated");
    }

    /// Drop per-record entries for keys that no longer exist.
    pub fn forget<'k>(&self, object: &ObjectRef, keys: impl IntoIterator<Item = &'k String>) {
        for key in keys {
            self.cache.delete(FIELD_SCOPE, &field_cache_key(object, key));
        }
    }
}
