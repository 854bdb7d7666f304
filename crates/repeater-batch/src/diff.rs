//! Differ: classify desired records against what is stored.

use std::collections::HashMap;

use crate::types::{FieldRecord, PersistedRecord, RecordUpdate};
use crate::value::{deserialize_meta_value, values_equal};

/// Desired records split by the write they need. Input order is kept within
/// each set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    pub to_insert: Vec<FieldRecord>,
    pub to_update: Vec<RecordUpdate>,
    pub noop: Vec<FieldRecord>,
}

impl DiffResult {
    /// True when nothing needs writing.
    pub fn is_clean(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty()
    }
}

/// Partition `desired` into inserts, updates and no-ops.
///
/// Comparison happens on decoded values, before anything is serialized, so
/// `5` against a stored `"5"` is a no-op.
pub fn diff(desired: &[FieldRecord], existing: &HashMap<String, PersistedRecord>) -> DiffResult {
    let mut result = DiffResult::default();

    for record in desired {
        match existing.get(&record.meta_key) {
            None => result.to_insert.push(record.clone()),
            Some(stored) => {
                let current = deserialize_meta_value(&stored.meta_value);
                if values_equal(&record.meta_value, &current) {
                    result.noop.push(record.clone());
                } else {
                    result.to_update.push(RecordUpdate {
                        meta_id: stored.id,
                        record: record.clone(),
                    });
                }
            }
        }
    }

    result
}
