//! BatchWriter: turns diffed records into a handful of store statements.
//!
//! Inserts go out as one multi-row statement, updates as one CASE-keyed
//! statement and deletes one per key. The writer does not open a
//! transaction itself; the pipeline wraps all three phases in one.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::error::{BatchOperation, RepeaterError, Result};
use crate::hooks::MetaObserver;
use crate::storage::{Destination, MetaStore};
use crate::types::{FieldRecord, MetaId, MetaRow, PersistedRecord, RecordUpdate};
use crate::value::serialize_meta_value;

/// Result of the insert phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: usize,
    /// Keys an observer vetoed.
    pub vetoed: Vec<String>,
}

/// Result of the update phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub updated: usize,
    /// Records sent to the insert path because their row was gone.
    pub redirected_inserts: usize,
    pub vetoed: Vec<String>,
}

pub struct BatchWriter<'a, S: MetaStore> {
    store: &'a S,
    observer: &'a dyn MetaObserver,
}

impl<'a, S: MetaStore> BatchWriter<'a, S> {
    pub fn new(store: &'a S, observer: &'a dyn MetaObserver) -> Self {
        Self { store, observer }
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Insert every record the observer allows with one statement.
    pub fn apply_insert(&self, dest: &Destination, records: &[FieldRecord]) -> Result<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        let mut accepted: Vec<&FieldRecord> = Vec::with_capacity(records.len());

        for record in records {
            if let Some(reason) =
                self.observer
                    .short_circuit_add(&dest.object, &record.meta_key, &record.meta_value)
            {
                log_veto(dest, &record.meta_key, BatchOperation::Insert, &reason);
                outcome.vetoed.push(record.meta_key.clone());
                continue;
            }
            accepted.push(record);
        }

        if accepted.is_empty() {
            return Ok(outcome);
        }

        let rows = to_rows(accepted.iter().copied())?;
        for record in &accepted {
            self.observer
                .before_add(&dest.object, &record.meta_key, &record.meta_value);
        }

        let affected = self.store.insert_batch(dest, &rows)?;
        check_affected(dest, BatchOperation::Insert, rows.len(), affected)?;

        for record in &accepted {
            self.observer
                .after_added(&dest.object, &record.meta_key, &record.meta_value);
        }

        outcome.inserted = rows.len();
        tracing::debug!(
            object = %dest.object,
            table = %dest.table.name,
            inserted = outcome.inserted,
            vetoed = outcome.vetoed.len(),
            "batch insert"
        );
        Ok(outcome)
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Update every changed record with one statement. Updates whose key has
    /// no row in `existing` are inserted instead.
    pub fn apply_update(
        &self,
        dest: &Destination,
        updates: &[RecordUpdate],
        existing: &HashMap<String, PersistedRecord>,
    ) -> Result<UpdateOutcome> {
        let mut outcome = UpdateOutcome::default();
        let mut redirected = Vec::new();
        let mut accepted: Vec<(MetaId, &FieldRecord)> = Vec::with_capacity(updates.len());

        for update in updates {
            let record = &update.record;
            let Some(stored) = existing.get(&record.meta_key) else {
                redirected.push(record.clone());
                continue;
            };
            if let Some(reason) =
                self.observer
                    .short_circuit_update(&dest.object, &record.meta_key, &record.meta_value)
            {
                log_veto(dest, &record.meta_key, BatchOperation::Update, &reason);
                outcome.vetoed.push(record.meta_key.clone());
                continue;
            }
            accepted.push((stored.id, record));
        }

        if !redirected.is_empty() {
            let inserted = self.apply_insert(dest, &redirected)?;
            outcome.redirected_inserts = inserted.inserted;
            outcome.vetoed.extend(inserted.vetoed);
        }

        if accepted.is_empty() {
            return Ok(outcome);
        }

        let rows = to_rows(accepted.iter().map(|(_, r)| *r))?;
        for (meta_id, record) in &accepted {
            self.observer
                .before_update(*meta_id, &dest.object, &record.meta_key, &record.meta_value);
        }

        let affected = self.store.update_batch(dest, &rows)?;
        check_affected(dest, BatchOperation::Update, rows.len(), affected)?;

        for (meta_id, record) in &accepted {
            self.observer
                .after_updated(*meta_id, &dest.object, &record.meta_key, &record.meta_value);
        }

        outcome.updated = rows.len();
        tracing::debug!(
            object = %dest.object,
            table = %dest.table.name,
            updated = outcome.updated,
            redirected = outcome.redirected_inserts,
            vetoed = outcome.vetoed.len(),
            "batch update"
        );
        Ok(outcome)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete each key for this object. Keys with no rows are skipped.
    /// Returns how many keys had rows removed.
    pub fn apply_delete(&self, dest: &Destination, keys: &BTreeSet<String>) -> Result<usize> {
        let mut deleted = 0;
        for key in keys {
            if self.store.delete_one(dest, key)? {
                deleted += 1;
            }
        }
        if !keys.is_empty() {
            tracing::debug!(
                object = %dest.object,
                table = %dest.table.name,
                requested = keys.len(),
                deleted,
                "stale keys deleted"
            );
        }
        Ok(deleted)
    }
}

fn to_rows<'r>(records: impl Iterator<Item = &'r FieldRecord>) -> Result<Vec<MetaRow>> {
    records
        .map(|r| {
            Ok(MetaRow {
                meta_key: r.meta_key.clone(),
                meta_value: serialize_meta_value(&r.meta_value)?,
            })
        })
        .collect()
}

fn check_affected(
    dest: &Destination,
    operation: BatchOperation,
    submitted: usize,
    affected: usize,
) -> Result<()> {
    if affected >= submitted {
        return Ok(());
    }
    tracing::warn!(
        object = %dest.object,
        table = %dest.table.name,
        %operation,
        submitted,
        affected,
        "batch affected fewer rows than submitted; rolling back"
    );
    Err(RepeaterError::PartialBatchFailure {
        operation,
        submitted,
        affected,
    })
}

fn log_veto(dest: &Destination, meta_key: &str, operation: BatchOperation, reason: &Value) {
    tracing::debug!(
        object = %dest.object,
        meta_key,
        %operation,
        reason = %reason,
        "observer vetoed write"
    );
}
