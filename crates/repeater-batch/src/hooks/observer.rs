//! MetaObserver trait: user-defined hooks around individual meta writes.

use serde_json::Value;

use crate::object::ObjectRef;
use crate::types::MetaId;

/// Hooks invoked by the [`BatchWriter`](crate::writer::BatchWriter) for each
/// record of a batch.
///
/// All methods have default no-op implementations. An observer with zero
/// overrides is a valid passthrough.
pub trait MetaObserver: Send + Sync {
    /// Decide whether a record headed for the insert batch may be written.
    /// Returning `Some(_)` vetoes that single record: it is dropped from the
    /// batch silently and the rest of the batch proceeds.
    ///
    /// Default: `None` (allow).
    fn short_circuit_add(&self, _object: &ObjectRef, _meta_key: &str, _value: &Value) -> Option<Value> {
        None
    }

    /// Same as [`short_circuit_add`](Self::short_circuit_add) for records
    /// headed for the update batch.
    fn short_circuit_update(
        &self,
        _object: &ObjectRef,
        _meta_key: &str,
        _value: &Value,
    ) -> Option<Value> {
        None
    }

    /// Called for each surviving record just before the insert batch runs.
    fn before_add(&self, _object: &ObjectRef, _meta_key: &str, _value: &Value) {}

    /// Called for each record after the insert batch committed its rows.
    fn after_added(&self, _object: &ObjectRef, _meta_key: &str, _value: &Value) {}

    /// Called for each surviving record just before the update batch runs.
    fn before_update(&self, _meta_id: MetaId, _object: &ObjectRef, _meta_key: &str, _value: &Value) {}

    /// Called for each record after the update batch committed.
    fn after_updated(&self, _meta_id: MetaId, _object: &ObjectRef, _meta_key: &str, _value: &Value) {}
}

/// Observer with no overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MetaObserver for NoopObserver {}
