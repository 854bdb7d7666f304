use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque row identifier assigned by the store (`meta_id`, `umeta_id`, ...).
pub type MetaId = u64;

/// One flattened, path-keyed record the pipeline wants persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub meta_key: String,
    pub meta_value: Value,
    /// Schema key of the field that produced this record.
    pub source_field_key: String,
}

impl FieldRecord {
    pub fn new(meta_key: impl Into<String>, meta_value: Value, source_field_key: &str) -> Self {
        Self {
            meta_key: meta_key.into(),
            meta_value,
            source_field_key: source_field_key.to_string(),
        }
    }
}

/// One row as it sits in the store. `meta_key` is the record path (option
/// bucket prefixes already stripped); `meta_value` is the stored text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: MetaId,
    pub meta_key: String,
    pub meta_value: String,
}

/// A record routed to the update path, carrying the row it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub meta_id: MetaId,
    pub record: FieldRecord,
}

/// Serialized row handed to the store for insert or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRow {
    /// Record path; the store applies any bucket prefix.
    pub meta_key: String,
    pub meta_value: String,
}

/// Outcome of one `update` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub inserted: usize,
    pub updated: usize,
    /// Keys whose stored value already matched.
    pub unchanged: usize,
    pub deleted: usize,
    /// Records an observer opted out of writing.
    pub vetoed: usize,
}

impl UpdateReport {
    /// True when the call touched no rows.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}
