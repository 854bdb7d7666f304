//! Loader: read side of the pipeline.
//!
//! Values are looked up in the per-record cache first and fall back to the
//! store. Whole repeaters are rebuilt from their stored row counts.

use serde_json::{Map, Value};

use crate::cache::{field_cache_key, MetaCache, FIELD_SCOPE};
use crate::error::Result;
use crate::object::{ObjectId, ObjectRef};
use crate::reader::{parse_count, ExistingStateReader};
use crate::schema::path::row_path;
use crate::schema::FieldSchema;
use crate::storage::{Destination, MetaStore, TableConfig};
use crate::value::deserialize_meta_value;

pub struct Loader<'a, S: MetaStore, C: MetaCache> {
    store: &'a S,
    cache: &'a C,
    tables: &'a TableConfig,
}

impl<'a, S: MetaStore, C: MetaCache> Loader<'a, S, C> {
    pub fn new(store: &'a S, cache: &'a C, tables: &'a TableConfig) -> Self {
        Self {
            store,
            cache,
            tables,
        }
    }

    /// Value stored at `path`, or `None` if nothing is stored there.
    pub fn load_value(&self, object_id: impl Into<ObjectId>, path: &str) -> Result<Option<Value>> {
        let dest = self.destination(object_id)?;
        self.value_at(&dest, path)
    }

    /// Rebuild the value of a top-level field.
    ///
    /// A repeater loads as an array of rows keyed by sub-field key; rows
    /// past the stored count are ignored. A missing scalar loads as null.
    pub fn load_tree(&self, object_id: impl Into<ObjectId>, schema: &FieldSchema) -> Result<Value> {
        let dest = self.destination(object_id)?;
        self.tree_at(&dest, schema, &schema.name)
    }

    fn destination(&self, object_id: impl Into<ObjectId>) -> Result<Destination> {
        let object = ObjectRef::parse(&object_id.into())?;
        self.tables.resolve(&object)
    }

    fn tree_at(&self, dest: &Destination, field: &FieldSchema, path: &str) -> Result<Value> {
        if !field.is_repeater() {
            return Ok(self.value_at(dest, path)?.unwrap_or(Value::Null));
        }

        let count = self
            .value_at(dest, path)?
            .map_or(0, |v| row_count(&dest.object, path, &v));
        let mut rows = Vec::new();
        for i in 0..count {
            let mut row = Map::new();
            for sub_field in &field.sub_fields {
                let sub_path = row_path(path, i, &sub_field.name);
                row.insert(sub_field.key.clone(), self.tree_at(dest, sub_field, &sub_path)?);
            }
            rows.push(Value::Object(row));
        }
        Ok(Value::Array(rows))
    }

    fn value_at(&self, dest: &Destination, path: &str) -> Result<Option<Value>> {
        let cache_key = field_cache_key(&dest.object, path);
        if let Some(hit) = self.cache.get(FIELD_SCOPE, &cache_key) {
            return Ok(Some(hit));
        }

        let reader = ExistingStateReader::new(self.store);
        let mut found = reader.fetch_existing(dest, &[path.to_string()])?;
        let Some(record) = found.remove(path) else {
            return Ok(None);
        };
        let value = deserialize_meta_value(&record.meta_value);
        self.cache.set(FIELD_SCOPE, &cache_key, value.clone());
        Ok(Some(value))
    }
}

/// Row count of a loaded repeater value. Counts that cannot be right load
/// as an empty repeater.
fn row_count(object: &ObjectRef, path: &str, value: &Value) -> usize {
    let parsed = match value {
        Value::Number(n) => parse_count(&n.to_string()),
        Value::String(s) => parse_count(s),
        Value::Null | Value::Bool(false) => Some(0),
        _ => None,
    };
    parsed.unwrap_or_else(|| {
        tracing::warn!(
            object = %object,
            path = %path,
            value = %value,
            "stored row count is not a valid count; loading no rows"
        );
        0
    })
}
