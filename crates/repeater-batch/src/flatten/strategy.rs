//! Field strategies: how one kind of field turns into records.
//!
//! The flattener holds an ordered list of strategies and hands each field to
//! the first one that accepts it. The defaults are [`RepeaterStrategy`]
//! followed by [`LeafStrategy`].

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::schema::path::{revision_key, row_path, CLONE_INDEX};
use crate::schema::FieldSchema;
use crate::types::FieldRecord;

use super::{FlatTree, FlattenContext, RepeaterSpan};

/// Turns a resolved field and its raw value into records.
pub trait FieldStrategy: Send + Sync {
    /// Whether this strategy handles `field`.
    fn accepts(&self, field: &FieldSchema) -> bool;

    /// Flatten `value` for `field`, whose `name` is already the full path.
    /// Malformed input yields an empty tree rather than an error.
    fn collect(
        &self,
        ctx: &FlattenContext<'_>,
        value: &Value,
        field: &FieldSchema,
        depth: usize,
    ) -> FlatTree;
}

/// Default strategy order.
pub fn default_strategies() -> Vec<Arc<dyn FieldStrategy>> {
    vec![Arc::new(RepeaterStrategy), Arc::new(LeafStrategy)]
}

// ============================================================================
// Row extraction
// ============================================================================

/// Falsy raw input means "no rows".
pub(crate) fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(true) => false,
    }
}

/// Rows of a repeater value, with the template row removed. `None` when the
/// value is neither falsy nor a list/map of rows.
pub(crate) fn rows_of(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::Array(rows) => Some(rows.iter().collect()),
        Value::Object(rows) => Some(
            rows.iter()
                .filter(|(k, _)| k.as_str() != CLONE_INDEX)
                .map(|(_, v)| v)
                .collect(),
        ),
        v if is_falsy(v) => Some(Vec::new()),
        _ => None,
    }
}

// ============================================================================
// RepeaterStrategy
// ============================================================================

/// Flattens a repeater: every row's sub-fields, then the row count.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepeaterStrategy;

impl FieldStrategy for RepeaterStrategy {
    fn accepts(&self, field: &FieldSchema) -> bool {
        field.is_repeater()
    }

    fn collect(
        &self,
        ctx: &FlattenContext<'_>,
        value: &Value,
        field: &FieldSchema,
        depth: usize,
    ) -> FlatTree {
        let Some(rows) = rows_of(value) else {
            tracing::warn!(
                object = %ctx.object,
                path = %field.name,
                "repeater value is not a list of rows; skipping subtree"
            );
            return FlatTree::default();
        };

        let mut tree = FlatTree::default();
        let blank = Map::new();

        for (i, row) in rows.iter().enumerate() {
            // A row that is not an object still occupies its index; its cells
            // are written empty so nothing stored there survives.
            let cells = row.as_object().unwrap_or_else(|| {
                tracing::warn!(
                    object = %ctx.object,
                    path = %field.name,
                    row = i,
                    "repeater row is not an object; clearing its cells"
                );
                &blank
            });

            for sub_field in &field.sub_fields {
                let cell = cells.get(&sub_field.key).unwrap_or(&Value::Null);
                let resolved = sub_field.resolved(row_path(&field.name, i, &sub_field.name));
                tree.extend(ctx.collect(cell, &resolved, depth + 1));
            }
        }

        let row_count = rows.len();
        tree.records
            .push(FieldRecord::new(&field.name, json!(row_count), &field.key));
        tree.records.push(FieldRecord::new(
            revision_key(&field.name),
            Value::String(field.key.clone()),
            &field.key,
        ));
        tree.spans.push(RepeaterSpan {
            path: field.name.clone(),
            row_count,
            sub_fields: field.sub_fields.clone(),
        });
        tree
    }
}

// ============================================================================
// LeafStrategy
// ============================================================================

/// Flattens a scalar: the filtered value plus its revision record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeafStrategy;

impl FieldStrategy for LeafStrategy {
    fn accepts(&self, field: &FieldSchema) -> bool {
        !field.is_repeater()
    }

    fn collect(
        &self,
        ctx: &FlattenContext<'_>,
        value: &Value,
        field: &FieldSchema,
        _depth: usize,
    ) -> FlatTree {
        let filtered = ctx.hooks.apply(value.clone(), ctx.object, field);
        FlatTree {
            records: vec![
                FieldRecord::new(&field.name, filtered, &field.key),
                FieldRecord::new(
                    revision_key(&field.name),
                    Value::String(field.key.clone()),
                    &field.key,
                ),
            ],
            spans: Vec::new(),
        }
    }
}
