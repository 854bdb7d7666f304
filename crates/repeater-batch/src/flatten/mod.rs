//! Flattening: nested field tree to path-keyed records.
//!
//! [`flatten_tree`] is pure: it walks the value against the schema and
//! returns the records plus one [`RepeaterSpan`] per repeater it met.
//! [`Flattener`] adds the stale-tail lookup, which needs the store.

pub mod stale;
pub mod strategy;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{RepeaterError, Result};
use crate::hooks::FieldHooks;
use crate::object::ObjectRef;
use crate::reader::ExistingStateReader;
use crate::schema::FieldSchema;
use crate::storage::{Destination, MetaStore};
use crate::types::FieldRecord;

pub use strategy::{default_strategies, FieldStrategy, LeafStrategy, RepeaterStrategy};

/// Nesting beyond this depth contributes nothing.
const MAX_FLATTEN_DEPTH: usize = 64;

// ============================================================================
// Result Types
// ============================================================================

/// A repeater seen during flattening, with its current row count.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeaterSpan {
    pub path: String,
    pub row_count: usize,
    pub sub_fields: Vec<FieldSchema>,
}

/// Output of the pure flattening pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatTree {
    pub records: Vec<FieldRecord>,
    pub spans: Vec<RepeaterSpan>,
}

impl FlatTree {
    pub fn extend(&mut self, other: FlatTree) {
        self.records.extend(other.records);
        self.spans.extend(other.spans);
    }

    /// Record keys in emission order.
    pub fn keys(&self) -> Vec<String> {
        self.records.iter().map(|r| r.meta_key.clone()).collect()
    }
}

/// Records to write plus keys to delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flattened {
    pub records: Vec<FieldRecord>,
    pub stale_tail_keys: BTreeSet<String>,
}

// ============================================================================
// FlattenContext
// ============================================================================

/// Shared state for one flattening pass.
pub struct FlattenContext<'a> {
    pub object: &'a ObjectRef,
    pub hooks: &'a FieldHooks,
    strategies: &'a [Arc<dyn FieldStrategy>],
}

impl<'a> FlattenContext<'a> {
    pub fn new(
        object: &'a ObjectRef,
        hooks: &'a FieldHooks,
        strategies: &'a [Arc<dyn FieldStrategy>],
    ) -> Self {
        Self {
            object,
            hooks,
            strategies,
        }
    }

    /// Dispatch `field` to the first strategy that accepts it.
    pub fn collect(&self, value: &Value, field: &FieldSchema, depth: usize) -> FlatTree {
        if depth > MAX_FLATTEN_DEPTH {
            tracing::warn!(object = %self.object, path = %field.name, "field nesting too deep; skipping subtree");
            return FlatTree::default();
        }
        match self.strategies.iter().find(|s| s.accepts(field)) {
            Some(strategy) => strategy.collect(self, value, field, depth),
            None => {
                tracing::warn!(object = %self.object, path = %field.name, "no strategy accepts field; skipping");
                FlatTree::default()
            }
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Flatten `value` for the top-level `schema` using the given strategies.
///
/// A falsy value for a repeater is a valid empty list. Any other value that
/// is not a list of rows is rejected here, so malformed input can never be
/// mistaken for "all rows removed".
pub fn flatten_with(
    value: &Value,
    object: &ObjectRef,
    schema: &FieldSchema,
    hooks: &FieldHooks,
    strategies: &[Arc<dyn FieldStrategy>],
) -> Result<FlatTree> {
    if schema.is_repeater() && strategy::rows_of(value).is_none() {
        return Err(RepeaterError::InvalidValue {
            path: schema.name.clone(),
            reason: "expected a list of rows".to_string(),
        });
    }
    let ctx = FlattenContext::new(object, hooks, strategies);
    Ok(ctx.collect(value, schema, 0))
}

/// [`flatten_with`] using the default strategies.
pub fn flatten_tree(
    value: &Value,
    object: &ObjectRef,
    schema: &FieldSchema,
    hooks: &FieldHooks,
) -> Result<FlatTree> {
    flatten_with(value, object, schema, hooks, &default_strategies())
}

// ============================================================================
// Flattener
// ============================================================================

/// Flattening plus stale-tail detection against the store.
pub struct Flattener<'a, S: MetaStore> {
    reader: ExistingStateReader<'a, S>,
    hooks: &'a FieldHooks,
    strategies: &'a [Arc<dyn FieldStrategy>],
}

impl<'a, S: MetaStore> Flattener<'a, S> {
    pub fn new(
        store: &'a S,
        hooks: &'a FieldHooks,
        strategies: &'a [Arc<dyn FieldStrategy>],
    ) -> Self {
        Self {
            reader: ExistingStateReader::new(store),
            hooks,
            strategies,
        }
    }

    pub fn flatten(
        &self,
        value: &Value,
        dest: &Destination,
        schema: &FieldSchema,
    ) -> Result<Flattened> {
        let tree = flatten_with(value, &dest.object, schema, self.hooks, self.strategies)?;
        let stale_tail_keys = stale::stale_tail_keys(&self.reader, dest, &tree.spans, None)?;
        Ok(Flattened {
            records: tree.records,
            stale_tail_keys,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
