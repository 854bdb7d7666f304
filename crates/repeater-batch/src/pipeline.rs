//! RepeaterUpdater: the public entry point.
//!
//! One `update` call runs flatten → fetch existing → diff → batch write →
//! cache repopulate for a single object. Writes for the same object must be
//! serialized by the caller.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::cache::{CacheCoordinator, MetaCache};
use crate::diff::{diff, DiffResult};
use crate::error::Result;
use crate::flatten::stale::stale_tail_keys;
use crate::flatten::{default_strategies, flatten_with, FieldStrategy};
use crate::hooks::{FieldHooks, MetaObserver, NoopObserver};
use crate::load::Loader;
use crate::object::{ObjectId, ObjectRef};
use crate::reader::ExistingStateReader;
use crate::schema::FieldSchema;
use crate::storage::{Destination, MetaStore, TableConfig};
use crate::types::{FieldRecord, PersistedRecord, UpdateReport};
use crate::writer::BatchWriter;

// ============================================================================
// UpdatePlan
// ============================================================================

/// Everything `update` would do, computed without writing.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub destination: Destination,
    /// Desired records in emission order.
    pub records: Vec<FieldRecord>,
    pub existing: HashMap<String, PersistedRecord>,
    pub diff: DiffResult,
    pub stale_keys: BTreeSet<String>,
}

impl UpdatePlan {
    /// True when applying the plan would touch no rows.
    pub fn is_noop(&self) -> bool {
        self.diff.is_clean() && self.stale_keys.is_empty()
    }
}

// ============================================================================
// RepeaterUpdater
// ============================================================================

pub struct RepeaterUpdater<S: MetaStore, C: MetaCache> {
    store: S,
    cache: C,
    tables: TableConfig,
    hooks: FieldHooks,
    observer: Arc<dyn MetaObserver>,
    strategies: Vec<Arc<dyn FieldStrategy>>,
}

impl<S: MetaStore, C: MetaCache> RepeaterUpdater<S, C> {
    /// Updater with default tables, no hooks and no observer.
    pub fn new(store: S, cache: C) -> Self {
        Self::builder(store, cache).build()
    }

    pub fn builder(store: S, cache: C) -> RepeaterUpdaterBuilder<S, C> {
        RepeaterUpdaterBuilder {
            store,
            cache,
            tables: TableConfig::default(),
            hooks: FieldHooks::default(),
            observer: None,
            strategies: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn tables(&self) -> &TableConfig {
        &self.tables
    }

    /// Read side over the same store, cache and tables.
    pub fn loader(&self) -> Loader<'_, S, C> {
        Loader::new(&self.store, &self.cache, &self.tables)
    }

    /// Compute what `update` would write. Reads the store, never writes it.
    pub fn plan(
        &self,
        value: &Value,
        object_id: impl Into<ObjectId>,
        schema: &FieldSchema,
    ) -> Result<UpdatePlan> {
        let object = ObjectRef::parse(&object_id.into())?;
        let destination = self.tables.resolve(&object)?;

        let tree = flatten_with(value, &object, schema, &self.hooks, &self.strategies)?;

        let reader = ExistingStateReader::new(&self.store);
        let existing = reader.fetch_existing(&destination, &tree.keys())?;
        let stale_keys = stale_tail_keys(&reader, &destination, &tree.spans, Some(&existing))?;
        let diff = diff(&tree.records, &existing);

        Ok(UpdatePlan {
            destination,
            records: tree.records,
            existing,
            diff,
            stale_keys,
        })
    }

    /// Reconcile `value` for `schema` against what the store holds for
    /// `object_id`.
    ///
    /// All writes run in one store transaction. On error nothing is kept and
    /// the object's cache entry stays invalidated.
    pub fn update(
        &self,
        value: &Value,
        object_id: impl Into<ObjectId>,
        schema: &FieldSchema,
    ) -> Result<UpdateReport> {
        let plan = self.plan(value, object_id, schema)?;
        let dest = &plan.destination;
        let cache = CacheCoordinator::new(&self.cache);

        cache.invalidate(&dest.object);

        let mut report = UpdateReport {
            unchanged: plan.diff.noop.len(),
            ..UpdateReport::default()
        };
        let mut vetoed: HashSet<String> = HashSet::new();

        if !plan.is_noop() {
            let (inserted, updated, deleted) = self.store.transaction(|store| {
                let writer = BatchWriter::new(store, self.observer.as_ref());
                let inserted = writer.apply_insert(dest, &plan.diff.to_insert)?;
                let updated = writer.apply_update(dest, &plan.diff.to_update, &plan.existing)?;
                let deleted = writer.apply_delete(dest, &plan.stale_keys)?;
                Ok((inserted, updated, deleted))
            })?;

            report.inserted = inserted.inserted + updated.redirected_inserts;
            report.updated = updated.updated;
            report.deleted = deleted;
            vetoed.extend(inserted.vetoed);
            vetoed.extend(updated.vetoed);
            report.vetoed = vetoed.len();

            cache.forget(&dest.object, &plan.stale_keys);
        }

        cache.repopulate(
            &dest.object,
            plan.records
                .iter()
                .filter(|r| !vetoed.contains(&r.meta_key)),
        );

        tracing::debug!(
            object = %dest.object,
            table = %dest.table.name,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            deleted = report.deleted,
            vetoed = report.vetoed,
            "repeater update"
        );
        Ok(report)
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct RepeaterUpdaterBuilder<S: MetaStore, C: MetaCache> {
    store: S,
    cache: C,
    tables: TableConfig,
    hooks: FieldHooks,
    observer: Option<Arc<dyn MetaObserver>>,
    strategies: Vec<Arc<dyn FieldStrategy>>,
}

impl<S: MetaStore, C: MetaCache> RepeaterUpdaterBuilder<S, C> {
    pub fn tables(mut self, tables: TableConfig) -> Self {
        self.tables = tables;
        self
    }

    pub fn hooks(mut self, hooks: FieldHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn MetaObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Append a flattening strategy. Once any strategy is given the defaults
    /// are not added, so the list should end with a catch-all.
    pub fn strategy(mut self, strategy: Arc<dyn FieldStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn build(self) -> RepeaterUpdater<S, C> {
        let strategies = if self.strategies.is_empty() {
            default_strategies()
        } else {
            self.strategies
        };
        RepeaterUpdater {
            store: self.store,
            cache: self.cache,
            tables: self.tables,
            hooks: self.hooks,
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
            strategies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::RepeaterError;
    use crate::schema::f;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn updater() -> RepeaterUpdater<MemoryStore, MemoryCache> {
        RepeaterUpdater::new(MemoryStore::new(), MemoryCache::new())
    }

    fn items() -> FieldSchema {
        f::repeater("items", "field_items", vec![f::text("title", "field_title")])
    }

    #[test]
    fn first_save_inserts_in_one_statement() {
        let updater = updater();
        let report = updater
            .update(&json!([{"field_title": "A"}, {"field_title": "B"}]), 9u64, &items())
            .unwrap();

        assert_eq!(report.inserted, 6);
        assert_eq!(report.updated, 0);
        let stats = updater.store().stats();
        assert_eq!(stats.selects, 1);
        assert_eq!(stats.inserts, 1);
        assert_eq!(stats.updates, 0);
    }

    #[test]
    fn plan_does_not_write() {
        let updater = updater();
        let plan = updater.plan(&json!([{"field_title": "A"}]), 9u64, &items()).unwrap();
        assert_eq!(plan.diff.to_insert.len(), 4);
        assert!(!plan.is_noop());
        assert_eq!(updater.store().stats().inserts, 0);
    }

    #[test]
    fn invalid_id_fails_before_io() {
        let updater = updater();
        let err = updater.update(&json!([]), "user_x", &items()).unwrap_err();
        assert!(matches!(err, RepeaterError::InvalidObjectId(_)));
        assert_eq!(updater.store().stats(), Default::default());
    }

    #[test]
    fn builder_strategies_replace_defaults() {
        use crate::flatten::{FlatTree, FlattenContext, LeafStrategy, RepeaterStrategy};

        /// Stores number fields only; drops their revision record.
        struct BareNumbers;
        impl FieldStrategy for BareNumbers {
            fn accepts(&self, field: &FieldSchema) -> bool {
                field.field_type.label() == "number"
            }
            fn collect(
                &self,
                _ctx: &FlattenContext<'_>,
                value: &Value,
                field: &FieldSchema,
                _depth: usize,
            ) -> FlatTree {
                FlatTree {
                    records: vec![FieldRecord::new(&field.name, value.clone(), &field.key)],
                    spans: Vec::new(),
                }
            }
        }

        let updater = RepeaterUpdater::builder(MemoryStore::new(), MemoryCache::new())
            .strategy(Arc::new(BareNumbers))
            .strategy(Arc::new(RepeaterStrategy))
            .strategy(Arc::new(LeafStrategy))
            .build();
        let schema = f::repeater("rows", "field_rows", vec![f::number("qty", "field_qty")]);
        let plan = updater.plan(&json!([{"field_qty": 3}]), 2u64, &schema).unwrap();

        let keys: Vec<&str> = plan.records.iter().map(|r| r.meta_key.as_str()).collect();
        assert_eq!(keys, vec!["rows_0_qty", "rows", "_rows"]);
    }

    #[test]
    fn missing_table_is_unknown_destination() {
        let updater = RepeaterUpdater::builder(MemoryStore::new(), MemoryCache::new())
            .tables(TableConfig {
                option: None,
                ..TableConfig::default()
            })
            .build();
        let err = updater.update(&json!([]), "site_theme", &items()).unwrap_err();
        assert!(matches!(err, RepeaterError::UnknownDestination(_)));
    }
}
