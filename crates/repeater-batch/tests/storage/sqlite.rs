//! Tests for SqliteStore against in-memory SQLite.

use repeater_batch::cache::MemoryCache;
use repeater_batch::error::{RepeaterError, Result};
use repeater_batch::object::ObjectRef;
use repeater_batch::schema::f;
use repeater_batch::storage::{Destination, MetaStore, SqliteStore, TableConfig};
use repeater_batch::types::MetaRow;
use repeater_batch::RepeaterUpdater;
use serde_json::json;

// ============================================================================
// Test helpers
// ============================================================================

/// Build an initialized in-memory `SqliteStore` with the default tables.
fn make_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("open in-memory DB");
    store.initialize(&TableConfig::default()).expect("initialize");
    store
}

fn dest(object: ObjectRef) -> Destination {
    TableConfig::default().resolve(&object).expect("resolve")
}

fn post(id: u64) -> Destination {
    dest(ObjectRef::Post(id))
}

fn row(key: &str, value: &str) -> MetaRow {
    MetaRow {
        meta_key: key.to_string(),
        meta_value: value.to_string(),
    }
}

fn rows(titles: &[&str]) -> serde_json::Value {
    serde_json::Value::Array(
        titles
            .iter()
            .map(|t| json!({ "field_title": t }))
            .collect(),
    )
}

fn keys(ks: &[&str]) -> Vec<String> {
    ks.iter().map(|k| k.to_string()).collect()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn initialize_creates_the_tables() {
    let store = SqliteStore::open_in_memory().unwrap();
    let err = store.select(&post(1), &keys(&["a"])).unwrap_err();
    assert!(matches!(err, RepeaterError::Storage(_)));
    store.initialize(&TableConfig::default()).unwrap();

    // Tables exist and start empty.
    assert!(store.select(&post(1), &keys(&["a"])).unwrap().is_empty());
    assert!(store
        .select(&dest(ObjectRef::User(1)), &keys(&["a"]))
        .unwrap()
        .is_empty());
}

#[test]
fn initialize_is_repeatable() {
    let store = make_store();
    store.initialize(&TableConfig::default()).unwrap();
}

#[test]
fn custom_prefix_creates_its_own_tables() {
    let config = TableConfig {
        prefix: "site2_".to_string(),
        ..TableConfig::default()
    };
    let store = SqliteStore::open_in_memory().unwrap();
    store.initialize(&config).unwrap();

    let d = config.resolve(&ObjectRef::Post(1)).unwrap();
    assert_eq!(d.table.name, "site2_postmeta");
    assert_eq!(store.insert_batch(&d, &[row("a", "1")]).unwrap(), 1);
}

// ============================================================================
// Batched statements
// ============================================================================

#[test]
fn insert_and_select_in_id_order() {
    let store = make_store();
    let inserted = store
        .insert_batch(&post(1), &[row("b", "2"), row("a", "1"), row("c", "")])
        .unwrap();
    assert_eq!(inserted, 3);

    let found = store.select(&post(1), &keys(&["a", "b", "c", "missing"])).unwrap();
    let pairs: Vec<(&str, &str)> = found
        .iter()
        .map(|r| (r.meta_key.as_str(), r.meta_value.as_str()))
        .collect();
    assert_eq!(pairs, vec![("b", "2"), ("a", "1"), ("c", "")]);
    assert!(found.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn duplicate_keys_are_returned_as_stored() {
    let store = make_store();
    store.insert_batch(&post(1), &[row("a", "first")]).unwrap();
    store.insert_batch(&post(1), &[row("a", "second")]).unwrap();

    let found = store.select(&post(1), &keys(&["a"])).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].meta_value, "first");
}

#[test]
fn update_batch_is_scoped_to_object() {
    let store = make_store();
    store
        .insert_batch(&post(1), &[row("a", "1"), row("b", "2")])
        .unwrap();
    store.insert_batch(&post(2), &[row("a", "1")]).unwrap();

    let affected = store
        .update_batch(&post(1), &[row("a", "10"), row("b", "20")])
        .unwrap();
    assert_eq!(affected, 2);

    let other = store.select(&post(2), &keys(&["a"])).unwrap();
    assert_eq!(other[0].meta_value, "1");
    let mine = store.select(&post(1), &keys(&["a", "b"])).unwrap();
    assert_eq!(mine[0].meta_value, "10");
    assert_eq!(mine[1].meta_value, "20");
}

#[test]
fn update_of_missing_key_affects_nothing() {
    let store = make_store();
    assert_eq!(store.update_batch(&post(1), &[row("nope", "x")]).unwrap(), 0);
    assert_eq!(store.update_batch(&post(1), &[]).unwrap(), 0);
}

#[test]
fn delete_one_is_scoped_to_object() {
    let store = make_store();
    store.insert_batch(&post(1), &[row("a", "1")]).unwrap();
    store.insert_batch(&post(2), &[row("a", "2")]).unwrap();

    assert!(store.delete_one(&post(1), "a").unwrap());
    assert!(!store.delete_one(&post(1), "a").unwrap());
    assert_eq!(store.select(&post(2), &keys(&["a"])).unwrap().len(), 1);
}

#[test]
fn option_rows_carry_the_bucket_prefix() {
    let store = make_store();
    let theme = dest(ObjectRef::Option("site_theme".to_string()));
    store
        .insert_batch(&theme, &[row("color", "blue"), row("_color", "field_color")])
        .unwrap();

    let found = store.select(&theme, &keys(&["color", "_color"])).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[1].meta_key, "_color");

    // Another bucket sees nothing under the same path.
    let other = dest(ObjectRef::Option("other".to_string()));
    assert!(store.select(&other, &keys(&["color"])).unwrap().is_empty());

    assert!(store.delete_one(&theme, "color").unwrap());
    assert_eq!(store.select(&theme, &keys(&["color", "_color"])).unwrap().len(), 1);
}

// ============================================================================
// Transactions
// ============================================================================

#[test]
fn transaction_commits_on_ok() {
    let store = make_store();
    store
        .transaction(|s| {
            s.insert_batch(&post(1), &[row("a", "1")])?;
            s.update_batch(&post(1), &[row("a", "2")])
        })
        .unwrap();
    assert_eq!(store.select(&post(1), &keys(&["a"])).unwrap()[0].meta_value, "2");
}

#[test]
fn transaction_rolls_back_on_err() {
    let store = make_store();
    store.insert_batch(&post(1), &[row("a", "1")]).unwrap();

    let result: Result<()> = store.transaction(|s| {
        s.insert_batch(&post(1), &[row("b", "2")])?;
        s.delete_one(&post(1), "a")?;
        Err(RepeaterError::Internal("boom".to_string()))
    });
    assert!(result.is_err());

    let found = store.select(&post(1), &keys(&["a", "b"])).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].meta_key, "a");

    // The connection is usable again afterwards.
    store
        .transaction(|s| s.insert_batch(&post(1), &[row("c", "3")]))
        .unwrap();
}

#[test]
fn nested_transactions_compose() {
    let store = make_store();
    store
        .transaction(|outer| {
            outer.insert_batch(&post(1), &[row("a", "1")])?;
            let inner: Result<()> = outer.transaction(|s| {
                s.insert_batch(&post(1), &[row("b", "2")])?;
                Err(RepeaterError::Internal("inner".to_string()))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();

    let found = store.select(&post(1), &keys(&["a", "b"])).unwrap();
    assert_eq!(found.len(), 1);
}

// ============================================================================
// Full pipeline
// ============================================================================

#[test]
fn pipeline_round_trip_and_shrink() {
    let updater = RepeaterUpdater::new(make_store(), MemoryCache::new());
    let schema = f::repeater("items", "field_items", vec![f::text("title", "field_title")]);

    let first = updater
        .update(&rows(&["a", "b", "c", "d", "e"]), "user_3", &schema)
        .unwrap();
    assert_eq!(first.inserted, 12);

    let second = updater.update(&rows(&["a", "b"]), "user_3", &schema).unwrap();
    assert_eq!(second.deleted, 6);
    assert_eq!(second.updated, 1);
    assert_eq!(second.unchanged, 5);

    let cold = MemoryCache::new();
    let loader = repeater_batch::load::Loader::new(updater.store(), &cold, updater.tables());
    assert_eq!(
        loader.load_tree("user_3", &schema).unwrap(),
        json!([{"field_title": "a"}, {"field_title": "b"}])
    );
    assert_eq!(loader.load_value("user_3", "items_4_title").unwrap(), None);
}
