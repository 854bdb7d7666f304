//! Tests for MemoryStore through the `MetaStore` interface.

use repeater_batch::error::{RepeaterError, Result};
use repeater_batch::object::ObjectRef;
use repeater_batch::storage::{Destination, MemoryStore, MetaStore, TableConfig};
use repeater_batch::types::MetaRow;

// ============================================================================
// Test helpers
// ============================================================================

fn dest(object: ObjectRef) -> Destination {
    TableConfig::default().resolve(&object).expect("resolve")
}

fn row(key: &str, value: &str) -> MetaRow {
    MetaRow {
        meta_key: key.to_string(),
        meta_value: value.to_string(),
    }
}

fn keys(ks: &[&str]) -> Vec<String> {
    ks.iter().map(|k| k.to_string()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn post_and_user_tables_are_separate() {
    let store = MemoryStore::new();
    store
        .insert_batch(&dest(ObjectRef::Post(7)), &[row("a", "post")])
        .unwrap();
    store
        .insert_batch(&dest(ObjectRef::User(7)), &[row("a", "user")])
        .unwrap();

    let post = store.select(&dest(ObjectRef::Post(7)), &keys(&["a"])).unwrap();
    let user = store.select(&dest(ObjectRef::User(7)), &keys(&["a"])).unwrap();
    assert_eq!(post[0].meta_value, "post");
    assert_eq!(user[0].meta_value, "user");
}

#[test]
fn update_touches_every_duplicate() {
    let store = MemoryStore::new();
    let d = dest(ObjectRef::Post(1));
    store.seed(&d, "a", "1");
    store.seed(&d, "a", "1");

    assert_eq!(store.update_batch(&d, &[row("a", "2")]).unwrap(), 2);
    assert!(store.rows(&d).iter().all(|r| r.meta_value == "2"));
}

#[test]
fn option_buckets_do_not_collide() {
    let store = MemoryStore::new();
    let theme = dest(ObjectRef::Option("theme".to_string()));
    let other = dest(ObjectRef::Option("other".to_string()));
    store.insert_batch(&theme, &[row("color", "blue")]).unwrap();
    store.insert_batch(&other, &[row("color", "red")]).unwrap();

    assert!(store.delete_one(&theme, "color").unwrap());
    assert_eq!(store.rows(&other).len(), 1);
    assert!(store.rows(&theme).is_empty());
}

#[test]
fn failed_transaction_keeps_earlier_state_and_counts_calls() {
    let store = MemoryStore::new();
    let d = dest(ObjectRef::Post(1));
    store.insert_batch(&d, &[row("a", "1")]).unwrap();
    store.reset_stats();

    let result: Result<()> = store.transaction(|s| {
        s.insert_batch(&d, &[row("b", "2"), row("c", "3")])?;
        s.delete_one(&d, "a")?;
        Err(RepeaterError::Internal("abort".to_string()))
    });
    assert!(result.is_err());

    let rows = store.rows(&d);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].meta_key, "a");

    let stats = store.stats();
    assert_eq!((stats.inserts, stats.deletes), (1, 1));

    // A new transaction can start once the failed one is done.
    store
        .transaction(|s| s.insert_batch(&d, &[row("d", "4")]))
        .unwrap();
    assert_eq!(store.rows(&d).len(), 2);
}
