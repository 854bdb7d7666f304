//! Storage backend trait for the meta store.
//!
//! `MetaStore` is the narrow raw I/O trait implemented by concrete backends
//! (in-memory, SQLite). Every method speaks in record paths; the backend maps
//! them to stored keys through the [`Destination`].

use crate::error::Result;
use crate::types::{MetaRow, PersistedRecord};

use super::table::Destination;

/// Low-level meta store: `(object, key) → value` rows with no field semantics.
///
/// Implementors must be `Send + Sync` so they can be shared across threads.
pub trait MetaStore: Send + Sync {
    /// Fetch every row matching any of `keys` for the destination's object,
    /// in a single round trip. Rows come back ordered by id ascending;
    /// duplicate keys are returned as-is.
    fn select(&self, dest: &Destination, keys: &[String]) -> Result<Vec<PersistedRecord>>;

    /// Insert all rows with one multi-row statement. Returns the number of
    /// rows inserted.
    fn insert_batch(&self, dest: &Destination, rows: &[MetaRow]) -> Result<usize>;

    /// Update the value of every row whose key is among `rows`, scoped to the
    /// destination's object, with one CASE-keyed statement. Returns the
    /// number of rows affected.
    fn update_batch(&self, dest: &Destination, rows: &[MetaRow]) -> Result<usize>;

    /// Delete all rows for exactly `(object, key)`. Returns whether any row
    /// was removed.
    fn delete_one(&self, dest: &Destination, key: &str) -> Result<bool>;

    /// Execute a closure inside a backend transaction.
    ///
    /// The closure receives a reference to `self`; implementations should
    /// begin a transaction before calling `f` and commit (or roll back on
    /// error) after it returns.
    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>;
}
