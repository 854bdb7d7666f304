//! ExistingStateReader: one batched lookup of what is already persisted.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::storage::{Destination, MetaStore};
use crate::types::PersistedRecord;

pub struct ExistingStateReader<'a, S: MetaStore> {
    store: &'a S,
}

impl<'a, S: MetaStore> ExistingStateReader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Current records for `keys`, keyed by record path.
    ///
    /// One store round trip regardless of how many keys are asked for, none
    /// when `keys` is empty. Keys with no row are simply absent. When a key
    /// has several rows the lowest id wins; the others are logged and never
    /// merged.
    pub fn fetch_existing(
        &self,
        dest: &Destination,
        keys: &[String],
    ) -> Result<HashMap<String, PersistedRecord>> {
        let mut seen = HashSet::with_capacity(keys.len());
        let unique: Vec<String> = keys
            .iter()
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self.store.select(dest, &unique)?;
        let mut existing: HashMap<String, PersistedRecord> = HashMap::with_capacity(rows.len());

        for row in rows {
            match existing.entry(row.meta_key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(row);
                }
                Entry::Occupied(mut slot) => {
                    let (kept, dropped) = if row.id < slot.get().id {
                        let previous = slot.insert(row);
                        (slot.get().id, previous.id)
                    } else {
                        (slot.get().id, row.id)
                    };
                    tracing::warn!(
                        object = %dest.object,
                        table = %dest.table.name,
                        meta_key = %slot.key(),
                        kept_id = kept,
                        duplicate_id = dropped,
                        "duplicate meta key; using the lowest id"
                    );
                }
            }
        }

        Ok(existing)
    }

    /// Previously persisted row counts for repeater paths. Paths never
    /// persisted are absent.
    pub fn previous_counts(
        &self,
        dest: &Destination,
        paths: &[String],
    ) -> Result<HashMap<String, usize>> {
        Ok(self
            .fetch_existing(dest, paths)?
            .into_iter()
            .map(|(path, record)| {
                let count = decode_count(&record);
                (path, count)
            })
            .collect())
    }
}

/// Largest repeater row count accepted from storage. A larger stored count
/// is treated as corrupt.
pub const MAX_ROW_COUNT: usize = 100_000;

/// Parse the text form of a row count. Blank text is zero; negative,
/// non-numeric and out-of-range text is `None`.
pub fn parse_count(text: &str) -> Option<usize> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0);
    }
    let count = match text.parse::<u64>() {
        Ok(n) => usize::try_from(n).ok()?,
        Err(_) => match text.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 0.0 && f <= MAX_ROW_COUNT as f64 => f as usize,
            _ => return None,
        },
    };
    (count <= MAX_ROW_COUNT).then_some(count)
}

/// Decode a stored repeater row count. A count that cannot be right counts
/// as zero, so nothing is walked or deleted on its behalf.
pub fn decode_count(record: &PersistedRecord) -> usize {
    match parse_count(&record.meta_value) {
        Some(count) => count,
        None => {
            tracing::warn!(
                meta_key = %record.meta_key,
                meta_id = record.id,
                value = %record.meta_value,
                max = MAX_ROW_COUNT,
                "stored row count is not a valid count; treating as 0"
            );
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;
    use crate::storage::{MemoryStore, TableConfig};

    fn post(id: u64) -> Destination {
        TableConfig::default().resolve(&ObjectRef::Post(id)).unwrap()
    }

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| k.to_string()).collect()
    }

    fn record(value: &str) -> PersistedRecord {
        PersistedRecord {
            id: 1,
            meta_key: "items".to_string(),
            meta_value: value.to_string(),
        }
    }

    #[test]
    fn fetch_is_one_round_trip() {
        let store = MemoryStore::new();
        let dest = post(1);
        store.seed(&dest, "a", "1");
        store.seed(&dest, "b", "2");

        let reader = ExistingStateReader::new(&store);
        let found = reader.fetch_existing(&dest, &keys(&["a", "b", "c"])).unwrap();

        assert_eq!(found.len(), 2);
        assert!(!found.contains_key("c"));
        assert_eq!(store.stats().selects, 1);
    }

    #[test]
    fn empty_key_set_issues_no_query() {
        let store = MemoryStore::new();
        let reader = ExistingStateReader::new(&store);
        assert!(reader.fetch_existing(&post(1), &[]).unwrap().is_empty());
        assert_eq!(store.stats().selects, 0);
    }

    #[test]
    fn duplicate_keys_keep_lowest_id() {
        let store = MemoryStore::new();
        let dest = post(1);
        let first = store.seed(&dest, "a", "first");
        store.seed(&dest, "a", "second");

        let reader = ExistingStateReader::new(&store);
        let found = reader.fetch_existing(&dest, &keys(&["a"])).unwrap();
        assert_eq!(found["a"].id, first);
        assert_eq!(found["a"].meta_value, "first");
    }

    #[test]
    fn decode_count_handles_text_forms() {
        assert_eq!(decode_count(&record("5")), 5);
        assert_eq!(decode_count(&record(" 3 ")), 3);
        assert_eq!(decode_count(&record("2.0")), 2);
        assert_eq!(decode_count(&record("")), 0);
        assert_eq!(decode_count(&record("abc")), 0);
        assert_eq!(decode_count(&record("-4")), 0);
    }

    #[test]
    fn oversized_counts_are_treated_as_corrupt() {
        assert_eq!(decode_count(&record("100000")), MAX_ROW_COUNT);
        assert_eq!(decode_count(&record("100001")), 0);
        assert_eq!(decode_count(&record("1e19")), 0);
        assert_eq!(decode_count(&record("18446744073709551615")), 0);
        assert_eq!(decode_count(&record("99999999999999999999999")), 0);
        assert_eq!(parse_count("1e3"), Some(1000));
    }
}
