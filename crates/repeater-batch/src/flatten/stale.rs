//! Stale-tail detection.
//!
//! When a repeater persisted with `M` rows is saved with `N < M` rows, every
//! key under rows `[N, M)` must go. Sub-fields that are themselves repeaters
//! take their own rows with them, so the walk continues into them one nesting
//! level per batched lookup.

use std::collections::{BTreeSet, HashMap};

use crate::error::Result;
use crate::reader::{decode_count, ExistingStateReader};
use crate::schema::path::{key_pair, row_path};
use crate::schema::FieldSchema;
use crate::storage::{Destination, MetaStore};
use crate::types::PersistedRecord;

use super::RepeaterSpan;

struct Pending<'s> {
    path: String,
    row_count: usize,
    sub_fields: &'s [FieldSchema],
}

/// Every key that belongs to a row beyond a repeater's current row count.
///
/// `known` may carry records already fetched for this object; previous counts
/// found there are not read again. Counts for the first level that are not
/// known, and for every nested level, are read in one batched lookup per
/// level.
pub fn stale_tail_keys<S: MetaStore>(
    reader: &ExistingStateReader<'_, S>,
    dest: &Destination,
    spans: &[RepeaterSpan],
    known: Option<&HashMap<String, PersistedRecord>>,
) -> Result<BTreeSet<String>> {
    let mut stale = BTreeSet::new();
    let mut pending: Vec<Pending<'_>> = spans
        .iter()
        .map(|s| Pending {
            path: s.path.clone(),
            row_count: s.row_count,
            sub_fields: &s.sub_fields,
        })
        .collect();
    let mut known = known;

    while !pending.is_empty() {
        let previous = previous_counts(reader, dest, &pending, known)?;
        known = None;

        let mut next = Vec::new();
        for span in &pending {
            let prev = previous.get(&span.path).copied().unwrap_or(0);
            for j in span.row_count..prev {
                for sub_field in span.sub_fields {
                    let path = row_path(&span.path, j, &sub_field.name);
                    stale.extend(key_pair(&path));
                    if sub_field.is_repeater() {
                        next.push(Pending {
                            path,
                            row_count: 0,
                            sub_fields: &sub_field.sub_fields,
                        });
                    }
                }
            }
        }
        pending = next;
    }

    Ok(stale)
}

fn previous_counts<S: MetaStore>(
    reader: &ExistingStateReader<'_, S>,
    dest: &Destination,
    pending: &[Pending<'_>],
    known: Option<&HashMap<String, PersistedRecord>>,
) -> Result<HashMap<String, usize>> {
    let mut counts = HashMap::new();
    let mut missing = Vec::new();

    for span in pending {
        match known.and_then(|k| k.get(&span.path)) {
            Some(record) => {
                counts.insert(span.path.clone(), decode_count(record));
            }
            None if known.is_some() => {
                // Known map covers every key of the current tree; absent
                // means never persisted.
            }
            None => missing.push(span.path.clone()),
        }
    }

    if !missing.is_empty() {
        counts.extend(reader.previous_counts(dest, &missing)?);
    }
    Ok(counts)
}
