//! Merger/deduplicator.
//!
//! Unions the freshly enriched batch with the existing store, collapses
//! duplicate plays on the `played_on` key, and rebuilds the dense
//! `entry_id` sequence over the final recency order. The store's column
//! layout is checked first: a mismatch aborts the merge fail-closed
//! rather than silently migrating long-term history.

use std::collections::HashSet;

use ritornello_core::{assign_entry_ids, Error, PlayRecord, StoredHistory};

/// Merge the new batch into the stored history.
///
/// Duplicates can arise from the fetcher's 1-second overlap tolerance
/// or from a record present in both old and new; the freshly processed
/// version wins (new records are concatenated before old, and the first
/// occurrence of each `played_on` is kept). The result is sorted by
/// `played_on` descending with `entry_id` reassigned 1..N.
pub fn merge_history(
    new_batch: Vec<PlayRecord>,
    stored: StoredHistory,
) -> Result<Vec<PlayRecord>, Error> {
    if stored.fields != PlayRecord::FIELDS {
        return Err(Error::SchemaMismatch {
            expected: PlayRecord::FIELDS.iter().map(ToString::to_string).collect(),
            found: stored.fields,
        });
    }

    let mut combined = new_batch;
    combined.extend(stored.records);

    let mut seen = HashSet::new();
    combined.retain(|record| seen.insert(record.played_on));

    // Stable sort: equal keys cannot occur after the dedup pass, but
    // stability keeps the pass order-insensitive regardless.
    combined.sort_by(|a, b| b.played_on.cmp(&a.played_on));
    assign_entry_ids(&mut combined);

    Ok(combined)
}
