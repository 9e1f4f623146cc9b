use crate::error::{Error, Result};
use crate::index::{Hit, InvertedIndex};
use std::collections::{BTreeMap, BTreeSet};

/// Merge hits of a single file: counts add up, unit indexes are deduplicated and sorted.
pub fn merge_hits_for_same_file(hits: &[Hit]) -> Result<Hit> {
    let first = hits.first().ok_or(Error::EmptyMergeInput)?;
    let units: BTreeSet<_> = hits.iter().flat_map(|h| h.units.iter().copied()).collect();
    Ok(Hit {
        file_id: first.file_id,
        units: units.into_iter().collect(),
        count: hits.iter().map(|h| h.count).sum(),
    })
}

/// One hit per file, ordered by descending count then ascending file id.
pub fn normalize_postings(postings: &[Hit]) -> Vec<Hit> {
    let mut groups: BTreeMap<_, Vec<Hit>> = BTreeMap::new();
    for hit in postings {
        groups.entry(hit.file_id).or_default().push(hit.clone());
    }
    let mut merged: Vec<Hit> = groups
        .values()
        .filter_map(|group| merge_hits_for_same_file(group).ok())
        .collect();
    merged.sort_by(|a, b| b.count.cmp(&a.count).then(a.file_id.cmp(&b.file_id)));
    merged
}

/// Normalize every token's postings. Idempotent.
pub fn normalize_index(index: &InvertedIndex) -> InvertedIndex {
    index.map_postings(normalize_postings)
}
