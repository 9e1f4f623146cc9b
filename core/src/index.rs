use crate::model::{FileId, UnitIndex, UnitStore};
use crate::scan::FilesById;
use crate::tokenizer::{tokenize, TokenizerConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Occurrences of one token in one file.
///
/// Freshly indexed hits cover a single unit with the local count. After
/// [`crate::normalize`] a hit aggregates every unit of the file and the total count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub file_id: FileId,
    pub units: Vec<UnitIndex>,
    pub count: u32,
}

impl Hit {
    pub fn new(file_id: FileId, unit: UnitIndex, count: u32) -> Self {
        Self { file_id, units: vec![unit], count }
    }
}

/// Token → postings. A token is never mapped to an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvertedIndex {
    postings: BTreeMap<String, Vec<Hit>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every unit of every file in `files`. Files without units contribute nothing.
    pub fn build_full(files: &FilesById, unit_store: &UnitStore, config: &TokenizerConfig) -> Self {
        let mut index = Self::new();
        for &file_id in files.keys() {
            if let Some(units) = unit_store.get(&file_id) {
                index.add_file(file_id, units, config);
            }
        }
        tracing::debug!(files = files.len(), tokens = index.len(), "built index");
        index
    }

    /// Append one hit per (token, unit). Existing hits for `file_id` are not
    /// touched, so callers replacing a file must `remove_file` first.
    pub fn add_file(&mut self, file_id: FileId, units: &[String], config: &TokenizerConfig) {
        for (unit_index, unit) in units.iter().enumerate() {
            let mut counts: BTreeMap<String, u32> = BTreeMap::new();
            for token in tokenize(unit, config) {
                *counts.entry(token).or_insert(0) += 1;
            }
            for (token, count) in counts {
                self.postings
                    .entry(token)
                    .or_default()
                    .push(Hit::new(file_id, unit_index as UnitIndex, count));
            }
        }
    }

    pub fn remove_file(&mut self, file_id: FileId) {
        self.remove_files(&BTreeSet::from([file_id]));
    }

    /// Strip every hit belonging to `file_ids` in a single pass.
    pub fn remove_files(&mut self, file_ids: &BTreeSet<FileId>) {
        if file_ids.is_empty() {
            return;
        }
        self.postings.retain(|_, hits| {
            hits.retain(|h| !file_ids.contains(&h.file_id));
            !hits.is_empty()
        });
    }

    /// Derived view keyed by lowercased token; postings of every case variant
    /// are concatenated, not merged. Keys use the tokenizer's `to_lowercase`
    /// folding, so `Straße` lands under `straße`, not `strasse`.
    pub fn casefolded(&self) -> Self {
        let mut folded = Self::new();
        for (token, hits) in &self.postings {
            folded
                .postings
                .entry(token.to_lowercase())
                .or_default()
                .extend(hits.iter().cloned());
        }
        folded
    }

    pub fn get(&self, token: &str) -> Option<&[Hit]> {
        self.postings.get(token).map(Vec::as_slice)
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.postings.contains_key(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Hit])> {
        self.postings.iter().map(|(t, h)| (t.as_str(), h.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Replace the postings of `token`; an empty list removes the token.
    pub fn set_postings(&mut self, token: String, hits: Vec<Hit>) {
        if hits.is_empty() {
            self.postings.remove(&token);
        } else {
            self.postings.insert(token, hits);
        }
    }

    pub(crate) fn map_postings(&self, mut f: impl FnMut(&[Hit]) -> Vec<Hit>) -> Self {
        let mut out = Self::new();
        for (token, hits) in &self.postings {
            out.set_postings(token.clone(), f(hits));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileRecord, FileType};
    use std::path::PathBuf;

    fn files(ids: &[FileId]) -> FilesById {
        ids.iter()
            .map(|&id| {
                let record = FileRecord { path: PathBuf::from(format!("f{id}.txt")), size: 0, mtime: 0.0, filetype: FileType::Txt };
                (id, record)
            })
            .collect()
    }

    fn units(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn hits_are_per_unit_with_local_counts() {
        let config = TokenizerConfig::default();
        let mut store = UnitStore::new();
        store.insert(0, units(&["rust rust go", "go"]));
        let index = InvertedIndex::build_full(&files(&[0]), &store, &config);
        assert_eq!(index.get("rust").unwrap(), &[Hit::new(0, 0, 2)]);
        assert_eq!(index.get("go").unwrap(), &[Hit::new(0, 0, 1), Hit::new(0, 1, 1)]);
    }

    #[test]
    fn remove_drops_empty_tokens() {
        let config = TokenizerConfig::default();
        let mut index = InvertedIndex::new();
        index.add_file(1, &units(&["alpha shared"]), &config);
        index.add_file(2, &units(&["beta shared"]), &config);
        index.remove_file(1);
        assert!(!index.contains_token("alpha"));
        assert_eq!(index.get("shared").unwrap(), &[Hit::new(2, 0, 1)]);
    }

    #[test]
    fn remove_then_add_matches_fresh_build() {
        let config = TokenizerConfig::default();
        let mut store = UnitStore::new();
        store.insert(0, units(&["old words here"]));
        store.insert(1, units(&["other file"]));
        let mut index = InvertedIndex::build_full(&files(&[0, 1]), &store, &config);

        let fresh_units = units(&["new words", "more words"]);
        index.remove_file(0);
        index.add_file(0, &fresh_units, &config);

        store.insert(0, fresh_units);
        let rebuilt = InvertedIndex::build_full(&files(&[0, 1]), &store, &config);
        assert_eq!(crate::normalize::normalize_index(&index), crate::normalize::normalize_index(&rebuilt));
    }

    #[test]
    fn casefold_concatenates_variants() {
        let config = TokenizerConfig { case_sensitive: true, ..Default::default() };
        let mut index = InvertedIndex::new();
        index.add_file(0, &units(&["Rust"]), &config);
        index.add_file(1, &units(&["rust RUST"]), &config);
        let folded = index.casefolded();
        assert_eq!(folded.len(), 1);
        assert_eq!(folded.get("rust").unwrap().len(), 3);
    }

    #[test]
    fn casefold_keeps_sharp_s() {
        let config = TokenizerConfig { case_sensitive: true, ..Default::default() };
        let mut index = InvertedIndex::new();
        index.add_file(0, &units(&["Straße STRASSE"]), &config);
        let folded = index.casefolded();
        assert!(folded.contains_token("straße"));
        assert_eq!(folded.get("strasse").unwrap(), &[Hit::new(0, 0, 1)]);
    }
}
