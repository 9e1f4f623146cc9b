//! Snapshot lifecycle: fresh builds, incremental rebuilds, and preparing a
//! loaded index for querying.
//!
//! Every function here is synchronous and owns the state it mutates. Hosts
//! that query while a rebuild runs should keep serving the previous
//! `Arc<Snapshot>` and swap in the new one once the rebuild returns.

use crate::error::Result;
use crate::extract::extract_units;
use crate::index::InvertedIndex;
use crate::model::{FileId, FileRecord, UnitStore};
use crate::persist::{self, IndexMeta, LoadedIndex};
use crate::scan::{assign_ids, diff, scan, FilesById, IdByPath};
use crate::tokenizer::TokenizerConfig;
use std::collections::BTreeSet;
use std::path::Path;

/// Complete in-memory index state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub files_by_id: FilesById,
    pub id_by_path: IdByPath,
    pub unit_store: UnitStore,
    pub index: InvertedIndex,
    /// Derived from `index`; recomputed after every change, never patched.
    pub casefold_index: InvertedIndex,
    pub meta: IndexMeta,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub unchanged: usize,
    pub modified: usize,
    pub added: usize,
    pub deleted: usize,
    pub tokens: usize,
}

/// Phases of a rebuild, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildStage {
    Extracting,
    Indexing,
}

impl Snapshot {
    /// A snapshot with no files, ready to be fed to [`rebuild_incremental`].
    pub fn empty(meta: IndexMeta) -> Self {
        Self::from_parts(FilesById::new(), IdByPath::new(), UnitStore::new(), InvertedIndex::new(), meta)
    }

    pub fn from_parts(
        files_by_id: FilesById,
        id_by_path: IdByPath,
        unit_store: UnitStore,
        index: InvertedIndex,
        meta: IndexMeta,
    ) -> Self {
        let casefold_index = index.casefolded();
        Self { files_by_id, id_by_path, unit_store, index, casefold_index, meta }
    }

    /// Units are not persisted, so they are re-extracted for every indexed file.
    /// Files that vanished since saving simply get no units.
    pub fn from_loaded(loaded: LoadedIndex) -> Self {
        let case_sensitive = loaded.meta.tokenizer_config.case_sensitive;
        let unit_store: UnitStore = loaded
            .files_by_id
            .iter()
            .map(|(&id, record)| (id, extract_units(&record.path, record.filetype, case_sensitive)))
            .collect();
        Self::from_parts(loaded.files_by_id, loaded.id_by_path, unit_store, loaded.index, loaded.meta)
    }

    pub fn file_count(&self) -> usize {
        self.files_by_id.len()
    }

    pub fn units(&self, file_id: FileId) -> &[String] {
        self.unit_store.get(&file_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Token index to consult for a query of the given case mode.
    pub fn lookup_index(&self, case_sensitive: bool) -> &InvertedIndex {
        if case_sensitive {
            &self.index
        } else {
            &self.casefold_index
        }
    }

    pub fn save(&self, out_dir: &Path) -> Result<()> {
        persist::save(out_dir, &self.files_by_id, &self.id_by_path, &self.index, &self.meta)
    }

    pub fn load(in_dir: &Path) -> Result<Self> {
        Ok(Self::from_loaded(persist::load(in_dir)?))
    }
}

/// Scan `root` and index everything from scratch.
pub fn build_fresh(root: &Path, extensions: &[String], config: &TokenizerConfig) -> Result<(Snapshot, RebuildStats)> {
    let scanned = scan(root, extensions)?;
    let empty = Snapshot::empty(IndexMeta::new(root, extensions, config.clone()));
    Ok(rebuild_incremental(empty, scanned, config))
}

/// Rescan the root recorded in the snapshot and apply only what changed.
pub fn refresh(old: Snapshot) -> Result<(Snapshot, RebuildStats)> {
    let scanned = scan(&old.meta.indexed_root_dir, &old.meta.extensions)?;
    let config = old.meta.tokenizer_config.clone();
    Ok(rebuild_incremental(old, scanned, &config))
}

/// Bring `old` in line with a fresh scan.
///
/// Unchanged files keep their units and postings; added and modified files are
/// extracted and indexed again; deleted and modified files lose their old
/// postings. Work is proportional to the changed set. A different tokenizer
/// configuration invalidates every posting, so everything is re-indexed (ids
/// are still preserved).
pub fn rebuild_incremental(old: Snapshot, scanned: Vec<FileRecord>, config: &TokenizerConfig) -> (Snapshot, RebuildStats) {
    rebuild_incremental_with_progress(old, scanned, config, |_| {})
}

/// [`rebuild_incremental`] that reports each stage before entering it.
pub fn rebuild_incremental_with_progress(
    old: Snapshot,
    scanned: Vec<FileRecord>,
    config: &TokenizerConfig,
    mut on_stage: impl FnMut(RebuildStage),
) -> (Snapshot, RebuildStats) {
    let Snapshot { files_by_id: old_files, id_by_path: old_ids, mut unit_store, mut index, meta, .. } = old;

    let config_changed = meta.tokenizer_config != *config;
    let baseline = if config_changed {
        tracing::info!("tokenizer configuration changed; re-indexing every file");
        unit_store.clear();
        index = InvertedIndex::new();
        FilesById::new()
    } else {
        old_files
    };

    let (files_by_id, id_by_path) = assign_ids(&old_ids, scanned);
    let changes = diff(&baseline, &files_by_id);
    if changes.is_empty() {
        tracing::debug!(files = files_by_id.len(), "no file changes detected");
    }

    on_stage(RebuildStage::Extracting);
    unit_store.retain(|id, _| changes.unchanged.contains(id));
    for id in changes.to_extract() {
        let record = &files_by_id[&id];
        unit_store.insert(id, extract_units(&record.path, record.filetype, config.case_sensitive));
    }

    on_stage(RebuildStage::Indexing);
    let stale: BTreeSet<FileId> = changes.to_remove().collect();
    index.remove_files(&stale);
    for id in changes.to_extract() {
        index.add_file(id, &unit_store[&id], config);
    }

    let stats = RebuildStats {
        unchanged: changes.unchanged.len(),
        modified: changes.modified.len(),
        added: changes.added.len(),
        deleted: changes.deleted.len(),
        tokens: index.len(),
    };
    tracing::info!(
        unchanged = stats.unchanged,
        modified = stats.modified,
        added = stats.added,
        deleted = stats.deleted,
        tokens = stats.tokens,
        "index rebuilt"
    );

    let meta = IndexMeta { tokenizer_config: config.clone(), validation: None, ..meta.touched() };
    (Snapshot::from_parts(files_by_id, id_by_path, unit_store, index, meta), stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config() -> TokenizerConfig {
        TokenizerConfig::default()
    }

    fn exts() -> Vec<String> {
        vec![".txt".to_string(), ".csv".to_string()]
    }

    #[test]
    fn fresh_build_indexes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello world\nsecond line").unwrap();
        fs::write(dir.path().join("b.csv"), "name,age\nAlice,30\n").unwrap();

        let (snap, stats) = build_fresh(dir.path(), &exts(), &config()).unwrap();
        assert_eq!(stats.added, 2);
        assert_eq!(snap.file_count(), 2);
        assert!(snap.index.contains_token("hello"));
        assert!(snap.index.contains_token("alice"));
        let csv_id = snap.id_by_path[&dir.path().join("b.csv")];
        assert_eq!(snap.units(csv_id), &["name: Alice | age: 30".to_string()]);
    }

    #[test]
    fn config_change_reindexes_everything_with_stable_ids() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "Mixed Case").unwrap();
        let (snap, _) = build_fresh(dir.path(), &exts(), &config()).unwrap();
        let id = snap.id_by_path[&dir.path().join("a.txt")];

        let scanned = scan(dir.path(), &exts()).unwrap();
        let sensitive = TokenizerConfig { case_sensitive: true, ..config() };
        let (snap, stats) = rebuild_incremental(snap, scanned, &sensitive);
        assert_eq!(stats.added, 1);
        assert_eq!(snap.id_by_path[&dir.path().join("a.txt")], id);
        assert!(snap.index.contains_token("Mixed"));
        assert!(snap.casefold_index.contains_token("mixed"));
    }

    #[test]
    fn stages_are_reported_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one").unwrap();
        let empty = Snapshot::empty(IndexMeta::new(dir.path(), &exts(), config()));
        let scanned = scan(dir.path(), &exts()).unwrap();
        let mut seen = Vec::new();
        rebuild_incremental_with_progress(empty, scanned, &config(), |stage| seen.push(stage));
        assert_eq!(seen, vec![RebuildStage::Extracting, RebuildStage::Indexing]);
    }
}
