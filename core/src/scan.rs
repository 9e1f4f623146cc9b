use crate::error::{Error, Result};
use crate::model::{FileId, FileRecord, FileType};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Mtime differences up to this many seconds count as unchanged.
pub const MTIME_TOLERANCE_SECS: f64 = 2.0;

pub type FilesById = BTreeMap<FileId, FileRecord>;
pub type IdByPath = BTreeMap<PathBuf, FileId>;

/// Four-way classification of file ids between two scans.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub unchanged: BTreeSet<FileId>,
    pub modified: BTreeSet<FileId>,
    pub deleted: BTreeSet<FileId>,
    pub added: BTreeSet<FileId>,
}

impl FileDiff {
    /// Ids whose units must be (re)extracted.
    pub fn to_extract(&self) -> impl Iterator<Item = FileId> + '_ {
        self.added.iter().chain(self.modified.iter()).copied()
    }

    /// Ids whose existing postings are stale.
    pub fn to_remove(&self) -> impl Iterator<Item = FileId> + '_ {
        self.modified.iter().chain(self.deleted.iter()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty() && self.added.is_empty()
    }
}

/// List the files directly inside `root` whose extension is allowed.
/// Extensions compare case-insensitively, with or without a leading dot.
pub fn scan(root: &Path, extensions: &[String]) -> Result<Vec<FileRecord>> {
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }
    let allowed: HashSet<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let read_err = |source| Error::FileRead { path: root.to_path_buf(), source };
    let mut entries: Vec<PathBuf> = fs::read_dir(root)
        .map_err(read_err)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    let mut records = Vec::new();
    for path in entries {
        let Some(ext) = path.extension().and_then(|e| e.to_str()).map(str::to_lowercase) else {
            continue;
        };
        if !allowed.contains(&ext) {
            continue;
        }
        let Some(filetype) = FileType::from_extension(&ext) else {
            continue;
        };
        let meta = match fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(source) => return Err(Error::FileRead { path, source }),
        };
        records.push(FileRecord {
            size: meta.len(),
            mtime: mtime_secs(&meta),
            filetype,
            path,
        });
    }
    tracing::debug!(root = %root.display(), files = records.len(), "scanned");
    Ok(records)
}

pub(crate) fn mtime_secs(meta: &fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Keep ids for known paths; new paths get `max(previous) + 1, + 2, ...` in scan order.
pub fn assign_ids(previous: &IdByPath, scanned: Vec<FileRecord>) -> (FilesById, IdByPath) {
    let mut next_id = previous.values().max().map_or(0, |max| max + 1);
    let mut files_by_id = FilesById::new();
    let mut id_by_path = IdByPath::new();
    for record in scanned {
        let id = match previous.get(&record.path) {
            Some(&id) => id,
            None => {
                let id = next_id;
                next_id += 1;
                id
            }
        };
        id_by_path.insert(record.path.clone(), id);
        files_by_id.insert(id, record);
    }
    (files_by_id, id_by_path)
}

pub fn diff(old: &FilesById, new: &FilesById) -> FileDiff {
    let mut out = FileDiff::default();
    for (&id, record) in new {
        match old.get(&id) {
            Some(prev) if is_same_content(prev, record) => {
                out.unchanged.insert(id);
            }
            Some(_) => {
                out.modified.insert(id);
            }
            None => {
                out.added.insert(id);
            }
        }
    }
    out.deleted = old.keys().filter(|id| !new.contains_key(id)).copied().collect();
    out
}

fn is_same_content(a: &FileRecord, b: &FileRecord) -> bool {
    a.size == b.size && (a.mtime - b.mtime).abs() <= MTIME_TOLERANCE_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(path: &str, size: u64, mtime: f64) -> FileRecord {
        FileRecord { path: PathBuf::from(path), size, mtime, filetype: FileType::Txt }
    }

    #[test]
    fn ids_are_stable_and_new_paths_extend_max() {
        let mut previous = IdByPath::new();
        previous.insert(PathBuf::from("/d/a.txt"), 4);
        previous.insert(PathBuf::from("/d/b.txt"), 9);
        let (files, ids) = assign_ids(&previous, vec![rec("/d/c.txt", 1, 0.0), rec("/d/a.txt", 1, 0.0), rec("/d/e.txt", 1, 0.0)]);
        assert_eq!(ids[&PathBuf::from("/d/a.txt")], 4);
        assert_eq!(ids[&PathBuf::from("/d/c.txt")], 10);
        assert_eq!(ids[&PathBuf::from("/d/e.txt")], 11);
        assert_eq!(files.len(), 3);
        assert!(!ids.contains_key(&PathBuf::from("/d/b.txt")));
    }

    #[test]
    fn diff_partitions_ids() {
        let old: FilesById = [(0, rec("a", 10, 100.0)), (1, rec("b", 10, 100.0)), (2, rec("c", 10, 100.0))].into();
        let new: FilesById = [(0, rec("a", 10, 101.5)), (1, rec("b", 11, 100.0)), (3, rec("d", 1, 1.0))].into();
        let d = diff(&old, &new);
        assert_eq!(d.unchanged, BTreeSet::from([0]));
        assert_eq!(d.modified, BTreeSet::from([1]));
        assert_eq!(d.deleted, BTreeSet::from([2]));
        assert_eq!(d.added, BTreeSet::from([3]));

        let mut all: Vec<FileId> = d.unchanged.iter().chain(&d.modified).chain(&d.deleted).chain(&d.added).copied().collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3]);
    }

    #[test]
    fn mtime_drift_beyond_tolerance_is_modified() {
        let old: FilesById = [(0, rec("a", 10, 100.0))].into();
        let new: FilesById = [(0, rec("a", 10, 102.5))].into();
        assert_eq!(diff(&old, &new).modified, BTreeSet::from([0]));
    }

    #[test]
    fn scan_filters_by_extension_and_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.TXT"), "x").unwrap();
        fs::write(dir.path().join("b.csv"), "x").unwrap();
        fs::write(dir.path().join("c.rs"), "x").unwrap();
        fs::create_dir(dir.path().join("sub.txt")).unwrap();
        fs::write(dir.path().join("sub.txt").join("d.txt"), "x").unwrap();

        let files = scan(dir.path(), &[".txt".to_string()]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filetype, FileType::Txt);
        assert_eq!(files[0].size, 1);

        let not_dir = scan(&dir.path().join("a.TXT"), &[".txt".to_string()]);
        assert!(matches!(not_dir, Err(Error::NotADirectory(_))));
    }
}
