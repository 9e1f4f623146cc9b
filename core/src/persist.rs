use crate::error::{Error, Result};
use crate::index::{Hit, InvertedIndex};
use crate::model::{FileId, FileRecord, FileType, UnitIndex};
use crate::scan::{mtime_secs, FilesById, IdByPath, MTIME_TOLERANCE_SECS};
use crate::tokenizer::TokenizerConfig;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SUPPORTED_INDEX_FORMAT_VERSIONS: &[&str] = &["1"];
pub const CURRENT_INDEX_FORMAT_VERSION: &str = "1";

const META_FILE: &str = "meta.json";
const INDEX_FILE: &str = "index.jsonl.gz";

/// Describes how an index was built. Stored at the top level of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub index_format_version: String,
    pub created_at: String,
    pub indexed_root_dir: PathBuf,
    pub extensions: Vec<String>,
    #[serde(default)]
    pub tokenizer_config: TokenizerConfig,
    /// Filled in by [`load`]; never written.
    #[serde(skip)]
    pub validation: Option<Validation>,
}

impl IndexMeta {
    pub fn new(root: &Path, extensions: &[String], tokenizer_config: TokenizerConfig) -> Self {
        Self {
            index_format_version: CURRENT_INDEX_FORMAT_VERSION.to_string(),
            created_at: now_rfc3339(),
            indexed_root_dir: root.to_path_buf(),
            extensions: extensions.to_vec(),
            tokenizer_config,
            validation: None,
        }
    }

    /// Same meta stamped with the current time.
    pub fn touched(self) -> Self {
        Self { created_at: now_rfc3339(), ..self }
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub is_valid: bool,
    pub problems: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetaFile {
    #[serde(flatten)]
    meta: IndexMeta,
    id_by_path: BTreeMap<String, FileId>,
    files: Vec<FileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    id: FileId,
    path: String,
    size: u64,
    mtime: f64,
    filetype: String,
}

/// One line of `index.jsonl.gz`: file id → `[unit_index, count]` pairs.
#[derive(Debug, Serialize, Deserialize)]
struct IndexLine {
    token: String,
    hits: BTreeMap<String, Vec<(UnitIndex, u32)>>,
}

/// Everything `load` reconstructs. `meta.validation` is always set.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub files_by_id: FilesById,
    pub id_by_path: IdByPath,
    pub index: InvertedIndex,
    pub meta: IndexMeta,
}

pub fn meta_path(dir: &Path) -> PathBuf {
    dir.join(META_FILE)
}

pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// Write `meta.json` (indented) and `index.jsonl.gz` into an existing directory.
pub fn save(
    out_dir: &Path,
    files_by_id: &FilesById,
    id_by_path: &IdByPath,
    index: &InvertedIndex,
    meta: &IndexMeta,
) -> Result<()> {
    if !out_dir.is_dir() {
        return Err(Error::NotADirectory(out_dir.to_path_buf()));
    }
    let meta_file = MetaFile {
        meta: meta.clone(),
        id_by_path: id_by_path
            .iter()
            .map(|(p, &id)| (p.to_string_lossy().into_owned(), id))
            .collect(),
        files: files_by_id
            .iter()
            .map(|(&id, f)| FileEntry {
                id,
                path: f.path.to_string_lossy().into_owned(),
                size: f.size,
                mtime: f.mtime,
                filetype: f.filetype.name().to_string(),
            })
            .collect(),
    };
    write_meta(&meta_path(out_dir), &meta_file).map_err(Error::Save)?;
    write_index(&index_path(out_dir), index).map_err(Error::Save)?;
    tracing::info!(dir = %out_dir.display(), files = files_by_id.len(), tokens = index.len(), "index saved");
    Ok(())
}

fn write_meta(path: &Path, meta: &MetaFile) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut w, meta)?;
    w.write_all(b"\n")?;
    w.flush()
}

fn write_index(path: &Path, index: &InvertedIndex) -> io::Result<()> {
    let mut enc = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    for (token, hits) in index.iter() {
        let line = IndexLine { token: token.to_string(), hits: encode_hits(hits) };
        serde_json::to_writer(&mut enc, &line)?;
        enc.write_all(b"\n")?;
    }
    enc.finish()?.flush()
}

/// An aggregated hit is written as its first unit carrying the total count,
/// followed by zero-count pairs for the remaining units.
fn encode_hits(hits: &[Hit]) -> BTreeMap<String, Vec<(UnitIndex, u32)>> {
    let mut out: BTreeMap<String, Vec<(UnitIndex, u32)>> = BTreeMap::new();
    for hit in hits {
        let Some((first, rest)) = hit.units.split_first() else {
            continue;
        };
        let pairs = out.entry(hit.file_id.to_string()).or_default();
        pairs.push((*first, hit.count));
        pairs.extend(rest.iter().map(|&u| (u, 0)));
    }
    out
}

fn decode_hits(file_id: FileId, pairs: Vec<(UnitIndex, u32)>, into: &mut Vec<Hit>) {
    let start = into.len();
    for (unit, count) in pairs {
        if count == 0 && into.len() > start {
            if let Some(prev) = into.last_mut() {
                prev.units.push(unit);
                continue;
            }
        }
        into.push(Hit::new(file_id, unit, count));
    }
}

/// Read a snapshot directory back and validate it against the filesystem.
pub fn load(in_dir: &Path) -> Result<LoadedIndex> {
    let meta_file_path = meta_path(in_dir);
    let index_file_path = index_path(in_dir);
    if !meta_file_path.is_file() || !index_file_path.is_file() {
        return Err(Error::FileNotFound(in_dir.to_path_buf()));
    }

    let raw = std::fs::read_to_string(&meta_file_path)
        .map_err(|source| Error::FileRead { path: meta_file_path.clone(), source })?;
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| Error::corrupt(&meta_file_path, e))?;
    check_version(&value)?;
    let MetaFile { mut meta, id_by_path, files } =
        serde_json::from_value(value).map_err(|e| Error::corrupt(&meta_file_path, e))?;

    let mut files_by_id = FilesById::new();
    for entry in files {
        let filetype = FileType::from_name(&entry.filetype).ok_or_else(|| Error::UnknownFileType(entry.filetype.clone()))?;
        files_by_id.insert(
            entry.id,
            FileRecord { path: PathBuf::from(entry.path), size: entry.size, mtime: entry.mtime, filetype },
        );
    }
    let id_by_path: IdByPath = id_by_path.into_iter().map(|(p, id)| (PathBuf::from(p), id)).collect();

    let index = read_index(&index_file_path)?;

    let validation = validate(&files_by_id);
    if !validation.is_valid {
        tracing::warn!(problems = validation.problems.len(), "loaded index is stale");
    }
    meta.validation = Some(validation);
    tracing::info!(dir = %in_dir.display(), files = files_by_id.len(), tokens = index.len(), "index loaded");
    Ok(LoadedIndex { files_by_id, id_by_path, index, meta })
}

fn check_version(meta: &serde_json::Value) -> Result<()> {
    let version = match meta.get("index_format_version") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => return Err(Error::UnsupportedFormatVersion("<missing>".to_string())),
    };
    if SUPPORTED_INDEX_FORMAT_VERSIONS.contains(&version.as_str()) {
        Ok(())
    } else {
        Err(Error::UnsupportedFormatVersion(version))
    }
}

fn read_index(path: &Path) -> Result<InvertedIndex> {
    let file = File::open(path).map_err(|source| Error::FileRead { path: path.to_path_buf(), source })?;
    let reader = BufReader::new(GzDecoder::new(BufReader::new(file)));
    let mut index = InvertedIndex::new();
    for line in reader.lines() {
        let line = line.map_err(|e| Error::corrupt(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: IndexLine = serde_json::from_str(&line).map_err(|e| Error::corrupt(path, e))?;
        let mut hits = Vec::new();
        for (file_id, pairs) in entry.hits {
            let file_id: FileId = file_id
                .parse()
                .map_err(|_| Error::corrupt(path, format!("bad file id {file_id:?} for token {:?}", entry.token)))?;
            decode_hits(file_id, pairs, &mut hits);
        }
        index.set_postings(entry.token, hits);
    }
    Ok(index)
}

/// Check that every indexed file still exists with the recorded size and mtime.
pub fn validate(files_by_id: &FilesById) -> Validation {
    let mut problems = Vec::new();
    for record in files_by_id.values() {
        let path = record.path.display();
        let meta = match std::fs::metadata(&record.path) {
            Ok(m) if m.is_file() => m,
            _ => {
                problems.push(format!("Missing file: {path}"));
                continue;
            }
        };
        if meta.len() != record.size {
            problems.push(format!("File size changed: {path}"));
        }
        if (mtime_secs(&meta) - record.mtime).abs() > MTIME_TOLERANCE_SECS {
            problems.push(format!("File modified time changed: {path}"));
        }
    }
    Validation { is_valid: problems.is_empty(), problems }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_hits_survive_encoding() {
        let hits = vec![
            Hit { file_id: 4, units: vec![1, 5, 9], count: 7 },
            Hit::new(2, 3, 1),
        ];
        let encoded = encode_hits(&hits);
        assert_eq!(encoded["4"], vec![(1, 7), (5, 0), (9, 0)]);

        let mut decoded = Vec::new();
        for (fid, pairs) in encoded {
            decode_hits(fid.parse().unwrap(), pairs, &mut decoded);
        }
        decoded.sort_by_key(|h| h.file_id);
        assert_eq!(decoded, vec![Hit::new(2, 3, 1), Hit { file_id: 4, units: vec![1, 5, 9], count: 7 }]);
    }

    #[test]
    fn version_check() {
        assert!(check_version(&serde_json::json!({"index_format_version": "1"})).is_ok());
        assert!(matches!(
            check_version(&serde_json::json!({"index_format_version": "2"})),
            Err(Error::UnsupportedFormatVersion(v)) if v == "2"
        ));
        assert!(matches!(check_version(&serde_json::json!({})), Err(Error::UnsupportedFormatVersion(_))));
    }
}
