use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use unitdex_core::normalize::normalize_index;
use unitdex_core::persist::{self, meta_path, IndexMeta};
use unitdex_core::scan::{FilesById, IdByPath};
use unitdex_core::{build_fresh, Error, FileRecord, FileType, InvertedIndex, Snapshot, StopwordsMode, TokenizerConfig};

fn corpus(root: &Path) {
    fs::write(root.join("a.txt"), "alpha beta\nbeta gamma beta").unwrap();
    fs::write(root.join("b.csv"), "city,pop\nOslo,700000\nLima,9000000\n").unwrap();
    fs::write(root.join("c.xml"), "<r><t k=\"v\">Alpha</t></r>").unwrap();
}

fn exts() -> Vec<String> {
    [".txt", ".csv", ".xml"].iter().map(|s| s.to_string()).collect()
}

fn built(root: &Path) -> Snapshot {
    let config = TokenizerConfig { stopwords_mode: StopwordsMode::English, ..Default::default() };
    build_fresh(root, &exts(), &config).unwrap().0
}

fn edit_meta(dir: &Path, f: impl FnOnce(&mut Value)) {
    let path = meta_path(dir);
    let mut meta: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    f(&mut meta);
    fs::write(&path, serde_json::to_string_pretty(&meta).unwrap()).unwrap();
}

#[test]
fn save_then_load_round_trips() {
    let data = tempdir().unwrap();
    let out = tempdir().unwrap();
    corpus(data.path());
    let snap = built(data.path());
    snap.save(out.path()).unwrap();

    assert!(out.path().join("meta.json").is_file());
    assert!(out.path().join("index.jsonl.gz").is_file());

    let loaded = persist::load(out.path()).unwrap();
    assert_eq!(loaded.files_by_id, snap.files_by_id);
    assert_eq!(loaded.id_by_path, snap.id_by_path);
    assert_eq!(normalize_index(&loaded.index), normalize_index(&snap.index));
    assert_eq!(loaded.meta.tokenizer_config, snap.meta.tokenizer_config);
    assert_eq!(loaded.meta.extensions, exts());
    let validation = loaded.meta.validation.clone().unwrap();
    assert!(validation.is_valid, "{:?}", validation.problems);

    let restored = Snapshot::from_loaded(loaded);
    for id in snap.files_by_id.keys() {
        assert_eq!(restored.units(*id), snap.units(*id));
    }
    assert_eq!(restored.casefold_index, restored.index.casefolded());
}

#[test]
fn normalized_index_also_round_trips() {
    let data = tempdir().unwrap();
    let out = tempdir().unwrap();
    corpus(data.path());
    let snap = built(data.path());
    let normalized = normalize_index(&snap.index);
    persist::save(out.path(), &snap.files_by_id, &snap.id_by_path, &normalized, &snap.meta).unwrap();
    let loaded = persist::load(out.path()).unwrap();
    assert_eq!(normalize_index(&loaded.index), normalized);
}

#[test]
fn load_reports_missing_corrupt_and_unsupported_files() {
    let empty = tempdir().unwrap();
    assert!(matches!(persist::load(empty.path()), Err(Error::FileNotFound(_))));

    let data = tempdir().unwrap();
    let out = tempdir().unwrap();
    corpus(data.path());
    built(data.path()).save(out.path()).unwrap();

    edit_meta(out.path(), |m| m["index_format_version"] = Value::from("2"));
    assert!(matches!(persist::load(out.path()), Err(Error::UnsupportedFormatVersion(v)) if v == "2"));

    edit_meta(out.path(), |m| {
        m["index_format_version"] = Value::from("1");
        m["files"][0]["filetype"] = Value::from("PDF");
    });
    assert!(matches!(persist::load(out.path()), Err(Error::UnknownFileType(t)) if t == "PDF"));

    fs::write(meta_path(out.path()), "{ not json").unwrap();
    assert!(matches!(persist::load(out.path()), Err(Error::CorruptIndexFile { .. })));
}

#[test]
fn corrupt_index_stream_is_rejected() {
    let data = tempdir().unwrap();
    let out = tempdir().unwrap();
    corpus(data.path());
    built(data.path()).save(out.path()).unwrap();
    fs::write(out.path().join("index.jsonl.gz"), b"definitely not gzip").unwrap();
    assert!(matches!(persist::load(out.path()), Err(Error::CorruptIndexFile { .. })));
}

#[test]
fn validation_flags_changed_and_missing_files() {
    let data = tempdir().unwrap();
    let out = tempdir().unwrap();
    corpus(data.path());
    built(data.path()).save(out.path()).unwrap();

    fs::write(data.path().join("a.txt"), "alpha beta and a good deal more text").unwrap();
    fs::remove_file(data.path().join("c.xml")).unwrap();

    let validation = persist::load(out.path()).unwrap().meta.validation.unwrap();
    assert!(!validation.is_valid);
    let a = data.path().join("a.txt");
    let c = data.path().join("c.xml");
    assert!(validation.problems.contains(&format!("File size changed: {}", a.display())));
    assert!(validation.problems.contains(&format!("Missing file: {}", c.display())));
}

#[test]
fn save_requires_existing_directory() {
    let data = tempdir().unwrap();
    corpus(data.path());
    let snap = built(data.path());
    let err = snap.save(&data.path().join("nope")).unwrap_err();
    assert!(matches!(err, Error::NotADirectory(_)));
}

#[test]
fn fractional_mtimes_survive_bit_for_bit() {
    let out = tempdir().unwrap();
    let mut files_by_id = FilesById::new();
    let mut id_by_path = IdByPath::new();
    for k in 0..5_000u32 {
        let path = out.path().join(format!("f{k}.log"));
        let mtime = 1.7e9 + f64::from(k) + f64::from(k.wrapping_mul(2_654_435_761) % 1_000_003) / 1_000_003.0;
        files_by_id.insert(k, FileRecord { path: path.clone(), size: u64::from(k), mtime, filetype: FileType::Log });
        id_by_path.insert(path, k);
    }
    let meta = IndexMeta::new(out.path(), &[".log".to_string()], TokenizerConfig::default());
    persist::save(out.path(), &files_by_id, &id_by_path, &InvertedIndex::new(), &meta).unwrap();

    let loaded = persist::load(out.path()).unwrap();
    let mismatched: Vec<_> = files_by_id
        .iter()
        .filter(|(id, r)| loaded.files_by_id[id].mtime.to_bits() != r.mtime.to_bits())
        .map(|(_, r)| r.mtime)
        .collect();
    assert!(mismatched.is_empty(), "{} mtimes changed, first {:?}", mismatched.len(), mismatched.first());
    assert_eq!(loaded.files_by_id, files_by_id);
}
