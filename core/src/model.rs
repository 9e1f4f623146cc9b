use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Stable identifier assigned once per distinct path.
pub type FileId = u32;

/// Position of a unit inside its file's unit sequence.
pub type UnitIndex = u32;

/// Extracted units per file, in extraction order.
pub type UnitStore = HashMap<FileId, Vec<String>>;

pub const DEFAULT_EXTENSIONS: &[&str] = &[".txt", ".log", ".py", ".md", ".csv", ".json", ".xml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    Txt,
    Log,
    Py,
    Md,
    Csv,
    Json,
    Xml,
}

impl FileType {
    /// Accepts the extension with or without the leading dot, any case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "txt" => Some(FileType::Txt),
            "log" => Some(FileType::Log),
            "py" => Some(FileType::Py),
            "md" => Some(FileType::Md),
            "csv" => Some(FileType::Csv),
            "json" => Some(FileType::Json),
            "xml" => Some(FileType::Xml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }

    /// Name stored in `meta.json`.
    pub fn name(self) -> &'static str {
        match self {
            FileType::Txt => "TXT",
            FileType::Log => "LOG",
            FileType::Py => "PY",
            FileType::Md => "MD",
            FileType::Csv => "CSV",
            FileType::Json => "JSON",
            FileType::Xml => "XML",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "TXT" => Some(FileType::Txt),
            "LOG" => Some(FileType::Log),
            "PY" => Some(FileType::Py),
            "MD" => Some(FileType::Md),
            "CSV" => Some(FileType::Csv),
            "JSON" => Some(FileType::Json),
            "XML" => Some(FileType::Xml),
            _ => None,
        }
    }
}

/// A discovered file and its content fingerprint (size + mtime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub mtime: f64,
    pub filetype: FileType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub path: PathBuf,
    pub matches_count: usize,
    pub score: f64,
    pub snippets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lookup_ignores_case_and_dot() {
        assert_eq!(FileType::from_extension(".CSV"), Some(FileType::Csv));
        assert_eq!(FileType::from_extension("md"), Some(FileType::Md));
        assert_eq!(FileType::from_extension(".rs"), None);
    }

    #[test]
    fn names_round_trip() {
        for ft in [FileType::Txt, FileType::Log, FileType::Py, FileType::Md, FileType::Csv, FileType::Json, FileType::Xml] {
            assert_eq!(FileType::from_name(ft.name()), Some(ft));
        }
        assert_eq!(FileType::from_name("PDF"), None);
    }
}
