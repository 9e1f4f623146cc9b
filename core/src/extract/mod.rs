//! Per-format unit extraction.
//!
//! Every extractor turns one file into an ordered list of bounded text units
//! and never fails: unreadable or malformed input yields an empty list plus an
//! [`ExtractProblem`] describing what went wrong.

mod json;
mod plaintext;
mod table;
mod xml;

pub use table::{detect_csv_has_header, format_csv_row};

use crate::model::FileType;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractProblem {
    NotFound,
    Decode(String),
    Parse(String),
    Oversized { size: u64, limit: u64 },
    Io(String),
}

impl fmt::Display for ExtractProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractProblem::NotFound => write!(f, "file not found"),
            ExtractProblem::Decode(e) => write!(f, "decode error: {e}"),
            ExtractProblem::Parse(e) => write!(f, "parse error: {e}"),
            ExtractProblem::Oversized { size, limit } => write!(f, "file too large ({size} bytes, limit {limit})"),
            ExtractProblem::Io(e) => write!(f, "read error: {e}"),
        }
    }
}

impl From<std::io::Error> for ExtractProblem {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            ErrorKind::NotFound => ExtractProblem::NotFound,
            ErrorKind::InvalidData => ExtractProblem::Decode(e.to_string()),
            _ => ExtractProblem::Io(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub units: Vec<String>,
    pub problem: Option<ExtractProblem>,
}

impl Extraction {
    fn ok(units: Vec<String>) -> Self {
        Self { units, problem: None }
    }

    fn failed(problem: ExtractProblem) -> Self {
        Self { units: Vec::new(), problem: Some(problem) }
    }
}

impl From<Result<Vec<String>, ExtractProblem>> for Extraction {
    fn from(r: Result<Vec<String>, ExtractProblem>) -> Self {
        match r {
            Ok(units) => Extraction::ok(units),
            Err(problem) => Extraction::failed(problem),
        }
    }
}

/// Extract units and report why extraction came back empty, if it failed.
pub fn extract_units_with_report(path: &Path, filetype: FileType, case_sensitive: bool) -> Extraction {
    let result = match filetype {
        FileType::Txt | FileType::Log | FileType::Py | FileType::Md => plaintext::extract(path),
        FileType::Csv => table::extract(path, case_sensitive),
        FileType::Json => json::extract(path, case_sensitive),
        FileType::Xml => xml::extract(path, case_sensitive),
    };
    result.into()
}

/// Extract units for indexing; failures are logged and produce no units.
pub fn extract_units(path: &Path, filetype: FileType, case_sensitive: bool) -> Vec<String> {
    let Extraction { units, problem } = extract_units_with_report(path, filetype, case_sensitive);
    match problem {
        Some(problem) => {
            tracing::warn!(path = %path.display(), filetype = filetype.name(), %problem, "extraction failed");
        }
        None => {
            tracing::debug!(path = %path.display(), units = units.len(), "extracted");
        }
    }
    units
}

/// Replace `\r`, `\n` and `\t` with spaces, then trim.
pub(crate) fn clean_text(text: &str) -> String {
    text.replace(['\r', '\n', '\t'], " ").trim().to_string()
}

/// Truncate to at most `max_len` chars.
pub(crate) fn truncate_chars(text: &str, max_len: usize) -> &str {
    match text.char_indices().nth(max_len) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Final stage of every extractor: clean, truncate, drop empties, cap the count.
pub fn clamp_units(units: Vec<String>, max_units: usize, max_len: usize) -> Vec<String> {
    units
        .into_iter()
        .map(|u| {
            let cleaned = clean_text(&u);
            truncate_chars(&cleaned, max_len).trim_end().to_string()
        })
        .filter(|u| !u.is_empty())
        .take(max_units)
        .collect()
}

/// Fail with `Oversized` when the file is larger than `limit`.
pub(crate) fn check_size(path: &Path, limit: u64) -> Result<(), ExtractProblem> {
    let size = std::fs::metadata(path)?.len();
    if size > limit {
        return Err(ExtractProblem::Oversized { size, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_cleans_truncates_and_caps() {
        let units = vec![
            "a\tb\r\nc  ".to_string(),
            "   ".to_string(),
            "abcdefgh".to_string(),
            "zzz".to_string(),
        ];
        assert_eq!(clamp_units(units, 2, 5), vec!["a b", "abcde"]);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn missing_file_reports_not_found() {
        let report = extract_units_with_report(Path::new("/definitely/not/here.txt"), FileType::Txt, false);
        assert!(report.units.is_empty());
        assert_eq!(report.problem, Some(ExtractProblem::NotFound));
    }

    #[test]
    fn size_check_rejects_files_over_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.xml");
        std::fs::write(&path, vec![b'x'; 100]).unwrap();
        assert_eq!(check_size(&path, 10), Err(ExtractProblem::Oversized { size: 100, limit: 10 }));
        assert_eq!(check_size(&path, 100), Ok(()));
        assert_eq!(check_size(&dir.path().join("gone.xml"), 10), Err(ExtractProblem::NotFound));
    }
}
