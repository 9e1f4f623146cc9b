use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("meta.json or index.jsonl.gz not found in {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("unsupported index format version: {0}")]
    UnsupportedFormatVersion(String),

    #[error("index file {} is corrupted: {reason}", path.display())]
    CorruptIndexFile { path: PathBuf, reason: String },

    #[error("unknown file type in index: {0}")]
    UnknownFileType(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("cannot merge an empty group of hits")]
    EmptyMergeInput,

    #[error("an error occurred while saving meta and index data: {0}")]
    Save(#[source] std::io::Error),
}

impl Error {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::CorruptIndexFile { path: path.into(), reason: reason.to_string() }
    }
}
