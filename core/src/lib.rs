//! Core of unitdex: turns a flat directory of text-like and structured files
//! into searchable units, maintains an inverted index over them, and answers
//! AND / contains / exact / regex queries with context snippets.

pub mod engine;
pub mod error;
pub mod extract;
pub mod index;
pub mod model;
pub mod normalize;
pub mod persist;
pub mod query;
pub mod scan;
pub mod snippets;
pub mod tokenizer;

pub use engine::{
    build_fresh, rebuild_incremental, rebuild_incremental_with_progress, refresh, RebuildStage, RebuildStats, Snapshot,
};
pub use error::{Error, Result};
pub use index::{Hit, InvertedIndex};
pub use model::{FileId, FileRecord, FileType, SearchResult, UnitIndex, UnitStore, DEFAULT_EXTENSIONS};
pub use persist::{IndexMeta, LoadedIndex, Validation};
pub use query::{search, SearchMode, SearchOptions};
pub use snippets::SnippetOptions;
pub use tokenizer::{StopwordsMode, TokenizerConfig};
