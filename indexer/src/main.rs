use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};
use unitdex_core::persist;
use unitdex_core::{
    build_fresh, rebuild_incremental, scan, search, RebuildStats, SearchMode, SearchOptions, Snapshot, StopwordsMode,
    TokenizerConfig, DEFAULT_EXTENSIONS,
};

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "unitdex")]
#[command(about = "Index a directory of text, log, code, CSV, JSON and XML files and search it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or incrementally refresh) the index for a directory
    Build {
        /// Directory to index (not recursive)
        #[arg(long)]
        root: PathBuf,
        /// Output index directory
        #[arg(long, env = "UNITDEX_INDEX")]
        output: PathBuf,
        /// Extensions to include; repeat the flag for several
        #[arg(long = "ext")]
        extensions: Vec<String>,
        #[arg(long, default_value_t = 2)]
        min_length: usize,
        #[arg(long, value_enum, default_value_t = StopwordsArg::None)]
        stopwords: StopwordsArg,
        /// Custom stopword, used with `--stopwords custom`; repeatable
        #[arg(long = "stopword")]
        custom_stopwords: Vec<String>,
        /// Drop numeric tokens
        #[arg(long, default_value_t = false)]
        no_numbers: bool,
        #[arg(long, default_value_t = false)]
        case_sensitive: bool,
        /// Reuse the index already in --output and only process changed files
        #[arg(long, default_value_t = false)]
        incremental: bool,
    },
    /// Query an index
    Search {
        #[arg(long, env = "UNITDEX_INDEX")]
        index: PathBuf,
        #[arg(long, default_value = "and")]
        mode: SearchMode,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = false)]
        case_sensitive: bool,
        #[arg(long, default_value_t = unitdex_core::query::DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Check an index against the files on disk
    Validate {
        #[arg(long, env = "UNITDEX_INDEX")]
        index: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StopwordsArg {
    None,
    English,
    Custom,
}

impl From<StopwordsArg> for StopwordsMode {
    fn from(arg: StopwordsArg) -> Self {
        match arg {
            StopwordsArg::None => StopwordsMode::None,
            StopwordsArg::English => StopwordsMode::English,
            StopwordsArg::Custom => StopwordsMode::Custom,
        }
    }
}

#[derive(Serialize)]
struct BuildReport {
    root: PathBuf,
    output: PathBuf,
    files: usize,
    unchanged: usize,
    modified: usize,
    added: usize,
    deleted: usize,
    tokens: usize,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            root,
            output,
            extensions,
            min_length,
            stopwords,
            custom_stopwords,
            no_numbers,
            case_sensitive,
            incremental,
        } => {
            let config = TokenizerConfig {
                min_length,
                stopwords_mode: stopwords.into(),
                stopwords: custom_stopwords,
                keep_numbers: !no_numbers,
                case_sensitive,
            };
            let extensions = if extensions.is_empty() {
                DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
            } else {
                extensions
            };
            build_index(&root, &output, &extensions, &config, incremental)
        }
        Commands::Search { index, mode, query, case_sensitive, limit } => {
            let snapshot = Snapshot::load(&index).with_context(|| format!("loading index from {}", index.display()))?;
            warn_if_stale(&snapshot);
            let options = SearchOptions { case_sensitive, limit, ..Default::default() };
            let results = search(&snapshot, mode, &query, &options)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Commands::Validate { index } => {
            let loaded = persist::load(&index).with_context(|| format!("loading index from {}", index.display()))?;
            let validation = loaded.meta.validation.unwrap_or_else(|| persist::validate(&loaded.files_by_id));
            println!("{}", serde_json::to_string_pretty(&validation)?);
            if !validation.is_valid {
                anyhow::bail!("index is stale: {} problem(s)", validation.problems.len());
            }
            Ok(())
        }
    }
}

fn build_index(root: &Path, output: &Path, extensions: &[String], config: &TokenizerConfig, incremental: bool) -> Result<()> {
    fs::create_dir_all(output)?;

    let (snapshot, stats) = match previous_snapshot(output, incremental)? {
        Some(old) if old.meta.indexed_root_dir == root => {
            let scanned = scan::scan(root, extensions)?;
            let old = Snapshot { meta: persist::IndexMeta { extensions: extensions.to_vec(), ..old.meta }, ..old };
            rebuild_incremental(old, scanned, config)
        }
        Some(old) => {
            tracing::warn!(
                previous = %old.meta.indexed_root_dir.display(),
                requested = %root.display(),
                "existing index covers a different root; building from scratch"
            );
            build_fresh(root, extensions, config)?
        }
        None => build_fresh(root, extensions, config)?,
    };

    snapshot.save(output)?;
    let RebuildStats { unchanged, modified, added, deleted, tokens } = stats;
    let report = BuildReport {
        root: root.to_path_buf(),
        output: output.to_path_buf(),
        files: snapshot.file_count(),
        unchanged,
        modified,
        added,
        deleted,
        tokens,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    tracing::info!(output = %output.display(), "index build complete");
    Ok(())
}

fn previous_snapshot(output: &Path, incremental: bool) -> Result<Option<Snapshot>> {
    if !incremental {
        return Ok(None);
    }
    if !persist::meta_path(output).is_file() {
        tracing::info!(output = %output.display(), "no existing index; doing a full build");
        return Ok(None);
    }
    Ok(Some(Snapshot::load(output)?))
}

fn warn_if_stale(snapshot: &Snapshot) {
    if let Some(validation) = &snapshot.meta.validation {
        for problem in &validation.problems {
            tracing::warn!(%problem, "index is out of date");
        }
    }
}
