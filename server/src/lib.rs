use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use unitdex_core::persist::{self, IndexMeta};
use unitdex_core::scan::scan;
use unitdex_core::{
    rebuild_incremental_with_progress, search, FileId, FileType, RebuildStage, RebuildStats, SearchMode, SearchOptions,
    SearchResult, Snapshot, TokenizerConfig, DEFAULT_EXTENSIONS,
};

const MAX_K: usize = 500;

/// Startup settings, normally filled from command-line flags and environment.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Where `meta.json` / `index.jsonl.gz` live and where rebuilds are saved.
    pub index_dir: PathBuf,
    /// Directory to index when `index_dir` holds no index yet.
    pub root: Option<PathBuf>,
    pub admin_token: Option<String>,
    /// Comma-separated origins; any origin when unset or unparsable.
    pub cors_allow_origin: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize {
    unitdex_core::query::DEFAULT_LIMIT
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchResult>,
}

#[derive(Serialize)]
pub struct FileResponse {
    pub file_id: FileId,
    pub path: PathBuf,
    pub size: u64,
    pub mtime: f64,
    pub filetype: FileType,
    pub units: Vec<String>,
}

/// What the background re-index worker is doing. `state` carries the staged
/// messages `Scanning...` through `Done` or `Failed: <cause>`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub state: String,
    pub running: bool,
    pub files: usize,
    pub last_rebuild: Option<RebuildSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildSummary {
    pub unchanged: usize,
    pub modified: usize,
    pub added: usize,
    pub deleted: usize,
    pub tokens: usize,
    pub took_s: f64,
}

#[derive(Clone)]
pub struct AppState {
    /// Queries clone the inner `Arc`; a finished rebuild replaces it.
    pub snapshot: Arc<RwLock<Arc<Snapshot>>>,
    pub status: Arc<RwLock<IndexStatus>>,
    pub index_dir: PathBuf,
    pub admin_token: Option<String>,
}

impl AppState {
    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    fn set_stage(&self, stage: &str) {
        tracing::info!(stage, "re-index progress");
        self.status.write().state = stage.to_string();
    }
}

pub fn build_app(config: ServerConfig) -> Result<Router> {
    let snapshot = initial_snapshot(&config)?;
    let status = IndexStatus {
        state: "Idle".to_string(),
        running: false,
        files: snapshot.file_count(),
        last_rebuild: None,
    };
    let app_state = AppState {
        snapshot: Arc::new(RwLock::new(Arc::new(snapshot))),
        status: Arc::new(RwLock::new(status)),
        index_dir: config.index_dir.clone(),
        admin_token: config.admin_token.clone(),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/file/:file_id", get(file_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .route("/index/status", get(status_handler))
        .with_state(app_state)
        .layer(cors_layer(config.cors_allow_origin.as_deref()))
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

fn initial_snapshot(config: &ServerConfig) -> Result<Snapshot> {
    if persist::meta_path(&config.index_dir).is_file() {
        let snapshot = Snapshot::load(&config.index_dir)
            .with_context(|| format!("loading index from {}", config.index_dir.display()))?;
        if let Some(validation) = snapshot.meta.validation.as_ref().filter(|v| !v.is_valid) {
            tracing::warn!(problems = validation.problems.len(), "index is stale; POST /index/rebuild to refresh");
        }
        return Ok(snapshot);
    }
    match &config.root {
        Some(root) => {
            tracing::info!(root = %root.display(), "no index yet; starting empty");
            let extensions: Vec<String> = DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect();
            Ok(Snapshot::empty(IndexMeta::new(root, &extensions, TokenizerConfig::default())))
        }
        None => anyhow::bail!("no index in {} and no root directory to build one from", config.index_dir.display()),
    }
}

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let any = || CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    match origins {
        Some(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                any()
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        None => any(),
    }
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let snapshot = state.current();
    let options = SearchOptions { case_sensitive: params.case_sensitive, limit: usize::MAX, ..Default::default() };
    let mode = params.mode;
    let query = params.q.clone();
    let found = tokio::task::spawn_blocking(move || search(&snapshot, mode, &query, &options))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let mut results = found.map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let total_hits = results.len();
    results.truncate(params.k.clamp(1, MAX_K));
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, mode, took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn file_handler(
    State(state): State<AppState>,
    Path(file_id): Path<FileId>,
) -> Result<Json<FileResponse>, (StatusCode, String)> {
    let snapshot = state.current();
    let record = snapshot
        .files_by_id
        .get(&file_id)
        .ok_or((StatusCode::NOT_FOUND, format!("no file with id {file_id}")))?;
    Ok(Json(FileResponse {
        file_id,
        path: record.path.clone(),
        size: record.size,
        mtime: record.mtime,
        filetype: record.filetype,
        units: snapshot.units(file_id).to_vec(),
    }))
}

pub async fn status_handler(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.status.read().clone())
}

/// Start a background refresh of the indexed root. Queries keep using the
/// current snapshot until the new one is saved and swapped in.
pub async fn rebuild_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<IndexStatus>), (StatusCode, String)> {
    authorize(&state, &headers)?;
    {
        let mut status = state.status.write();
        if status.running {
            return Err((StatusCode::CONFLICT, "a rebuild is already running".into()));
        }
        status.running = true;
        status.state = "Scanning...".to_string();
    }

    let worker = state.clone();
    tokio::task::spawn_blocking(move || {
        let start = std::time::Instant::now();
        let outcome = run_rebuild(&worker);
        let mut status = worker.status.write();
        status.running = false;
        match outcome {
            Ok((stats, files)) => {
                status.state = "Done".to_string();
                status.files = files;
                status.last_rebuild = Some(summary(stats, start.elapsed().as_secs_f64()));
            }
            Err(e) => {
                tracing::error!(error = %e, "re-index failed");
                status.state = format!("Failed: {e:#}");
            }
        }
    });

    let accepted = state.status.read().clone();
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

fn run_rebuild(state: &AppState) -> Result<(RebuildStats, usize)> {
    let old = state.current();
    state.set_stage("Scanning...");
    let scanned = scan(&old.meta.indexed_root_dir, &old.meta.extensions)?;
    let config = old.meta.tokenizer_config.clone();
    let (next, stats) = rebuild_incremental_with_progress(Snapshot::clone(&old), scanned, &config, |stage| {
        state.set_stage(match stage {
            RebuildStage::Extracting => "Extracting...",
            RebuildStage::Indexing => "Indexing...",
        })
    });

    state.set_stage("Saving...");
    std::fs::create_dir_all(&state.index_dir)?;
    next.save(&state.index_dir)?;

    let files = next.file_count();
    *state.snapshot.write() = Arc::new(next);
    Ok((stats, files))
}

fn summary(stats: RebuildStats, took_s: f64) -> RebuildSummary {
    RebuildSummary {
        unchanged: stats.unchanged,
        modified: stats.modified,
        added: stats.added,
        deleted: stats.deleted,
        tokens: stats.tokens,
        took_s,
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
