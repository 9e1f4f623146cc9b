use crate::engine::Snapshot;
use crate::error::Result;
use crate::index::InvertedIndex;
use crate::model::{FileId, SearchResult, UnitIndex};
use crate::snippets::{find_matching_unit_indexes, make_snippets, snippets_for_matches, SnippetOptions, UnitMatcher};
use crate::tokenizer::{tokenize, TokenizerConfig};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    And,
    Contains,
    Exact,
    Regex,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(SearchMode::And),
            "contains" => Ok(SearchMode::Contains),
            "exact" => Ok(SearchMode::Exact),
            "regex" => Ok(SearchMode::Regex),
            other => Err(format!("unknown search mode: {other} (expected and, contains, exact or regex)")),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchMode::And => "and",
            SearchMode::Contains => "contains",
            SearchMode::Exact => "exact",
            SearchMode::Regex => "regex",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub limit: usize,
    pub snippets: SnippetOptions,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { case_sensitive: false, limit: DEFAULT_LIMIT, snippets: SnippetOptions::default() }
    }
}

/// Same pipeline as indexing, so query tokens line up with index keys.
pub fn tokenize_query(text: &str, config: &TokenizerConfig) -> Vec<String> {
    tokenize(text, config)
}

fn unique_query_tokens(text: &str, config: &TokenizerConfig) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize_query(text, config)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

pub fn search(snapshot: &Snapshot, mode: SearchMode, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
    match mode {
        SearchMode::And => Ok(search_and(snapshot, query, options)),
        SearchMode::Contains => Ok(search_contains(snapshot, query, options)),
        SearchMode::Exact => Ok(search_exact(snapshot, query, options)),
        SearchMode::Regex => search_regex(snapshot, query, options),
    }
}

/// Per-file occurrences of one token.
#[derive(Debug, Default)]
pub struct TermStats {
    per_file: HashMap<FileId, (BTreeSet<UnitIndex>, u32)>,
}

impl TermStats {
    pub fn collect(index: &InvertedIndex, token: &str) -> Option<Self> {
        let hits = index.get(token)?;
        let mut per_file: HashMap<FileId, (BTreeSet<UnitIndex>, u32)> = HashMap::new();
        for hit in hits {
            let entry = per_file.entry(hit.file_id).or_default();
            entry.0.extend(hit.units.iter().copied());
            entry.1 += hit.count;
        }
        Some(Self { per_file })
    }

    /// Number of distinct files containing the token.
    pub fn df(&self) -> usize {
        self.per_file.len()
    }

    pub fn count_in(&self, file_id: FileId) -> u32 {
        self.per_file.get(&file_id).map_or(0, |(_, c)| *c)
    }

    fn file_ids(&self) -> BTreeSet<FileId> {
        self.per_file.keys().copied().collect()
    }

    fn units_in(&self, file_id: FileId) -> impl Iterator<Item = UnitIndex> + '_ {
        self.per_file.get(&file_id).into_iter().flat_map(|(u, _)| u.iter().copied())
    }
}

/// `ln((N + 1) / (df + 1)) + 1`
pub fn idf(df: usize, total_files: usize) -> f64 {
    ((total_files as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0
}

/// `sqrt(occurrences of the token in the file)`
pub fn tf(count: u32) -> f64 {
    (count as f64).sqrt()
}

/// Sum of tf·idf over the distinct query tokens. Tokens missing from the
/// index contribute nothing.
pub fn tfidf_score(index: &InvertedIndex, file_id: FileId, tokens: &[String], total_files: usize) -> f64 {
    let distinct: BTreeSet<&String> = tokens.iter().collect();
    distinct
        .into_iter()
        .filter_map(|t| TermStats::collect(index, t))
        .map(|stats| score_term(&stats, file_id, total_files))
        .sum()
}

fn score_term(stats: &TermStats, file_id: FileId, total_files: usize) -> f64 {
    tf(stats.count_in(file_id)) * idf(stats.df(), total_files)
}

/// Files containing every query token, ranked by TF-IDF.
pub fn search_and(snapshot: &Snapshot, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
    let config = snapshot.meta.tokenizer_config.with_case_sensitive(options.case_sensitive);
    let tokens = unique_query_tokens(query, &config);
    if tokens.is_empty() {
        return Vec::new();
    }
    let index = snapshot.lookup_index(options.case_sensitive);

    let mut stats = Vec::with_capacity(tokens.len());
    for token in &tokens {
        match TermStats::collect(index, token) {
            Some(s) => stats.push(s),
            None => return Vec::new(),
        }
    }
    let mut common = stats[0].file_ids();
    for s in &stats[1..] {
        let ids = s.file_ids();
        common.retain(|id| ids.contains(id));
    }

    let total_files = snapshot.file_count();
    let matcher = UnitMatcher::tokens(tokens.iter().cloned(), config);
    let mut results = Vec::new();
    for file_id in common {
        let Some(record) = snapshot.files_by_id.get(&file_id) else {
            continue;
        };
        let matched_units: BTreeSet<UnitIndex> = stats.iter().flat_map(|s| s.units_in(file_id)).collect();
        if matched_units.is_empty() {
            continue;
        }
        let score = stats.iter().map(|s| score_term(s, file_id, total_files)).sum();
        results.push(SearchResult {
            path: record.path.clone(),
            matches_count: matched_units.len(),
            score,
            snippets: make_snippets(snapshot.units(file_id), &matcher, &options.snippets),
        });
    }
    rank(results, options.limit)
}

/// Units containing any query token as a substring. Score is the unit count.
pub fn search_contains(snapshot: &Snapshot, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
    let config = snapshot.meta.tokenizer_config.with_case_sensitive(options.case_sensitive);
    let tokens = unique_query_tokens(query, &config);
    if tokens.is_empty() {
        return Vec::new();
    }
    let matcher = UnitMatcher::contains(&tokens, options.case_sensitive);
    scan_units(snapshot, &matcher, options)
}

/// Units containing the literal query text.
pub fn search_exact(snapshot: &Snapshot, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let matcher = UnitMatcher::exact(query, options.case_sensitive);
    scan_units(snapshot, &matcher, options)
}

/// Units matching `pattern`; case-insensitive unless requested otherwise.
///
/// An empty pattern is treated like an empty query and returns nothing, even
/// though it would compile and match every unit.
pub fn search_regex(snapshot: &Snapshot, pattern: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
    if pattern.is_empty() {
        return Ok(Vec::new());
    }
    let matcher = UnitMatcher::regex(pattern, options.case_sensitive)?;
    Ok(scan_units(snapshot, &matcher, options))
}

fn scan_units(snapshot: &Snapshot, matcher: &UnitMatcher, options: &SearchOptions) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for (&file_id, record) in &snapshot.files_by_id {
        let units = snapshot.units(file_id);
        let matches = find_matching_unit_indexes(units, matcher);
        if matches.is_empty() {
            continue;
        }
        results.push(SearchResult {
            path: record.path.clone(),
            matches_count: matches.len(),
            score: matches.len() as f64,
            snippets: snippets_for_matches(units, &matches, &options.snippets),
        });
    }
    rank(results, options.limit)
}

/// Descending score, then descending match count, then ascending path.
fn rank(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(b.matches_count.cmp(&a.matches_count))
            .then_with(|| a.path.cmp(&b.path))
    });
    results.truncate(limit);
    results
}
