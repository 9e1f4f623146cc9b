use crate::error::Result;
use crate::extract::truncate_chars;
use crate::tokenizer::{tokenize, TokenizerConfig};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

const BLOCK_SEPARATOR: &str = "----";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetOptions {
    /// Units of context before each match.
    pub before: usize,
    /// Units of context after each match.
    pub after: usize,
    /// Merged windows longer than this are split.
    pub max_block: usize,
    pub max_len: usize,
    pub max_snippets: usize,
}

impl Default for SnippetOptions {
    fn default() -> Self {
        Self { before: 1, after: 1, max_block: 8, max_len: 180, max_snippets: 25 }
    }
}

/// Unit predicate for each search mode, with the same case rules as the query.
#[derive(Debug, Clone)]
pub enum UnitMatcher {
    /// Unit tokenizes to at least one of the query tokens.
    Tokens { tokens: HashSet<String>, config: TokenizerConfig },
    /// Unit text contains at least one token as a substring.
    Contains { needles: Vec<String>, case_sensitive: bool },
    Exact { needle: String, case_sensitive: bool },
    Regex(Regex),
}

impl UnitMatcher {
    pub fn tokens(tokens: impl IntoIterator<Item = String>, config: TokenizerConfig) -> Self {
        UnitMatcher::Tokens { tokens: tokens.into_iter().collect(), config }
    }

    pub fn contains(tokens: &[String], case_sensitive: bool) -> Self {
        let needles = tokens.iter().map(|t| fold(t, case_sensitive).into_owned()).collect();
        UnitMatcher::Contains { needles, case_sensitive }
    }

    pub fn exact(text: &str, case_sensitive: bool) -> Self {
        UnitMatcher::Exact { needle: fold(text, case_sensitive).into_owned(), case_sensitive }
    }

    pub fn regex(pattern: &str, case_sensitive: bool) -> Result<Self> {
        let re = RegexBuilder::new(pattern).case_insensitive(!case_sensitive).build()?;
        Ok(UnitMatcher::Regex(re))
    }

    pub fn matches(&self, unit: &str) -> bool {
        match self {
            UnitMatcher::Tokens { tokens, config } => tokenize(unit, config).iter().any(|t| tokens.contains(t)),
            UnitMatcher::Contains { needles, case_sensitive } => {
                let hay = fold(unit, *case_sensitive);
                needles.iter().any(|n| hay.contains(n.as_str()))
            }
            UnitMatcher::Exact { needle, case_sensitive } => fold(unit, *case_sensitive).contains(needle.as_str()),
            UnitMatcher::Regex(re) => re.is_match(unit),
        }
    }
}

fn fold(text: &str, case_sensitive: bool) -> Cow<'_, str> {
    if case_sensitive {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.to_lowercase())
    }
}

/// Ascending indexes of the units accepted by `matcher`.
pub fn find_matching_unit_indexes(units: &[String], matcher: &UnitMatcher) -> Vec<usize> {
    units
        .iter()
        .enumerate()
        .filter(|(_, u)| matcher.matches(u))
        .map(|(i, _)| i)
        .collect()
}

/// Inclusive `(start, end)` windows around sorted match indexes. Overlapping or
/// adjacent windows merge; merged windows are split into `max_block`-sized pieces.
pub fn build_context_windows(
    match_indexes: &[usize],
    total_units: usize,
    before: usize,
    after: usize,
    max_block: usize,
) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for &m in match_indexes.iter().filter(|&&m| m < total_units) {
        let start = m.saturating_sub(before);
        let end = (m + after).min(total_units - 1);
        match merged.last_mut() {
            Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let block = max_block.max(1);
    let mut windows = Vec::with_capacity(merged.len());
    for (start, end) in merged {
        let mut cur = start;
        while cur <= end {
            let stop = (cur + block - 1).min(end);
            windows.push((cur, stop));
            cur = stop + 1;
        }
    }
    windows
}

/// Render units `start..=end` under a 1-based `Unit k` / `Units k-m` header.
/// A range starting past the last unit renders nothing.
pub fn format_block(units: &[String], start: usize, end: usize, max_len: usize) -> String {
    if start >= units.len() {
        return String::new();
    }
    let end = end.min(units.len() - 1);
    let mut out = if start >= end {
        format!("Unit {}\n", start + 1)
    } else {
        format!("Units {}-{}\n", start + 1, end + 1)
    };
    for unit in units.iter().take(end + 1).skip(start) {
        out.push_str(truncate_chars(unit, max_len).trim_end());
        out.push('\n');
    }
    out.push_str(BLOCK_SEPARATOR);
    out
}

/// Render context blocks for already located match indexes.
pub fn snippets_for_matches(units: &[String], match_indexes: &[usize], options: &SnippetOptions) -> Vec<String> {
    build_context_windows(match_indexes, units.len(), options.before, options.after, options.max_block)
        .into_iter()
        .take(options.max_snippets)
        .map(|(start, end)| format_block(units, start, end, options.max_len))
        .collect()
}

pub fn make_snippets(units: &[String], matcher: &UnitMatcher, options: &SnippetOptions) -> Vec<String> {
    let matches = find_matching_unit_indexes(units, matcher);
    snippets_for_matches(units, &matches, options)
}
