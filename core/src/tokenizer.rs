use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\p{L}\p{N}\s]+").expect("valid regex");
    static ref DIGITS: Regex = Regex::new(r"\p{N}+").expect("valid regex");
    static ref ENGLISH_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopwordsMode {
    #[default]
    None,
    English,
    Custom,
}

/// Tokenizer settings shared by indexing and querying. Persisted in `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub min_length: usize,
    pub stopwords_mode: StopwordsMode,
    /// Only consulted when `stopwords_mode` is `custom`. Entries are compared casefolded.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stopwords: Vec<String>,
    pub keep_numbers: bool,
    pub case_sensitive: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_length: 2,
            stopwords_mode: StopwordsMode::None,
            stopwords: Vec::new(),
            keep_numbers: true,
            case_sensitive: false,
        }
    }
}

impl TokenizerConfig {
    /// Same settings with the case flag replaced; queries pick their own case mode.
    pub fn with_case_sensitive(&self, case_sensitive: bool) -> Self {
        Self { case_sensitive, ..self.clone() }
    }

    fn is_stopword(&self, token: &str) -> bool {
        match self.stopwords_mode {
            StopwordsMode::None => false,
            StopwordsMode::English => ENGLISH_STOPWORDS.contains(token.to_lowercase().as_str()),
            StopwordsMode::Custom => {
                let folded = token.to_lowercase();
                self.stopwords.iter().any(|s| s.to_lowercase() == folded)
            }
        }
    }
}

/// NFKC-normalize, blank out punctuation (and digits unless kept), lowercase unless case-sensitive.
///
/// Folding is `str::to_lowercase`, not full Unicode case folding: `ß` stays
/// `ß` rather than expanding to `ss`. Index keys and queries go through the
/// same step, so they still agree.
pub fn normalize_text(text: &str, config: &TokenizerConfig) -> String {
    let nfkc = text.nfkc().collect::<String>();
    let mut normalized = NON_WORD.replace_all(&nfkc, " ").into_owned();
    if !config.keep_numbers {
        normalized = DIGITS.replace_all(&normalized, " ").into_owned();
    }
    if config.case_sensitive {
        normalized
    } else {
        normalized.to_lowercase()
    }
}

/// Tokenize one unit (or a query) into ordered tokens. Repeated words are kept.
pub fn tokenize(text: &str, config: &TokenizerConfig) -> Vec<String> {
    normalize_text(text, config)
        .split_whitespace()
        .filter(|tok| tok.chars().count() >= config.min_length)
        .filter(|tok| !config.is_stopword(tok))
        .map(str::to_string)
        .collect()
}
