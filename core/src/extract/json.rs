use super::{check_size, clamp_units, clean_text, truncate_chars, ExtractProblem};
use serde_json::Value;
use std::path::Path;

const MAX_JSON_FILE_BYTES: u64 = 20 * 1024 * 1024;
const MAX_JSON_DEPTH: usize = 32;
const MAX_JSON_DICT_ITEMS: usize = 1_000;
const MAX_JSON_LIST_ITEMS: usize = 1_000;
const MAX_JSON_KEY_LEN: usize = 64;
const MAX_JSON_UNITS: usize = 200_000;
const MAX_JSON_UNIT_LEN: usize = 1_000;

pub(super) fn extract(path: &Path, case_sensitive: bool) -> Result<Vec<String>, ExtractProblem> {
    check_size(path, MAX_JSON_FILE_BYTES)?;
    let bytes = std::fs::read(path)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| ExtractProblem::Parse(e.to_string()))?;
    Ok(flatten(&value, case_sensitive))
}

pub(super) fn flatten(value: &Value, case_sensitive: bool) -> Vec<String> {
    flatten_with_limit(value, case_sensitive, MAX_JSON_UNITS)
}

fn flatten_with_limit(value: &Value, case_sensitive: bool, max_units: usize) -> Vec<String> {
    let mut walk = Flattener {
        case_sensitive,
        remaining: max_units,
        units: Vec::new(),
    };
    walk.visit(value, String::new(), 0);
    clamp_units(walk.units, max_units, MAX_JSON_UNIT_LEN)
}

struct Flattener {
    case_sensitive: bool,
    remaining: usize,
    units: Vec<String>,
}

impl Flattener {
    fn visit(&mut self, value: &Value, path: String, depth: usize) {
        if self.remaining == 0 || depth > MAX_JSON_DEPTH {
            return;
        }
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys.into_iter().take(MAX_JSON_DICT_ITEMS) {
                    if self.remaining == 0 {
                        return;
                    }
                    let child = join_key(&path, &self.key_segment(key));
                    self.visit(&map[key.as_str()], child, depth + 1);
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().take(MAX_JSON_LIST_ITEMS).enumerate() {
                    if self.remaining == 0 {
                        return;
                    }
                    self.visit(item, format!("{path}[{i}]"), depth + 1);
                }
            }
            leaf => self.emit(&path, &render_leaf(leaf)),
        }
    }

    fn key_segment(&self, key: &str) -> String {
        let key = truncate_chars(key, MAX_JSON_KEY_LEN);
        if self.case_sensitive {
            key.to_string()
        } else {
            key.to_lowercase()
        }
    }

    fn emit(&mut self, path: &str, value: &str) {
        let label = if path.is_empty() { "root" } else { path };
        self.units.push(format!("{label}: {value}"));
        self.remaining -= 1;
    }
}

fn join_key(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn render_leaf(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => clean_text(s),
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}
