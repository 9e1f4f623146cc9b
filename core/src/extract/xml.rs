use super::{check_size, clamp_units, truncate_chars, ExtractProblem};
use roxmltree::{Document, Node, ParsingOptions};
use std::collections::HashMap;
use std::path::Path;

const MAX_XML_FILE_BYTES: u64 = 20 * 1024 * 1024;
const MAX_XML_DEPTH: usize = 32;
const MAX_XML_ATTRS_PER_NODE: usize = 64;
const MAX_XML_CHILDREN_PER_NODE: usize = 2_000;
const MAX_XML_TAILS_PER_NODE: usize = 64;
const MAX_XML_TAILS_TOTAL: usize = 10_000;
const MAX_XML_TAG_LEN: usize = 64;
const MAX_XML_UNITS: usize = 200_000;
const MAX_XML_UNIT_LEN: usize = 1_000;

pub(super) fn extract(path: &Path, case_sensitive: bool) -> Result<Vec<String>, ExtractProblem> {
    check_size(path, MAX_XML_FILE_BYTES)?;
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|e| ExtractProblem::Decode(e.to_string()))?;
    flatten_str(&text, case_sensitive)
}

pub(super) fn flatten_str(text: &str, case_sensitive: bool) -> Result<Vec<String>, ExtractProblem> {
    flatten_str_with_limit(text, case_sensitive, MAX_XML_UNITS)
}

fn flatten_str_with_limit(text: &str, case_sensitive: bool, max_units: usize) -> Result<Vec<String>, ExtractProblem> {
    let mut options = ParsingOptions::default();
    options.allow_dtd = true;
    let doc = Document::parse_with_options(text, options).map_err(|e| ExtractProblem::Parse(e.to_string()))?;

    let mut walk = Flattener {
        case_sensitive,
        remaining: max_units,
        tails_remaining: MAX_XML_TAILS_TOTAL,
        units: Vec::new(),
    };
    let root = doc.root_element();
    let path = walk.tag(root);
    walk.visit(root, &path, 0);
    Ok(clamp_units(walk.units, max_units, MAX_XML_UNIT_LEN))
}

/// Control characters become spaces and whitespace runs collapse.
fn clean_node_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

struct Flattener {
    case_sensitive: bool,
    remaining: usize,
    tails_remaining: usize,
    units: Vec<String>,
}

impl Flattener {
    fn visit(&mut self, node: Node<'_, '_>, path: &str, depth: usize) {
        if depth > MAX_XML_DEPTH {
            return;
        }

        if let Some(text) = node.text() {
            let text = clean_node_text(text);
            if !text.is_empty() {
                self.emit(format!("{path}: {text}"));
            }
        }

        let mut attrs: Vec<_> = node.attributes().collect();
        attrs.sort_by(|a, b| a.name().cmp(b.name()));
        for attr in attrs.into_iter().take(MAX_XML_ATTRS_PER_NODE) {
            let name = self.fold(truncate_chars(attr.name(), MAX_XML_TAG_LEN));
            let value = clean_node_text(attr.value());
            self.emit(format!("{path}@{name}: {value}"));
        }

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut tails = 0;
        for child in node.children().filter(|n| n.is_element()).take(MAX_XML_CHILDREN_PER_NODE) {
            if self.remaining == 0 {
                return;
            }
            let tag = self.tag(child);
            let occurrence = seen.entry(tag.clone()).or_insert(0);
            *occurrence += 1;
            let child_path = format!("{path}/{tag}[{occurrence}]");
            self.visit(child, &child_path, depth + 1);

            if tails < MAX_XML_TAILS_PER_NODE && self.tails_remaining > 0 {
                if let Some(tail) = child.tail() {
                    let tail = clean_node_text(tail);
                    if !tail.is_empty() {
                        self.emit(format!("{child_path}#tail: {tail}"));
                        tails += 1;
                        self.tails_remaining -= 1;
                    }
                }
            }
        }
    }

    /// Local tag name (namespace prefix stripped), truncated and folded.
    fn tag(&self, node: Node<'_, '_>) -> String {
        self.fold(truncate_chars(node.tag_name().name(), MAX_XML_TAG_LEN))
    }

    fn fold(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    fn emit(&mut self, unit: String) {
        if self.remaining == 0 {
            return;
        }
        self.units.push(unit);
        self.remaining -= 1;
    }
}
