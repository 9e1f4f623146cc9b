use super::{check_size, clamp_units, ExtractProblem};
use std::path::Path;

const MAX_CSV_FILE_BYTES: u64 = 20 * 1024 * 1024;
const CSV_SAMPLE_ROWS: usize = 20;
const MAX_CSV_HEADER_LENGTH: usize = 50;
const MAX_CSV_UNITS: usize = 200_000;
const MAX_CSV_UNIT_LEN: usize = 2_000;

pub(super) fn extract(path: &Path, case_sensitive: bool) -> Result<Vec<String>, ExtractProblem> {
    check_size(path, MAX_CSV_FILE_BYTES)?;
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|e| ExtractProblem::Decode(e.to_string()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let sample = read_rows(text, Some(CSV_SAMPLE_ROWS))?;
    let has_header = detect_csv_has_header(&sample);
    let rows = read_rows(text, None)?;

    let mut rows = rows.into_iter();
    let headers: Vec<String> = if has_header {
        match rows.next() {
            Some(h) => h
                .into_iter()
                .map(|cell| if case_sensitive { cell } else { cell.to_lowercase() })
                .collect(),
            None => return Ok(Vec::new()),
        }
    } else {
        Vec::new()
    };
    let values: Vec<Vec<String>> = rows.collect();
    if values.is_empty() {
        return Ok(Vec::new());
    }
    let headers = if has_header {
        headers
    } else {
        let width = values.iter().map(Vec::len).max().unwrap_or(0);
        (1..=width).map(|i| format!("col{i}")).collect()
    };

    let units = values
        .iter()
        .take(MAX_CSV_UNITS)
        .map(|row| format_csv_row(&headers, row))
        .collect();
    Ok(clamp_units(units, MAX_CSV_UNITS, MAX_CSV_UNIT_LEN))
}

fn read_rows(text: &str, limit: Option<usize>) -> Result<Vec<Vec<String>>, ExtractProblem> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        if limit.is_some_and(|l| rows.len() >= l) {
            break;
        }
        let record = record.map_err(|e| ExtractProblem::Parse(e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// `"1"`, `"2.5"` and `"1,5"` are numeric; empty strings are not.
fn is_number(s: &str) -> bool {
    let digits_only = |t: String| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit());
    digits_only(s.replacen('.', "", 1)) || digits_only(s.replacen(',', "", 1))
}

/// Decide whether the first sampled row is a header.
///
/// The checks run in a fixed order: too few rows, duplicate or empty/overlong
/// header cells, a numeric value under a non-numeric label, identical first and
/// second rows. Anything left over is treated as a header.
pub fn detect_csv_has_header(sample: &[Vec<String>]) -> bool {
    if sample.len() < 2 {
        return false;
    }
    let (first, second) = (&sample[0], &sample[1]);

    let distinct: std::collections::HashSet<&String> = first.iter().collect();
    if distinct.len() != first.len() {
        return false;
    }
    if first.iter().any(|cell| {
        let len = cell.trim().chars().count();
        len == 0 || len > MAX_CSV_HEADER_LENGTH
    }) {
        return false;
    }
    if first.iter().zip(second).any(|(h, v)| is_number(v) && !is_number(h)) {
        return true;
    }
    if first == second {
        return false;
    }
    true
}

/// Render a row as `header: value | header: value`. Columns beyond the header
/// fall back to `colN`; missing values render empty.
pub fn format_csv_row(headers: &[String], row: &[String]) -> String {
    let width = headers.len().max(row.len());
    (0..width)
        .map(|i| {
            let header = headers.get(i).map(|h| h.trim().to_string()).unwrap_or_else(|| format!("col{}", i + 1));
            let value = row.get(i).map(|v| v.trim()).unwrap_or("");
            format!("{header}: {value}")
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
    }

    #[test]
    fn header_detected_from_numeric_column() {
        let sample = rows(&[&["name", "age"], &["Alice", "30"], &["Bob", "25"]]);
        assert!(detect_csv_has_header(&sample));
    }

    #[test]
    fn header_rejected_cases() {
        assert!(!detect_csv_has_header(&rows(&[&["name", "age"]])));
        assert!(!detect_csv_has_header(&rows(&[&["a", "a"], &["1", "2"]])));
        assert!(!detect_csv_has_header(&rows(&[&["a", ""], &["1", "2"]])));
        assert!(!detect_csv_has_header(&rows(&[&["x", "y"], &["x", "y"]])));
    }

    #[test]
    fn all_text_rows_default_to_header() {
        assert!(detect_csv_has_header(&rows(&[&["city", "country"], &["Paris", "France"]])));
    }

    #[test]
    fn row_formatting() {
        let headers = vec!["name".to_string(), "age".to_string()];
        assert_eq!(format_csv_row(&headers, &["Alice".into(), "30".into()]), "name: Alice | age: 30");
        assert_eq!(format_csv_row(&headers, &["Bob".into()]), "name: Bob | age: ");
        assert_eq!(
            format_csv_row(&headers, &["Eve".into(), "41".into(), "x".into()]),
            "name: Eve | age: 41 | col3: x"
        );
    }

    #[test]
    fn headerless_file_uses_synthetic_columns() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "x,x\n3,4,5\n").unwrap();
        let units = extract(f.path(), false).unwrap();
        // trailing empty value is trimmed by the clamp stage
        assert_eq!(units, vec!["col1: x | col2: x | col3:", "col1: 3 | col2: 4 | col3: 5"]);
    }

    #[test]
    fn headers_fold_unless_case_sensitive() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "\u{feff}Name,Age\nAlice,30\n").unwrap();
        assert_eq!(extract(f.path(), false).unwrap(), vec!["name: Alice | age: 30"]);
        assert_eq!(extract(f.path(), true).unwrap(), vec!["Name: Alice | Age: 30"]);
    }
}
