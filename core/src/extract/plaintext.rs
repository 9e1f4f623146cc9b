use super::{check_size, clamp_units, truncate_chars, ExtractProblem};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const MAX_TEXT_FILE_BYTES: u64 = 20 * 1024 * 1024;
const MAX_TEXT_UNITS: usize = 200_000;
const MAX_TEXT_UNIT_LEN: usize = 1_000;

/// One unit per non-empty line. Invalid UTF-8 is replaced rather than rejected.
pub(super) fn extract(path: &Path) -> Result<Vec<String>, ExtractProblem> {
    check_size(path, MAX_TEXT_FILE_BYTES)?;
    let mut reader = BufReader::new(File::open(path)?);
    let mut units = Vec::new();
    let mut buf = Vec::new();
    while units.len() < MAX_TEXT_UNITS {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches('\n').trim_end();
        if line.is_empty() {
            continue;
        }
        units.push(truncate_chars(line, MAX_TEXT_UNIT_LEN).to_string());
    }
    Ok(clamp_units(units, MAX_TEXT_UNITS, MAX_TEXT_UNIT_LEN))
}
