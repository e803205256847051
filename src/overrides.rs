use crate::model::{OverrideEntry, normalize_name};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Parsha name (normalized) -> page/verse overrides.
pub type OverrideTable = BTreeMap<String, OverrideEntry>;

const COL_PARSHA: &str = "Parsha";
const COL_TORAH_PAGE: &str = "Torah Page";
const COL_HAFTARAH_PAGE: &str = "Haftarah Page";
const COL_HAFTARAH_VERSES: &str = "Haftarah verses";
// Older CSVs used this spelling.
const COL_HAFTARAH_VERSES_LEGACY: &str = "Haftara verses";

/// Load the override CSV. `None` path means no overrides were supplied and
/// the merge stage falls back to API values everywhere.
///
/// Malformed rows are skipped with a warning. Duplicate parsha names keep
/// the later row, so appended corrections win.
pub fn load(path: Option<&Path>) -> Result<OverrideTable> {
    let Some(path) = path else {
        return Ok(OverrideTable::new());
    };
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening page-number CSV {}", path.display()))?;

    let headers = reader.headers().context("reading CSV header row")?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);

    let parsha_idx = col(COL_PARSHA)
        .with_context(|| format!("CSV is missing required column '{}'", COL_PARSHA))?;
    let torah_idx = col(COL_TORAH_PAGE);
    let haft_page_idx = col(COL_HAFTARAH_PAGE);
    let haft_verses_idx = col(COL_HAFTARAH_VERSES).or_else(|| col(COL_HAFTARAH_VERSES_LEGACY));

    let mut table = OverrideTable::new();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping malformed CSV row {}: {}", line + 2, e);
                continue;
            }
        };
        let Some(name) = record.get(parsha_idx).map(str::trim).filter(|s| !s.is_empty())
        else {
            warn!("skipping CSV row {}: empty parsha name", line + 2);
            continue;
        };

        let entry = OverrideEntry {
            torah_page: parse_page(&record, torah_idx, name, COL_TORAH_PAGE),
            haftarah_page: parse_page(&record, haft_page_idx, name, COL_HAFTARAH_PAGE),
            haftarah_verses: haft_verses_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        };

        // Last write wins on duplicate names.
        if table.insert(normalize_name(name), entry).is_some() {
            debug!("duplicate override row for '{}', keeping the later one", name);
        }
    }

    debug!("loaded {} override entries from {}", table.len(), path.display());
    Ok(table)
}

fn parse_page(
    record: &csv::StringRecord,
    idx: Option<usize>,
    name: &str,
    column: &str,
) -> Option<u32> {
    let raw = idx.and_then(|i| record.get(i)).map(str::trim)?;
    if raw.is_empty() {
        return None;
    }
    // Some exports write pages as floats ("36.0").
    match raw.parse::<f64>() {
        Ok(n) if n >= 0.0 => Some(n as u32),
        _ => {
            warn!("ignoring non-numeric {} '{}' for '{}'", column, raw, name);
            None
        }
    }
}
