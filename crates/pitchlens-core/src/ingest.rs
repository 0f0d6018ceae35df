// Typed row model and dataset loading.
//
// Upstream producers hand the engine rows that are already split into cells.
// This module defines that row shape and provides thin CSV/JSON adapters so
// the CLI and the tests can build rows from files.

use crate::config::DataPaths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A single loosely-typed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Bool(bool),
    Text(String),
    Empty,
}

/// One input row: column header -> cell.
pub type RawRow = BTreeMap<String, Cell>;

/// The three row collections that make up one data load.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub players: Vec<RawRow>,
    pub teams: Vec<RawRow>,
    pub shots: Vec<RawRow>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("JSON row error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Cell coercion
// ---------------------------------------------------------------------------

impl Cell {
    /// Infer a cell from raw CSV text. Plain numbers become `Number`,
    /// blank text becomes `Empty`, everything else stays `Text`.
    pub fn parse(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    /// Numeric view of the cell. Text such as `"1,250"` or `"45%"` is
    /// coerced; anything unparseable or non-finite is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if v.is_finite() => Some(*v),
            Cell::Text(s) => {
                let cleaned: String = s
                    .trim()
                    .trim_end_matches('%')
                    .chars()
                    .filter(|c| *c != ',' && *c != '_')
                    .collect();
                cleaned.trim().parse::<f64>().ok().filter(|v| v.is_finite())
            }
            _ => None,
        }
    }

    /// Text view of the cell, trimmed. Blank text is `None`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Cell::Number(v) => Some(if v.fract() == 0.0 && v.abs() < 1e15 {
                format!("{}", *v as i64)
            } else {
                v.to_string()
            }),
            Cell::Bool(b) => Some(b.to_string()),
            Cell::Empty => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(b) => Some(*b),
            Cell::Number(v) => Some(*v != 0.0),
            Cell::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "y" | "1" => Some(true),
                "no" | "false" | "n" | "0" => Some(false),
                _ => None,
            },
            Cell::Empty => None,
        }
    }
}

/// Case-insensitive column lookup trying each alias in order.
pub fn field<'a>(row: &'a RawRow, aliases: &[&str]) -> Option<&'a Cell> {
    for alias in aliases {
        if let Some(cell) = row.get(*alias) {
            return Some(cell);
        }
        if let Some((_, cell)) = row.iter().find(|(k, _)| k.trim().eq_ignore_ascii_case(alias)) {
            return Some(cell);
        }
    }
    None
}

/// Trimmed, non-blank text for the first alias present.
pub fn text_field(row: &RawRow, aliases: &[&str]) -> Option<String> {
    field(row, aliases).and_then(Cell::as_text)
}

/// Numeric value for the first alias present.
pub fn number_field(row: &RawRow, aliases: &[&str]) -> Option<f64> {
    field(row, aliases).and_then(Cell::as_f64)
}

// ---------------------------------------------------------------------------
// Reader-based loaders (enable testing without temp files)
// ---------------------------------------------------------------------------

/// Read a headed CSV stream into rows. Malformed records are skipped with a
/// warning rather than failing the whole file.
pub fn rows_from_reader<R: Read>(rdr: R) -> Result<Vec<RawRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let row: RawRow = headers
                    .iter()
                    .zip(record.iter())
                    .filter(|(h, _)| !h.is_empty())
                    .map(|(h, v)| (h.clone(), Cell::parse(v)))
                    .collect();
                rows.push(row);
            }
            Err(e) => {
                warn!("skipping malformed CSV record {}: {}", line + 1, e);
            }
        }
    }
    Ok(rows)
}

/// Parse a JSON array of objects into rows.
pub fn rows_from_json(text: &str) -> Result<Vec<RawRow>, IngestError> {
    Ok(serde_json::from_str(text)?)
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

/// Load rows from a CSV file, or a JSON array when the extension is `.json`.
pub fn load_rows(path: &Path) -> Result<Vec<RawRow>, IngestError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let text = std::fs::read_to_string(path).map_err(|e| IngestError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        return rows_from_json(&text);
    }

    let file = std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    rows_from_reader(file).map_err(|e| IngestError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load the player, team and shot files named in the config. Team and shot
/// files are optional; the player file must yield at least one row.
pub fn load_dataset(paths: &DataPaths) -> Result<Dataset, IngestError> {
    let players = load_rows(Path::new(&paths.players))?;
    if players.is_empty() {
        return Err(IngestError::Validation(format!(
            "player file {} produced zero rows",
            paths.players
        )));
    }

    let teams = match &paths.teams {
        Some(p) => load_rows(Path::new(p))?,
        None => Vec::new(),
    };
    let shots = match &paths.shots {
        Some(p) => load_rows(Path::new(p))?,
        None => Vec::new(),
    };

    info!(
        "Read {} player rows, {} team rows, {} shot rows",
        players.len(),
        teams.len(),
        shots.len()
    );

    Ok(Dataset {
        players,
        teams,
        shots,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_infers_numbers_and_blanks() {
        assert_eq!(Cell::parse(" 12.5 "), Cell::Number(12.5));
        assert_eq!(Cell::parse(""), Cell::Empty);
        assert_eq!(Cell::parse("  "), Cell::Empty);
        assert_eq!(Cell::parse("Man City"), Cell::Text("Man City".into()));
    }

    #[test]
    fn as_f64_coerces_formatted_text() {
        assert_eq!(Cell::Text("1,250".into()).as_f64(), Some(1250.0));
        assert_eq!(Cell::Text("45%".into()).as_f64(), Some(45.0));
        assert_eq!(Cell::Text("n/a".into()).as_f64(), None);
        assert_eq!(Cell::Number(f64::NAN).as_f64(), None);
        assert_eq!(Cell::Empty.as_f64(), None);
    }

    #[test]
    fn as_text_formats_whole_numbers_without_fraction() {
        assert_eq!(Cell::Number(2024.0).as_text().as_deref(), Some("2024"));
        assert_eq!(Cell::Text("  ".into()).as_text(), None);
    }

    #[test]
    fn as_bool_understands_yes_no() {
        assert_eq!(Cell::Text("yes".into()).as_bool(), Some(true));
        assert_eq!(Cell::Text("No".into()).as_bool(), Some(false));
        assert_eq!(Cell::Text("maybe".into()).as_bool(), None);
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let mut row = RawRow::new();
        row.insert("Minutes played".into(), Cell::Number(900.0));
        assert_eq!(number_field(&row, &["minutes played"]), Some(900.0));
        assert_eq!(number_field(&row, &["Minutes"]), None);
    }

    #[test]
    fn csv_rows_keep_headers_and_types() {
        let csv = "Player,Team,Goals per 90\nJohn Smith,Alpha FC,0.45\nJane Doe,,\n";
        let rows = rows_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Player"), Some(&Cell::Text("John Smith".into())));
        assert_eq!(rows[0].get("Goals per 90"), Some(&Cell::Number(0.45)));
        assert_eq!(rows[1].get("Team"), Some(&Cell::Empty));
    }

    #[test]
    fn json_rows_deserialize_untagged_cells() {
        let rows = rows_from_json(r#"[{"player": "A", "xG": 0.3, "on_loan": true, "x": null}]"#).unwrap();
        assert_eq!(rows[0].get("xG"), Some(&Cell::Number(0.3)));
        assert_eq!(rows[0].get("on_loan"), Some(&Cell::Bool(true)));
        assert_eq!(rows[0].get("x"), Some(&Cell::Empty));
    }
}
