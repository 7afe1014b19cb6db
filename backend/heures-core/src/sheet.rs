// src/sheet.rs
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{import_io_context, ImportError};

pub const DEFAULT_PREVIEW_ROWS: usize = 5;

static PLAIN_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid number pattern"));

// --- Cell values ---

/// A raw spreadsheet cell as handed over by a reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Number(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn text(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// String form of the cell, trimmed. Numbers drop a trailing `.0`.
    pub fn as_trimmed_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

// --- Rows ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetRow {
    /// 1-based position among the data rows (header excluded).
    pub number: usize,
    pub cells: HashMap<String, CellValue>,
}

impl SheetRow {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            cells: HashMap::new(),
        }
    }

    pub fn with(mut self, header: &str, value: CellValue) -> Self {
        self.cells.insert(header.to_string(), value);
        self
    }

    /// Cell under `header`, or `None` when the column is absent or blank.
    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells.get(header).filter(|cell| !cell.is_blank())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetPreview {
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

/// Headers of the sheet plus its first `max` rows.
pub fn preview(headers: Vec<String>, rows: &[SheetRow], max: usize) -> SheetPreview {
    SheetPreview {
        headers,
        rows: rows.iter().take(max).cloned().collect(),
    }
}

// --- Readers ---

/// Reads the first sheet of a workbook into ordered rows keyed by header.
pub trait SheetReader: Send + Sync {
    fn read_first_sheet(&self, path: &Path) -> Result<Sheet, ImportError>;
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

/// Delimited-text reader. Strictly numeric cells become numbers, blank
/// cells are empty and everything else stays text.
#[derive(Debug, Clone)]
pub struct CsvSheetReader {
    delimiter: u8,
}

impl Default for CsvSheetReader {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvSheetReader {
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    pub fn read_from<R: std::io::Read>(&self, input: R) -> Result<Sheet, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(input);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let mut row = SheetRow::new(index + 1);
            for (header, raw) in headers.iter().zip(record.iter()) {
                row.cells.insert(header.clone(), infer_cell(raw));
            }
            // Short records still expose every header.
            for header in headers.iter().skip(record.len()) {
                row.cells.insert(header.clone(), CellValue::Empty);
            }
            rows.push(row);
        }
        debug!("Read {} data rows under {} headers", rows.len(), headers.len());
        Ok(Sheet { headers, rows })
    }
}

impl SheetReader for CsvSheetReader {
    fn read_first_sheet(&self, path: &Path) -> Result<Sheet, ImportError> {
        info!("Reading sheet from {}", path.display());
        let file = File::open(path)
            .map_err(|e| import_io_context(e, format!("Failed to open {}", path.display())))?;
        self.read_from(file)
    }
}

fn infer_cell(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    if PLAIN_NUMBER.is_match(trimmed) {
        if let Ok(n) = trimmed.parse::<f64>() {
            return CellValue::Number(n);
        }
    }
    CellValue::Text(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_cells_are_typed() {
        let data = "Enseignant,Durée,Date,Heure début\nDupont,2.5,15/03/2024,08:00\nMartin,,2024-03-16,0.375\n";
        let sheet = CsvSheetReader::default().read_from(data.as_bytes()).unwrap();

        assert_eq!(sheet.headers, vec!["Enseignant", "Durée", "Date", "Heure début"]);
        assert_eq!(sheet.rows.len(), 2);

        let first = &sheet.rows[0];
        assert_eq!(first.number, 1);
        assert_eq!(first.get("Enseignant"), Some(&CellValue::text("Dupont")));
        assert_eq!(first.get("Durée"), Some(&CellValue::Number(2.5)));
        assert_eq!(first.get("Date"), Some(&CellValue::text("15/03/2024")));

        let second = &sheet.rows[1];
        assert_eq!(second.number, 2);
        assert_eq!(second.get("Durée"), None);
        assert_eq!(second.get("Heure début"), Some(&CellValue::Number(0.375)));
    }

    #[test]
    fn comma_decimals_stay_text() {
        let data = "Volume;Nom\n24,5;Rakoto\n";
        let sheet = CsvSheetReader::with_delimiter(b';')
            .read_from(data.as_bytes())
            .unwrap();
        assert_eq!(sheet.rows[0].get("Volume"), Some(&CellValue::text("24,5")));
    }

    #[test]
    fn short_records_fill_missing_cells() {
        let data = "A,B,C\n1\n";
        let sheet = CsvSheetReader::default().read_from(data.as_bytes()).unwrap();
        assert_eq!(sheet.rows[0].cells.get("C"), Some(&CellValue::Empty));
    }

    #[test]
    fn preview_caps_rows() {
        let rows: Vec<SheetRow> = (1..=8).map(SheetRow::new).collect();
        let p = preview(vec!["A".into()], &rows, DEFAULT_PREVIEW_ROWS);
        assert_eq!(p.rows.len(), 5);
        assert_eq!(p.rows[4].number, 5);
    }

    #[test]
    fn number_strings_drop_integral_fraction() {
        assert_eq!(CellValue::Number(24.0).as_trimmed_string(), "24");
        assert_eq!(CellValue::Number(2.5).as_trimmed_string(), "2.5");
    }
}
