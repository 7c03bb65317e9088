use encoding_rs::WINDOWS_1252;
use labelwise_core::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use thiserror::Error;

use crate::classify::SemanticField;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingRequiredColumn(SemanticField),
    #[error("Header row is empty")]
    EmptyHeader,
    #[error("No data rows")]
    NoDataRows,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvReadOptions {
    pub has_header: bool,
    pub delimiter: String,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: ",".to_string(),
        }
    }
}

/// Untyped rows as they came out of the spreadsheet, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Builds a table from string-keyed rows; `columns` fixes the order.
    pub fn from_maps(columns: Vec<String>, rows: &[HashMap<String, String>]) -> Self {
        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Self::new(columns, rows)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell contents, `None` for blank cells.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn column_values(&self, column: usize) -> Vec<Option<&str>> {
        (0..self.rows.len()).map(|row| self.cell(row, column)).collect()
    }
}

/// Reads delimited text into a [`RawTable`]. Cells that are not valid UTF-8
/// are decoded as Windows-1252 rather than rejected.
pub fn read_table<R: Read>(data: R, options: &CsvReadOptions) -> Result<RawTable, ImportError> {
    let delimiter = options
        .delimiter
        .as_bytes()
        .first()
        .copied()
        .unwrap_or(b',');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(data);

    let mut records = reader.byte_records();
    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    if options.has_header {
        match records.next() {
            Some(header) => {
                columns = decode(&header?).into_iter().map(|c| c.trim().to_string()).collect();
            }
            None => return Err(ImportError::EmptyHeader),
        }
        if columns.iter().all(|c| c.is_empty()) {
            return Err(ImportError::EmptyHeader);
        }
    }

    for result in records {
        let row = decode(&result?);
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        rows.push(row);
    }

    if !options.has_header {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        columns = (1..=width).map(|i| format!("column_{i}")).collect();
    }

    if rows.is_empty() {
        return Err(ImportError::NoDataRows);
    }

    Ok(RawTable::new(columns, rows))
}

/// UTF-8 cells pass through; anything else is read as Windows-1252, which
/// covers Latin-1 bank exports.
fn decode(record: &csv::ByteRecord) -> Vec<String> {
    record.iter().map(decode_field).collect()
}

fn decode_field(field: &[u8]) -> String {
    match std::str::from_utf8(field) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(field).0.into_owned(),
    }
}

const EXPORT_COLUMNS: [&str; 8] = [
    "date",
    "description",
    "amount",
    "balance",
    "category",
    "account",
    "reference",
    "label_id",
];

/// Writes records back out as CSV, including any applied labels.
/// Returns the number of data rows written.
pub fn export_records<W: Write>(records: &[Record], out: W) -> Result<usize, ImportError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(EXPORT_COLUMNS)?;

    for record in records {
        writer.write_record([
            record.date.map(|d| d.to_string()).unwrap_or_default(),
            record.description.clone(),
            record.amount.map(|a| a.to_string()).unwrap_or_default(),
            record.balance.map(|b| b.to_string()).unwrap_or_default(),
            record.category.clone().unwrap_or_default(),
            record.account.clone().unwrap_or_default(),
            record.reference.clone().unwrap_or_default(),
            record.label_id.clone().unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(records.len())
}
