use labelwise_core::text::{guess_merchant_name, normalize_description};
use labelwise_core::{parse_amount, parse_date, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::classify::{classify_columns, ColumnMapping, ColumnType, SemanticField};
use crate::csv::RawTable;
use crate::validate::{validate, ValidationReport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOptions {
    /// Replaces the inferred mapping entirely when set.
    pub column_mapping: Option<ColumnMapping>,
    pub normalize_text: bool,
    pub extract_merchants: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            column_mapping: None,
            normalize_text: true,
            extract_merchants: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub file_id: String,
    pub total_rows: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub columns_detected: BTreeMap<String, ColumnType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedBatch {
    pub mapping: ColumnMapping,
    pub column_types: BTreeMap<String, ColumnType>,
    pub report: ValidationReport,
    pub records: Vec<Record>,
    pub summary: ProcessingSummary,
}

/// Classifies, validates and ingests a whole table.
///
/// Rows with unparseable cells come back as invalid records; only the
/// affected record is marked, the rest of the batch is processed as usual.
pub fn process(table: &RawTable, file_id: &str, options: &ProcessingOptions) -> ProcessedBatch {
    let classification = classify_columns(table);

    let (mapping, report) = match &options.column_mapping {
        Some(mapping) => {
            let report = validate(table, mapping, &classification.column_types);
            (mapping.clone(), report)
        }
        None => (classification.mapping, classification.report),
    };

    let records = ingest_records(table, &mapping, file_id, options);
    let valid_records = records.iter().filter(|r| r.is_valid).count();
    let summary = ProcessingSummary {
        file_id: file_id.to_string(),
        total_rows: table.row_count(),
        valid_records,
        invalid_records: records.len() - valid_records,
        columns_detected: classification.column_types.clone(),
    };

    info!(
        file_id,
        total = summary.total_rows,
        valid = summary.valid_records,
        invalid = summary.invalid_records,
        "processed batch"
    );

    ProcessedBatch {
        mapping,
        column_types: classification.column_types,
        report,
        records,
        summary,
    }
}

/// Turns each table row into a [`Record`] using `mapping`.
pub fn ingest_records(
    table: &RawTable,
    mapping: &ColumnMapping,
    file_id: &str,
    options: &ProcessingOptions,
) -> Vec<Record> {
    let col = |field| mapping.index_in(field, table);
    let date_col = col(SemanticField::Date);
    let description_col = col(SemanticField::Description);
    let amount_col = col(SemanticField::Amount);
    let balance_col = col(SemanticField::Balance);
    let category_col = col(SemanticField::Category);
    let account_col = col(SemanticField::Account);
    let reference_col = col(SemanticField::Reference);

    let cell = |row: usize, column: Option<usize>| column.and_then(|c| table.cell(row, c));

    (0..table.row_count())
        .map(|row| {
            let row_number = row + 2;
            let mut record = Record::new(format!("{file_id}_row_{row_number}"), row_number);

            record.description = cell(row, description_col).unwrap_or_default().to_string();
            record.category = cell(row, category_col).map(str::to_string);
            record.account = cell(row, account_col).map(str::to_string);
            record.reference = cell(row, reference_col).map(str::to_string);

            if let Some(raw) = cell(row, date_col) {
                match parse_date(raw) {
                    Ok(date) => record.date = Some(date),
                    Err(e) => record.invalidate(e.to_string()),
                }
            }

            match cell(row, amount_col) {
                Some(raw) => match parse_amount(raw) {
                    Ok(amount) => record.amount = Some(amount),
                    Err(e) => record.invalidate(e.to_string()),
                },
                None => record.invalidate("Missing amount"),
            }

            if let Some(raw) = cell(row, balance_col) {
                match parse_amount(raw) {
                    Ok(balance) => record.balance = Some(balance),
                    Err(e) => record.invalidate(e.to_string()),
                }
            }

            if options.normalize_text && !record.description.is_empty() {
                record.normalized_description = Some(normalize_description(&record.description));
            }
            if options.extract_merchants {
                record.merchant_name = guess_merchant_name(&record.description);
            }

            record
        })
        .collect()
}
