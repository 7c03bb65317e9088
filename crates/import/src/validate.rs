use labelwise_core::{parse_amount, parse_date};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;

use crate::classify::{ColumnMapping, ColumnType, SemanticField};
use crate::csv::{ImportError, RawTable};

const NULL_WARNING_PERCENT: f64 = 50.0;
const DUPLICATE_WARNING_PERCENT: f64 = 30.0;
const MIN_DATA_ROWS: usize = 2;
/// Data rows start on spreadsheet row 2, after the header.
const FIRST_DATA_ROW: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingColumn,
    InsufficientData,
    InvalidDate,
    InvalidAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// 1-based spreadsheet row, 0 for table-level problems.
    pub row: usize,
    pub column: Option<String>,
    pub value: Option<String>,
    pub kind: IssueKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnQuality {
    pub total_values: usize,
    pub null_count: usize,
    pub null_percentage: f64,
    pub duplicate_count: usize,
    pub duplicate_percentage: f64,
    pub unique_values: usize,
    pub data_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
    pub column_info: BTreeMap<String, ColumnQuality>,
}

impl ValidationReport {
    pub fn error_rate(&self) -> f64 {
        percent(self.invalid_rows, self.total_rows)
    }

    pub fn success_rate(&self) -> f64 {
        percent(self.valid_rows, self.total_rows)
    }

    /// Turns a missing description or amount mapping into a hard error for
    /// callers that cannot proceed without one.
    pub fn ensure_required_columns(&self, mapping: &ColumnMapping) -> Result<(), ImportError> {
        let missing = self
            .errors
            .iter()
            .any(|e| e.kind == IssueKind::MissingColumn);
        if !missing {
            return Ok(());
        }
        let field = SemanticField::REQUIRED
            .into_iter()
            .find(|f| mapping.get(*f).is_none())
            .unwrap_or(SemanticField::Description);
        Err(ImportError::MissingRequiredColumn(field))
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub fn column_quality(values: &[Option<&str>], data_type: ColumnType) -> ColumnQuality {
    let total_values = values.len();
    let null_count = values.iter().filter(|v| v.is_none()).count();

    let mut seen = HashSet::new();
    let duplicate_count = values.iter().filter(|v| !seen.insert(**v)).count();
    let unique_values = values.iter().flatten().collect::<HashSet<_>>().len();

    ColumnQuality {
        total_values,
        null_count,
        null_percentage: percent(null_count, total_values),
        duplicate_count,
        duplicate_percentage: percent(duplicate_count, total_values),
        unique_values,
        data_type,
    }
}

/// Checks required columns, per-column quality and the parseability of the
/// mapped date and amount columns. Never fails; everything found is reported.
pub fn validate(
    table: &RawTable,
    mapping: &ColumnMapping,
    column_types: &BTreeMap<String, ColumnType>,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut column_info = BTreeMap::new();
    let total_rows = table.row_count();

    for field in SemanticField::REQUIRED {
        if mapping.index_in(field, table).is_none() {
            errors.push(ValidationIssue {
                row: 0,
                column: None,
                value: None,
                kind: IssueKind::MissingColumn,
                message: format!("Required column '{field}' not found or not mapped"),
            });
        }
    }

    for (idx, name) in table.columns.iter().enumerate() {
        let data_type = column_types.get(name).copied().unwrap_or(ColumnType::Unknown);
        let quality = column_quality(&table.column_values(idx), data_type);

        if quality.null_percentage > NULL_WARNING_PERCENT {
            warnings.push(format!(
                "Column '{name}' has {:.1}% missing values",
                quality.null_percentage
            ));
        }
        if quality.duplicate_percentage > DUPLICATE_WARNING_PERCENT {
            warnings.push(format!(
                "Column '{name}' has {:.1}% duplicate values",
                quality.duplicate_percentage
            ));
        }
        column_info.insert(name.clone(), quality);
    }

    if total_rows < MIN_DATA_ROWS {
        errors.push(ValidationIssue {
            row: 0,
            column: None,
            value: Some(total_rows.to_string()),
            kind: IssueKind::InsufficientData,
            message: "CSV must contain at least 2 rows (header + data)".to_string(),
        });
    }

    if let Some(idx) = mapping.index_in(SemanticField::Date, table) {
        errors.extend(cell_errors(table, idx, IssueKind::InvalidDate, |v| {
            parse_date(v).is_ok()
        }));
    }
    if let Some(idx) = mapping.index_in(SemanticField::Amount, table) {
        errors.extend(cell_errors(table, idx, IssueKind::InvalidAmount, |v| {
            parse_amount(v).is_ok()
        }));
    }

    for w in &warnings {
        warn!("{w}");
    }

    let invalid_rows = errors
        .iter()
        .filter(|e| e.row > 0)
        .map(|e| e.row)
        .collect::<BTreeSet<_>>()
        .len();

    ValidationReport {
        is_valid: errors.is_empty(),
        total_rows,
        valid_rows: total_rows.saturating_sub(invalid_rows),
        invalid_rows,
        errors,
        warnings,
        column_info,
    }
}

fn cell_errors(
    table: &RawTable,
    column: usize,
    kind: IssueKind,
    parses: impl Fn(&str) -> bool,
) -> Vec<ValidationIssue> {
    let name = &table.columns[column];
    let what = match kind {
        IssueKind::InvalidDate => "date",
        _ => "amount",
    };
    table
        .column_values(column)
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| {
            let value = value?;
            if parses(value) {
                return None;
            }
            Some(ValidationIssue {
                row: i + FIRST_DATA_ROW,
                column: Some(name.clone()),
                value: Some(value.to_string()),
                kind,
                message: format!("Could not parse {what}: {value}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{detect_column_types, identify_columns};

    fn table(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn run(t: &RawTable) -> ValidationReport {
        validate(t, &identify_columns(t), &detect_column_types(t))
    }

    #[test]
    fn clean_table_is_valid() {
        let t = table(
            &["Date", "Description", "Amount"],
            &[&["2024-01-15", "A", "1.00"], &["2024-01-16", "B", "2.00"]],
        );
        let report = run(&t);
        assert!(report.is_valid);
        assert_eq!(report.valid_rows, 2);
        assert_eq!(report.invalid_rows, 0);
        assert_eq!(report.success_rate(), 100.0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_amount_column_is_reported_not_raised() {
        let t = table(&["Description"], &[&["A"], &["B"]]);
        let report = run(&t);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, IssueKind::MissingColumn);
        assert_eq!(report.errors[0].row, 0);
        assert!(report.errors[0].message.contains("amount"));
    }

    #[test]
    fn ensure_required_columns_names_missing_field() {
        let t = table(&["Description"], &[&["A"], &["B"]]);
        let mapping = identify_columns(&t);
        let report = validate(&t, &mapping, &detect_column_types(&t));
        let err = report.ensure_required_columns(&mapping).unwrap_err();
        assert!(matches!(
            err,
            ImportError::MissingRequiredColumn(SemanticField::Amount)
        ));
    }

    #[test]
    fn bad_dates_reported_with_spreadsheet_row_numbers() {
        let t = table(
            &["Date", "Description", "Amount"],
            &[
                &["2024-01-15", "A", "1.00"],
                &["garbage", "B", "2.00"],
                &["2024-01-17", "C", "3.00"],
            ],
        );
        let report = run(&t);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, IssueKind::InvalidDate);
        assert_eq!(report.errors[0].row, 3);
        assert_eq!(report.errors[0].column.as_deref(), Some("Date"));
        assert_eq!(report.invalid_rows, 1);
        assert_eq!(report.valid_rows, 2);
    }

    #[test]
    fn bad_amounts_reported() {
        let t = table(
            &["Description", "Amount"],
            &[&["A", "1.00"], &["B", "n/a"]],
        );
        let report = run(&t);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, IssueKind::InvalidAmount);
        assert_eq!(report.errors[0].row, 3);
    }

    #[test]
    fn single_row_is_insufficient() {
        let t = table(&["Description", "Amount"], &[&["A", "1.00"]]);
        let report = run(&t);
        assert!(report
            .errors
            .iter()
            .any(|e| e.kind == IssueKind::InsufficientData));
    }

    #[test]
    fn quality_warnings_for_sparse_and_repetitive_columns() {
        let t = table(
            &["Description", "Amount", "Category"],
            &[
                &["A", "1.00", ""],
                &["B", "1.00", ""],
                &["C", "1.00", "Food"],
            ],
        );
        let report = run(&t);
        assert!(report.warnings.iter().any(|w| w.contains("'Category'") && w.contains("missing")));
        assert!(report.warnings.iter().any(|w| w.contains("'Amount'") && w.contains("duplicate")));
        assert!(report.is_valid);
    }

    #[test]
    fn column_quality_metrics() {
        let q = column_quality(&[Some("a"), Some("a"), None, Some("b"), None], ColumnType::Text);
        assert_eq!(q.total_values, 5);
        assert_eq!(q.null_count, 2);
        assert_eq!(q.null_percentage, 40.0);
        assert_eq!(q.duplicate_count, 2);
        assert_eq!(q.unique_values, 2);
    }
}
