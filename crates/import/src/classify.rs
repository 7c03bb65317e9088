use labelwise_core::{parse_amount, parse_date};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

use crate::csv::RawTable;
use crate::validate::{validate, ValidationReport};

/// Values inspected per column when guessing its type.
const TYPE_SAMPLE_SIZE: usize = 100;
/// Values that must all parse as dates for a column to count as a date column.
const DATE_SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticField {
    Date,
    Description,
    Amount,
    Balance,
    Category,
    Account,
    Reference,
}

impl SemanticField {
    /// Assignment order when several fields claim the same column.
    pub const ALL: [SemanticField; 7] = [
        SemanticField::Date,
        SemanticField::Description,
        SemanticField::Amount,
        SemanticField::Balance,
        SemanticField::Category,
        SemanticField::Account,
        SemanticField::Reference,
    ];

    pub const REQUIRED: [SemanticField; 2] = [SemanticField::Description, SemanticField::Amount];

    fn synonyms(self) -> &'static [&'static str] {
        match self {
            SemanticField::Date => &[
                r"date", r"transaction.date", r"txn.date", r"posted.date", r"value.date",
                r"trade.date", r"settle.date",
            ],
            SemanticField::Description => &[
                r"description", r"desc", r"memo", r"reference", r"details",
                r"transaction.description", r"txn.desc", r"narration",
            ],
            SemanticField::Amount => &[
                r"amount", r"value", r"total", r"sum", r"payment", r"debit", r"credit",
                r"withdrawal", r"deposit", r"transaction.amount", r"txn.amount",
            ],
            SemanticField::Balance => &[
                r"balance", r"running.balance", r"account.balance", r"ending.balance",
                r"current.balance",
            ],
            SemanticField::Category => &[
                r"category", r"type", r"class", r"classification", r"transaction.type",
                r"txn.type",
            ],
            SemanticField::Account => &[
                r"account", r"account.name", r"account.number", r"bank.account",
                r"checking.account",
            ],
            SemanticField::Reference => &[
                r"reference", r"ref", r"ref.number", r"transaction.id", r"check.number",
                r"confirmation.number",
            ],
        }
    }
}

impl fmt::Display for SemanticField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticField::Date => "date",
            SemanticField::Description => "description",
            SemanticField::Amount => "amount",
            SemanticField::Balance => "balance",
            SemanticField::Category => "category",
            SemanticField::Account => "account",
            SemanticField::Reference => "reference",
        };
        write!(f, "{name}")
    }
}

fn synonym_patterns() -> &'static [(SemanticField, Vec<Regex>)] {
    static PATTERNS: OnceLock<Vec<(SemanticField, Vec<Regex>)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SemanticField::ALL
            .iter()
            .map(|field| {
                let compiled = field
                    .synonyms()
                    .iter()
                    .map(|p| Regex::new(&format!("(?i){p}")).expect("invalid regex"))
                    .collect();
                (*field, compiled)
            })
            .collect()
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub date_column: Option<String>,
    pub description_column: Option<String>,
    pub amount_column: Option<String>,
    pub balance_column: Option<String>,
    pub category_column: Option<String>,
    pub account_column: Option<String>,
    pub reference_column: Option<String>,
}

impl ColumnMapping {
    pub fn get(&self, field: SemanticField) -> Option<&str> {
        match field {
            SemanticField::Date => self.date_column.as_deref(),
            SemanticField::Description => self.description_column.as_deref(),
            SemanticField::Amount => self.amount_column.as_deref(),
            SemanticField::Balance => self.balance_column.as_deref(),
            SemanticField::Category => self.category_column.as_deref(),
            SemanticField::Account => self.account_column.as_deref(),
            SemanticField::Reference => self.reference_column.as_deref(),
        }
    }

    pub fn set(&mut self, field: SemanticField, column: impl Into<String>) {
        let slot = match field {
            SemanticField::Date => &mut self.date_column,
            SemanticField::Description => &mut self.description_column,
            SemanticField::Amount => &mut self.amount_column,
            SemanticField::Balance => &mut self.balance_column,
            SemanticField::Category => &mut self.category_column,
            SemanticField::Account => &mut self.account_column,
            SemanticField::Reference => &mut self.reference_column,
        };
        *slot = Some(column.into());
    }

    /// Column index of `field` in `table`, if mapped to a column that exists.
    pub fn index_in(&self, field: SemanticField, table: &RawTable) -> Option<usize> {
        self.get(field).and_then(|c| table.column_index(c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Date,
    Numeric,
    Text,
    Mixed,
    Unknown,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Date => write!(f, "date"),
            ColumnType::Numeric => write!(f, "numeric"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Mixed => write!(f, "mixed"),
            ColumnType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Everything the classifier learned about a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub mapping: ColumnMapping,
    pub column_types: BTreeMap<String, ColumnType>,
    pub report: ValidationReport,
}

/// Maps column names onto semantic fields by synonym.
///
/// Columns are visited left to right. Each column is bound to the first
/// field whose synonyms match its name; if an earlier column already holds
/// that field the column stays unmapped.
pub fn identify_columns(table: &RawTable) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();

    for column in &table.columns {
        let name = column.trim().to_lowercase();
        let field = synonym_patterns()
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(&name)))
            .map(|(field, _)| *field);
        match field {
            Some(field) if mapping.get(field).is_none() => mapping.set(field, column.clone()),
            Some(field) => debug!(column = %column, %field, "field already mapped, skipping column"),
            None => {}
        }
    }

    mapping
}

pub fn detect_column_type<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> ColumnType {
    let sample: Vec<&str> = values.into_iter().flatten().take(TYPE_SAMPLE_SIZE).collect();
    if sample.is_empty() {
        return ColumnType::Unknown;
    }

    if sample
        .iter()
        .take(DATE_SAMPLE_SIZE)
        .all(|v| parse_date(v).is_ok())
    {
        return ColumnType::Date;
    }

    let numeric = sample.iter().filter(|v| parse_amount(v).is_ok()).count();
    if numeric == sample.len() {
        return ColumnType::Numeric;
    }

    let dates = sample.iter().filter(|v| parse_date(v).is_ok()).count();
    if numeric == 0 && dates == 0 {
        ColumnType::Text
    } else {
        ColumnType::Mixed
    }
}

pub fn detect_column_types(table: &RawTable) -> BTreeMap<String, ColumnType> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.clone(), detect_column_type(table.column_values(idx))))
        .collect()
}

/// Infers the column mapping and types of a raw table and validates it.
pub fn classify_columns(table: &RawTable) -> Classification {
    let column_types = detect_column_types(table);
    let mapping = identify_columns(table);
    debug!(
        columns = table.columns.len(),
        rows = table.row_count(),
        "classified columns"
    );
    let report = validate(table, &mapping, &column_types);
    Classification {
        mapping,
        column_types,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn identifies_common_bank_headers() {
        let t = table(&["Transaction Date", "Description", "Amount", "Balance"], &[]);
        let mapping = identify_columns(&t);
        assert_eq!(mapping.date_column.as_deref(), Some("Transaction Date"));
        assert_eq!(mapping.description_column.as_deref(), Some("Description"));
        assert_eq!(mapping.amount_column.as_deref(), Some("Amount"));
        assert_eq!(mapping.balance_column.as_deref(), Some("Balance"));
        assert_eq!(mapping.category_column, None);
    }

    #[test]
    fn synonyms_are_case_insensitive() {
        let t = table(&["NARRATION", "Withdrawal"], &[]);
        let mapping = identify_columns(&t);
        assert_eq!(mapping.description_column.as_deref(), Some("NARRATION"));
        assert_eq!(mapping.amount_column.as_deref(), Some("Withdrawal"));
    }

    #[test]
    fn first_matching_column_keeps_the_field() {
        let t = table(&["Debit", "Credit"], &[]);
        let mapping = identify_columns(&t);
        assert_eq!(mapping.amount_column.as_deref(), Some("Debit"));
    }

    #[test]
    fn claimed_field_leaves_column_unmapped() {
        // "Reference" first matches description, which Memo already holds.
        let t = table(&["Memo", "Reference"], &[]);
        let mapping = identify_columns(&t);
        assert_eq!(mapping.description_column.as_deref(), Some("Memo"));
        assert_eq!(mapping.reference_column, None);
    }

    #[test]
    fn second_date_column_does_not_steal_amount() {
        let t = table(
            &["Posted Date", "Value Date", "Description", "Amount"],
            &[
                &["2024-01-15", "2024-01-16", "STARBUCKS", "-5.75"],
                &["2024-01-16", "2024-01-17", "AMAZON", "-20.00"],
            ],
        );
        let mapping = identify_columns(&t);
        assert_eq!(mapping.date_column.as_deref(), Some("Posted Date"));
        assert_eq!(mapping.amount_column.as_deref(), Some("Amount"));

        let c = classify_columns(&t);
        assert!(c.report.is_valid);
        assert_eq!(c.report.invalid_rows, 0);
    }

    #[test]
    fn unmatched_column_is_left_unmapped() {
        let t = table(&["Foo"], &[]);
        assert_eq!(identify_columns(&t), ColumnMapping::default());
    }

    #[test]
    fn detect_types() {
        assert_eq!(
            detect_column_type([Some("2024-01-15"), Some("01/16/2024")]),
            ColumnType::Date
        );
        assert_eq!(
            detect_column_type([Some("5.75"), Some("-1,200.00"), Some("(3)")]),
            ColumnType::Numeric
        );
        assert_eq!(
            detect_column_type([Some("STARBUCKS"), Some("AMAZON")]),
            ColumnType::Text
        );
        assert_eq!(
            detect_column_type([Some("STARBUCKS"), Some("12.00")]),
            ColumnType::Mixed
        );
    }

    #[test]
    fn empty_column_is_unknown() {
        assert_eq!(detect_column_type([None, None]), ColumnType::Unknown);
        assert_eq!(detect_column_type(std::iter::empty()), ColumnType::Unknown);
    }

    #[test]
    fn blank_cells_are_ignored_when_typing() {
        assert_eq!(
            detect_column_type([None, Some("10"), None, Some("12.5")]),
            ColumnType::Numeric
        );
    }

    #[test]
    fn classify_columns_reports_types_and_mapping() {
        let t = table(
            &["Date", "Description", "Amount", "Notes"],
            &[
                &["2024-01-15", "STARBUCKS #1", "5.75", ""],
                &["2024-01-16", "AMAZON", "20.00", ""],
            ],
        );
        let c = classify_columns(&t);
        assert_eq!(c.column_types["Date"], ColumnType::Date);
        assert_eq!(c.column_types["Description"], ColumnType::Text);
        assert_eq!(c.column_types["Amount"], ColumnType::Numeric);
        assert_eq!(c.column_types["Notes"], ColumnType::Unknown);
        assert_eq!(c.mapping.amount_column.as_deref(), Some("Amount"));
        assert!(c.report.is_valid);
    }
}
