pub mod classify;
pub mod csv;
pub mod ingest;
pub mod validate;

pub use classify::{
    classify_columns, detect_column_type, detect_column_types, identify_columns, Classification,
    ColumnMapping, ColumnType, SemanticField,
};
pub use csv::{export_records, read_table, CsvReadOptions, ImportError, RawTable};
pub use ingest::{process, ProcessedBatch, ProcessingOptions, ProcessingSummary};
pub use validate::{ColumnQuality, IssueKind, ValidationIssue, ValidationReport};

pub mod import {
    use crate::*;

    /// Reads a CSV export and runs it through classification and ingestion.
    pub fn import_csv<R: std::io::Read>(
        data: R,
        file_id: &str,
        read_options: &CsvReadOptions,
        options: &ProcessingOptions,
    ) -> Result<ProcessedBatch, ImportError> {
        let table = read_table(data, read_options)?;
        Ok(process(&table, file_id, options))
    }

    pub fn classify_csv<R: std::io::Read>(
        data: R,
        read_options: &CsvReadOptions,
    ) -> Result<Classification, ImportError> {
        let table = read_table(data, read_options)?;
        Ok(classify_columns(&table))
    }
}
