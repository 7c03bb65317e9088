use anyhow::{bail, Context, Result};
use labelwise_core::Record;
use labelwise_engine::{ApplyOutcome, Engine};
use labelwise_import::{
    process, read_table, CsvReadOptions, ProcessedBatch, ProcessingOptions, RawTable,
};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Column read back as the applied label when present; matches the export header.
pub const DEFAULT_LABEL_COLUMN: &str = "label_id";

/// Builds the engine from a TOML file, or an empty engine with defaults.
pub fn load_engine(config: Option<&Path>) -> Result<Engine> {
    let Some(path) = config else {
        return Ok(Engine::new());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let engine = Engine::from_toml(&content)
        .with_context(|| format!("loading config {}", path.display()))?;
    info!(path = %path.display(), "loaded engine config");
    Ok(engine)
}

pub fn load_table(path: &Path, delimiter: &str) -> Result<RawTable> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let options = CsvReadOptions {
        delimiter: delimiter.to_string(),
        ..CsvReadOptions::default()
    };
    read_table(file, &options).with_context(|| format!("reading {}", path.display()))
}

/// File stem of `path`, used as the prefix of record ids.
pub fn file_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}

/// Ingests `table` and carries over labels from `label_column`, if the table
/// has one.
pub fn load_batch(table: &RawTable, file_id: &str, label_column: &str) -> ProcessedBatch {
    let mut batch = process(table, file_id, &ProcessingOptions::default());
    if let Some(column) = table.column_index(label_column) {
        attach_labels(table, column, &mut batch.records);
    }
    batch
}

fn attach_labels(table: &RawTable, column: usize, records: &mut [Record]) {
    let mut attached = 0;
    for (row, record) in records.iter_mut().enumerate() {
        if let Some(label) = table.cell(row, column).map(str::trim).filter(|l| !l.is_empty()) {
            record.label_id = Some(label.to_string());
            attached += 1;
        }
    }
    debug!(attached, "attached existing labels");
}

/// Resolves a rule given by id or by name.
pub fn find_rule(engine: &Engine, rule: &str) -> Result<String> {
    if let Ok(found) = engine.rules.get(rule) {
        return Ok(found.id.clone());
    }
    let named: Vec<_> = engine
        .rules
        .list(false)
        .into_iter()
        .filter(|r| r.name == rule)
        .collect();
    match named.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => bail!("no rule with id or name '{rule}'"),
        _ => bail!("rule name '{rule}' is ambiguous"),
    }
}

/// Applies one rule, or every active rule in priority order, to `records`.
pub fn apply_rules(
    engine: &mut Engine,
    rule: Option<&str>,
    records: &mut [Record],
) -> Result<Vec<ApplyOutcome>> {
    let ids = match rule {
        Some(rule) => vec![find_rule(engine, rule)?],
        None => engine.rules.list(true).iter().map(|r| r.id.clone()).collect(),
    };
    let mut outcomes = Vec::with_capacity(ids.len());
    for id in &ids {
        outcomes.push(engine.apply(id, records, None)?);
    }
    Ok(outcomes)
}
