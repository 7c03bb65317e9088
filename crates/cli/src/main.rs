use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use labelwise::{apply_rules, file_id, find_rule, load_batch, load_engine, load_table};
use labelwise_import::{classify_columns, export_records, ProcessedBatch};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "labelwise", version, about = "Label bank transactions with rules and patterns")]
struct Cli {
    /// Engine config (TOML) with settings, seed patterns and rules
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// CSV field delimiter
    #[arg(long, global = true, default_value = ",")]
    delimiter: String,
    /// Column holding labels already applied to a row
    #[arg(long, global = true, default_value = labelwise::DEFAULT_LABEL_COLUMN)]
    label_column: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect column roles and types and report data quality
    Classify { input: PathBuf },
    /// Suggest labels for unlabeled rows
    Suggest {
        input: PathBuf,
        /// Suggest from configured rules instead of merchant patterns
        #[arg(long)]
        rules: bool,
    },
    /// Summarize merchants, amounts and description words
    Analyze {
        input: PathBuf,
        /// Include amount and date statistics
        #[arg(long)]
        statistics: bool,
    },
    /// Apply one rule, or every active rule, and report what was labeled
    Apply {
        input: PathBuf,
        /// Rule id or name; all active rules when omitted
        #[arg(long)]
        rule: Option<String>,
        /// Write the labeled rows to this CSV file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Learn merchant patterns from labeled rows
    Learn { input: PathBuf },
    /// Show which rows a rule would match
    Preview {
        input: PathBuf,
        /// Rule id or name
        rule: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut engine = load_engine(cli.config.as_deref())?;

    match &cli.command {
        Commands::Classify { input } => {
            let table = load_table(input, &cli.delimiter)?;
            print_json(&classify_columns(&table))
        }
        Commands::Suggest { input, rules } => {
            let batch = read_batch(&cli, input)?;
            let suggestions = if *rules {
                engine.suggest_from_rules(&batch.records)?
            } else {
                engine.suggest(&batch.records)
            };
            print_json(&suggestions)
        }
        Commands::Analyze { input, statistics } => {
            let batch = read_batch(&cli, input)?;
            print_json(&engine.analyze(&batch.records, *statistics))
        }
        Commands::Apply {
            input,
            rule,
            output,
        } => {
            let mut batch = read_batch(&cli, input)?;
            let outcomes = apply_rules(&mut engine, rule.as_deref(), &mut batch.records)?;
            if let Some(path) = output {
                let file = fs::File::create(path)
                    .with_context(|| format!("creating {}", path.display()))?;
                export_records(&batch.records, file)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            print_json(&outcomes)
        }
        Commands::Learn { input } => {
            let batch = read_batch(&cli, input)?;
            print_json(&engine.learn(&batch.records))
        }
        Commands::Preview { input, rule } => {
            let batch = read_batch(&cli, input)?;
            let id = find_rule(&engine, rule)?;
            print_json(&engine.preview(&id, &batch.records)?)
        }
    }
}

fn read_batch(cli: &Cli, input: &Path) -> Result<ProcessedBatch> {
    let table = load_table(input, &cli.delimiter)?;
    Ok(load_batch(&table, &file_id(input), &cli.label_column))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
