use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("Pattern not found: {0}")]
    PatternNotFound(String),
    #[error("Rule not found: {0}")]
    RuleNotFound(String),
    #[error("Invalid rule: {}", .0.join("; "))]
    InvalidRule(Vec<String>),
    #[error("Failed to parse config: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
