use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("Could not parse {kind}: '{value}'")]
    UnparseableValue { kind: &'static str, value: String },
}

impl ValueError {
    pub(crate) fn amount(value: &str) -> Self {
        ValueError::UnparseableValue {
            kind: "amount",
            value: value.to_string(),
        }
    }

    pub(crate) fn date(value: &str) -> Self {
        ValueError::UnparseableValue {
            kind: "date",
            value: value.to_string(),
        }
    }
}
