pub mod analyze;
pub mod config;
pub mod engine;
pub mod error;
pub mod learn;
pub mod matcher;
pub mod patterns;
pub mod recommend;
pub mod rules;

pub use analyze::{analyze_patterns, PatternAnalysis};
pub use config::EngineConfig;
pub use engine::{Engine, SharedEngine};
pub use error::EngineError;
pub use learn::learn_from_labeled;
pub use matcher::{create_from_record, evaluate, generate_regex, preview, validate, RegexMode};
pub use patterns::{MerchantPattern, PatternDraft, PatternStore, PatternUpdate, UNKNOWN_MERCHANT};
pub use recommend::Recommendation;
pub use rules::{
    AmountCondition, ApplyOutcome, ConditionTag, Conditions, RegexOverrides, Rule, RuleDraft,
    RuleMatch, RuleStore, RuleUpdate,
};

/// `{prefix}_` followed by eight hex characters.
pub(crate) fn short_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..8])
}
