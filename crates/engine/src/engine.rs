use labelwise_core::Record;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::analyze::{analyze_patterns, PatternAnalysis};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::learn::learn_from_labeled;
use crate::matcher::{self, RulePreview, RuleValidation};
use crate::patterns::{MerchantPattern, PatternStore};
use crate::recommend::{self, Recommendation};
use crate::rules::{ApplyOutcome, Rule, RuleMatch, RuleStore};

/// An engine shared between threads; hold the lock for one call at a time.
pub type SharedEngine = Arc<Mutex<Engine>>;

/// Owns the pattern and rule registries a labeling session works against.
#[derive(Default)]
pub struct Engine {
    pub patterns: PatternStore,
    pub rules: RuleStore,
    pub config: EngineConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an engine and seeds it with the configured patterns and rules,
    /// which go through the same validation as any other create.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let mut engine = Engine {
            config: config.clone(),
            ..Engine::default()
        };
        for draft in config.patterns {
            engine.patterns.create(draft)?;
        }
        for draft in config.rules {
            engine.rules.create(draft)?;
        }
        info!(
            patterns = engine.patterns.len(),
            rules = engine.rules.len(),
            "engine configured"
        );
        Ok(engine)
    }

    pub fn from_toml(toml_content: &str) -> Result<Self> {
        Self::from_config(EngineConfig::from_toml(toml_content)?)
    }

    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    pub fn extract_merchant(&mut self, description: &str) -> String {
        self.patterns.extract_merchant(description)
    }

    pub fn learn(&mut self, records: &[Record]) -> Vec<MerchantPattern> {
        learn_from_labeled(&mut self.patterns, records)
    }

    pub fn evaluate(&mut self, rule_id: &str, record: &Record) -> Result<Option<RuleMatch>> {
        let rule = self.rules.get(rule_id)?;
        matcher::evaluate(rule, record, &mut self.patterns)
    }

    /// Preview using the configured sample size.
    pub fn preview(&mut self, rule_id: &str, records: &[Record]) -> Result<RulePreview> {
        let rule = self.rules.get(rule_id)?;
        matcher::preview(
            rule,
            records,
            &mut self.patterns,
            self.config.preview.max_samples,
        )
    }

    pub fn validate(&self, rule_id: &str) -> Result<RuleValidation> {
        Ok(matcher::validate(self.rules.get(rule_id)?))
    }

    pub fn apply(
        &mut self,
        rule_id: &str,
        records: &mut [Record],
        record_ids: Option<&[String]>,
    ) -> Result<ApplyOutcome> {
        self.rules
            .apply(rule_id, &mut self.patterns, records, record_ids)
    }

    pub fn match_all(&mut self, records: &[Record]) -> Result<Vec<RuleMatch>> {
        self.rules.match_all(&mut self.patterns, records, None)
    }

    /// Drafts a rule from `record` and stores it.
    pub fn create_rule_from_record(
        &mut self,
        record: &Record,
        label_id: &str,
        name: Option<&str>,
    ) -> Result<Rule> {
        let draft = matcher::create_from_record(record, label_id, name, &mut self.patterns);
        self.rules.create(draft)
    }

    /// Pattern-based suggestions at the configured threshold and limit.
    pub fn suggest(&mut self, records: &[Record]) -> Vec<Recommendation> {
        let settings = &self.config.recommend;
        let out = recommend::suggest(&mut self.patterns, records, settings.min_confidence);
        recommend::limit(out, settings.limit)
    }

    pub fn suggest_from_rules(&mut self, records: &[Record]) -> Result<Vec<Recommendation>> {
        let settings = &self.config.recommend;
        let out = recommend::from_rules(
            &self.rules,
            &mut self.patterns,
            records,
            settings.min_confidence,
        )?;
        Ok(recommend::limit(out, settings.limit))
    }

    pub fn analyze(&mut self, records: &[Record], include_statistics: bool) -> PatternAnalysis {
        analyze_patterns(&mut self.patterns, records, include_statistics)
    }
}
