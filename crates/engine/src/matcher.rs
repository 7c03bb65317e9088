use labelwise_core::money::{tolerance_band, within_tolerance};
use labelwise_core::Record;
use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::patterns::{PatternStore, UNKNOWN_MERCHANT};
use crate::rules::{AmountCondition, Conditions, ConditionTag, RegexOverrides, Rule, RuleDraft, RuleMatch};

const AUTO_RULE_CONFIDENCE: f32 = 0.7;
const AUTO_RULE_TOLERANCE_PERCENT: u32 = 5;
const LOW_CONFIDENCE: f32 = 0.1;
const HIGH_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexMode {
    /// Whitespace in the text matches one or more separators.
    Fuzzy,
    /// Whitespace in the text matches zero or more separators.
    Strict,
}

/// Word-bounded regex matching `text` literally, with internal whitespace
/// relaxed to spaces, dashes or underscores.
pub fn generate_regex(text: &str, mode: RegexMode) -> String {
    let separator = match mode {
        RegexMode::Fuzzy => r"[\s\-_]+",
        RegexMode::Strict => r"[\s\-_]*",
    };
    let body = text
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(separator);
    format!(r"\b{body}\b")
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| EngineError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// A rule with the regexes for its text conditions built once, so it can be
/// run over a whole batch.
pub struct CompiledRule<'a> {
    rule: &'a Rule,
    merchant: Option<Regex>,
    description: Option<Regex>,
    category: Option<Regex>,
}

impl<'a> CompiledRule<'a> {
    pub fn new(rule: &'a Rule) -> Result<Self> {
        let conditions = &rule.conditions;
        let merchant = conditions
            .merchant()
            .map(|m| match rule.regex.merchant() {
                Some(custom) => compile(custom),
                None => compile(&generate_regex(m, RegexMode::Fuzzy)),
            })
            .transpose()?;
        let description = conditions
            .description()
            .map(|d| match rule.regex.description() {
                Some(custom) => compile(custom),
                None => compile(&generate_regex(d, RegexMode::Strict)),
            })
            .transpose()?;
        let category = conditions
            .category()
            .map(|c| compile(&generate_regex(c, RegexMode::Strict)))
            .transpose()?;

        Ok(Self {
            rule,
            merchant,
            description,
            category,
        })
    }

    pub fn rule(&self) -> &'a Rule {
        self.rule
    }

    /// Checks every defined condition against `record`. Conditions whose
    /// record field is missing are skipped rather than failed.
    pub fn evaluate(&self, record: &Record, patterns: &mut PatternStore) -> Option<RuleMatch> {
        let rule = self.rule;
        if !rule.is_active {
            return None;
        }
        let conditions = &rule.conditions;
        let mut tags = Vec::new();

        if let Some(re) = &self.merchant {
            let merchant = patterns.extract_merchant(&record.description);
            if re.is_match(&merchant) {
                tags.push(ConditionTag::Merchant);
            }
        }

        if let Some(re) = &self.description {
            if re.is_match(&record.description) {
                tags.push(ConditionTag::Description);
            }
        }

        if let (Some(amount), Some(value)) = (conditions.amount(), record.amount) {
            tags.extend(amount_tags(amount, value));
        }

        if let (Some(re), Some(category)) = (&self.category, record.category.as_deref()) {
            if re.is_match(category) {
                tags.push(ConditionTag::Category);
            }
        }

        if let (Some(range), Some(date)) = (conditions.date_range(), record.date) {
            if range.after_start(date) == Some(true) {
                tags.push(ConditionTag::DateStart);
            }
            if range.before_end(date) == Some(true) {
                tags.push(ConditionTag::DateEnd);
            }
        }

        if tags.is_empty() {
            return None;
        }

        let defined = conditions.groups().len().max(1);
        let confidence = (tags.len() as f32 / defined as f32)
            .min(rule.confidence)
            .min(1.0);

        Some(RuleMatch {
            rule_id: rule.id.clone(),
            record_id: record.id.clone(),
            confidence,
            matched_conditions: tags,
        })
    }
}

fn amount_tags(condition: &AmountCondition, amount: Decimal) -> Vec<ConditionTag> {
    let mut tags = Vec::new();
    if let Some(exact) = condition.exact {
        if within_tolerance(amount, exact, Decimal::new(1, 2)) {
            tags.push(ConditionTag::AmountExact);
        }
    }
    if let Some(min) = condition.min {
        if amount >= min {
            tags.push(ConditionTag::AmountMin);
        }
    }
    if let Some(max) = condition.max {
        if amount <= max {
            tags.push(ConditionTag::AmountMax);
        }
    }
    tags
}

/// Evaluates a single rule against a single record.
pub fn evaluate(
    rule: &Rule,
    record: &Record,
    patterns: &mut PatternStore,
) -> Result<Option<RuleMatch>> {
    Ok(CompiledRule::new(rule)?.evaluate(record, patterns))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePreview {
    pub rule_id: String,
    pub total_matches: usize,
    pub sample_matches: Vec<Record>,
}

/// Shows what a rule would match without labeling anything.
pub fn preview(
    rule: &Rule,
    records: &[Record],
    patterns: &mut PatternStore,
    max_samples: usize,
) -> Result<RulePreview> {
    let compiled = CompiledRule::new(rule)?;
    let matching: Vec<&Record> = records
        .iter()
        .filter(|r| compiled.evaluate(r, patterns).is_some())
        .collect();

    Ok(RulePreview {
        rule_id: rule.id.clone(),
        total_matches: matching.len(),
        sample_matches: matching.into_iter().take(max_samples).cloned().collect(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

pub fn validate(rule: &Rule) -> RuleValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();
    let conditions = &rule.conditions;

    if conditions.is_empty() {
        errors.push("Rule must have at least one condition".to_string());
    }

    if let Some(pattern) = rule.regex.merchant() {
        if let Err(e) = compile(pattern) {
            errors.push(format!("Invalid merchant regex pattern: {e}"));
        }
    }
    if let Some(pattern) = rule.regex.description() {
        if let Err(e) = compile(pattern) {
            errors.push(format!("Invalid description regex pattern: {e}"));
        }
    }

    if let Some(AmountCondition {
        min: Some(min),
        max: Some(max),
        ..
    }) = conditions.amount
    {
        if min > max {
            errors.push("Minimum amount cannot be greater than maximum amount".to_string());
        }
    }

    if rule.confidence < LOW_CONFIDENCE {
        warnings.push("Very low confidence threshold may result in poor matches".to_string());
    } else if rule.confidence > HIGH_CONFIDENCE {
        warnings.push("Very high confidence threshold may miss valid matches".to_string());
    }

    if rule.priority < 0 {
        warnings.push("Negative priority may cause unexpected rule ordering".to_string());
    }

    if conditions.merchant().is_none() {
        suggestions.push("Consider adding merchant condition for better accuracy".to_string());
    }
    if conditions.amount().is_none() && conditions.description().is_none() {
        suggestions.push("Consider adding amount or description conditions".to_string());
    }

    RuleValidation {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        suggestions,
    }
}

/// Drafts a rule that would catch transactions like `record`.
///
/// The merchant condition is dropped when no pattern recognizes the
/// description, and the amount band when the record has no non-zero amount
/// or the band would not fit in a `Decimal`.
pub fn create_from_record(
    record: &Record,
    label_id: &str,
    name: Option<&str>,
    patterns: &mut PatternStore,
) -> RuleDraft {
    let merchant = patterns.extract_merchant(&record.description);
    let known = (merchant != UNKNOWN_MERCHANT).then_some(merchant);

    let amount = record
        .amount
        .filter(|a| !a.is_zero())
        .and_then(|a| tolerance_band(a, AUTO_RULE_TOLERANCE_PERCENT))
        .map(|(min, max)| AmountCondition {
            exact: None,
            min: Some(min),
            max: Some(max),
        });

    let description = record.description.trim();
    let name = match (name, &known) {
        (Some(name), _) => name.to_string(),
        (None, Some(merchant)) => format!("Auto-rule for {merchant}"),
        (None, None) => "Auto-rule for transaction".to_string(),
    };

    RuleDraft {
        name,
        description: None,
        regex: RegexOverrides {
            merchant: known
                .as_deref()
                .map(|m| generate_regex(m, RegexMode::Strict)),
            description: None,
        },
        conditions: Conditions {
            merchant: known,
            description: (!description.is_empty()).then(|| description.to_string()),
            amount,
            category: None,
            date_range: None,
        },
        label_id: label_id.to_string(),
        priority: 0,
        is_active: true,
        confidence: AUTO_RULE_CONFIDENCE,
        created_from: Some(record.id.clone()),
    }
}
