use chrono::{DateTime, Utc};
use labelwise_core::{DateRange, Record};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::matcher::{self, CompiledRule};
use crate::patterns::PatternStore;
use crate::short_id;

const DEFAULT_RULE_CONFIDENCE: f32 = 0.5;

/// Amount constraints; each bound is checked on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
}

impl AmountCondition {
    pub fn is_empty(&self) -> bool {
        self.exact.is_none() && self.min.is_none() && self.max.is_none()
    }
}

/// Condition groups a rule can define. Each defined group counts once
/// towards the confidence denominator, however many sub-checks it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionGroup {
    Merchant,
    Description,
    Amount,
    Category,
    DateRange,
}

/// A satisfied sub-condition, as reported on a [`RuleMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionTag {
    Merchant,
    Description,
    AmountExact,
    AmountMin,
    AmountMax,
    Category,
    DateStart,
    DateEnd,
}

impl fmt::Display for ConditionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConditionTag::Merchant => "merchant",
            ConditionTag::Description => "description",
            ConditionTag::AmountExact => "amount_exact",
            ConditionTag::AmountMin => "amount_min",
            ConditionTag::AmountMax => "amount_max",
            ConditionTag::Category => "category",
            ConditionTag::DateStart => "date_start",
            ConditionTag::DateEnd => "date_end",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<AmountCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

impl Conditions {
    pub fn merchant(&self) -> Option<&str> {
        non_blank(&self.merchant)
    }

    pub fn description(&self) -> Option<&str> {
        non_blank(&self.description)
    }

    pub fn category(&self) -> Option<&str> {
        non_blank(&self.category)
    }

    pub fn amount(&self) -> Option<&AmountCondition> {
        self.amount.as_ref().filter(|a| !a.is_empty())
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref().filter(|d| !d.is_empty())
    }

    /// The non-empty condition groups, in evaluation order.
    pub fn groups(&self) -> Vec<ConditionGroup> {
        let mut groups = Vec::new();
        if self.merchant().is_some() {
            groups.push(ConditionGroup::Merchant);
        }
        if self.description().is_some() {
            groups.push(ConditionGroup::Description);
        }
        if self.amount().is_some() {
            groups.push(ConditionGroup::Amount);
        }
        if self.category().is_some() {
            groups.push(ConditionGroup::Category);
        }
        if self.date_range().is_some() {
            groups.push(ConditionGroup::DateRange);
        }
        groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups().is_empty()
    }
}

/// Hand-written regexes that replace the generated ones for a condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RegexOverrides {
    pub fn merchant(&self) -> Option<&str> {
        non_blank(&self.merchant)
    }

    pub fn description(&self) -> Option<&str> {
        non_blank(&self.description)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub conditions: Conditions,
    pub regex: RegexOverrides,
    pub label_id: String,
    pub priority: i32,
    pub is_active: bool,
    /// Ceiling on any confidence this rule reports.
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_from: Option<String>,
    pub match_count: u64,
    pub transaction_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub regex: RegexOverrides,
    pub label_id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "default_rule_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub created_from: Option<String>,
}

fn default_active() -> bool {
    true
}

fn default_rule_confidence() -> f32 {
    DEFAULT_RULE_CONFIDENCE
}

impl RuleDraft {
    pub fn new(name: impl Into<String>, label_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            conditions: Conditions::default(),
            regex: RegexOverrides::default(),
            label_id: label_id.into(),
            priority: 0,
            is_active: true,
            confidence: DEFAULT_RULE_CONFIDENCE,
            created_from: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Materializes the draft into an unsaved rule with a fresh id.
    pub fn into_rule(self) -> Rule {
        let now = Utc::now();
        Rule {
            id: short_id("rule"),
            name: self.name,
            description: self.description,
            conditions: self.conditions,
            regex: self.regex,
            label_id: self.label_id,
            priority: self.priority,
            is_active: self.is_active,
            confidence: self.confidence.clamp(0.0, 1.0),
            created_at: now,
            updated_at: now,
            created_from: self.created_from,
            match_count: 0,
            transaction_ids: Vec::new(),
        }
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub conditions: Option<Conditions>,
    pub regex: Option<RegexOverrides>,
    pub label_id: Option<String>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: String,
    pub record_id: String,
    pub confidence: f32,
    pub matched_conditions: Vec<ConditionTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub rule_id: String,
    pub label_id: String,
    pub applied: usize,
    pub record_ids: Vec<String>,
}

/// Registry of user-authored rules.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: Vec<Rule>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn create(&mut self, draft: RuleDraft) -> Result<Rule> {
        let rule = draft.into_rule();
        let validation = matcher::validate(&rule);
        if !validation.is_valid {
            return Err(EngineError::InvalidRule(validation.errors));
        }
        info!(id = %rule.id, name = %rule.name, label = %rule.label_id, "created rule");
        self.rules.push(rule.clone());
        Ok(rule)
    }

    pub fn get(&self, id: &str) -> Result<&Rule> {
        self.rules
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| EngineError::RuleNotFound(id.to_string()))
    }

    /// Applies `update` to a copy of the rule and only stores it when the
    /// result still validates.
    pub fn update(&mut self, id: &str, update: RuleUpdate) -> Result<Rule> {
        let idx = self.position(id)?;
        let mut rule = self.rules[idx].clone();

        if let Some(name) = update.name {
            rule.name = name;
        }
        if let Some(description) = update.description {
            rule.description = Some(description);
        }
        if let Some(conditions) = update.conditions {
            rule.conditions = conditions;
        }
        if let Some(regex) = update.regex {
            rule.regex = regex;
        }
        if let Some(label_id) = update.label_id {
            rule.label_id = label_id;
        }
        if let Some(priority) = update.priority {
            rule.priority = priority;
        }
        if let Some(active) = update.is_active {
            rule.is_active = active;
        }
        if let Some(confidence) = update.confidence {
            rule.confidence = confidence.clamp(0.0, 1.0);
        }

        let validation = matcher::validate(&rule);
        if !validation.is_valid {
            return Err(EngineError::InvalidRule(validation.errors));
        }
        rule.updated_at = Utc::now();
        info!(id, name = %rule.name, "updated rule");
        self.rules[idx] = rule.clone();
        Ok(rule)
    }

    pub fn delete(&mut self, id: &str) -> Result<Rule> {
        let idx = self.position(id)?;
        let removed = self.rules.remove(idx);
        info!(id, name = %removed.name, "deleted rule");
        Ok(removed)
    }

    /// Rules by descending priority; equal priorities keep creation order.
    pub fn list(&self, active_only: bool) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| !active_only || r.is_active)
            .collect();
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        rules
    }

    /// Labels every record the rule matches, optionally restricted to
    /// `record_ids`, and records the matches on the rule. An empty id list
    /// restricts nothing.
    pub fn apply(
        &mut self,
        id: &str,
        patterns: &mut PatternStore,
        records: &mut [Record],
        record_ids: Option<&[String]>,
    ) -> Result<ApplyOutcome> {
        let idx = self.position(id)?;
        let allowed: Option<HashSet<&str>> = record_ids
            .filter(|ids| !ids.is_empty())
            .map(|ids| ids.iter().map(String::as_str).collect());

        let compiled = CompiledRule::new(&self.rules[idx])?;
        let mut matched = Vec::new();
        for record in records.iter_mut() {
            if let Some(allowed) = &allowed {
                if !allowed.contains(record.id.as_str()) {
                    continue;
                }
            }
            if let Some(m) = compiled.evaluate(record, patterns) {
                record.apply_label(&compiled.rule().label_id, m.confidence);
                matched.push(m.record_id);
            }
        }

        let rule = &mut self.rules[idx];
        rule.match_count += matched.len() as u64;
        rule.transaction_ids.extend(matched.iter().cloned());
        info!(id, applied = matched.len(), label = %rule.label_id, "applied rule");

        Ok(ApplyOutcome {
            rule_id: rule.id.clone(),
            label_id: rule.label_id.clone(),
            applied: matched.len(),
            record_ids: matched,
        })
    }

    /// Matches of the given rules, or of every active rule, against
    /// `records`, strongest first.
    pub fn match_all(
        &self,
        patterns: &mut PatternStore,
        records: &[Record],
        rule_ids: Option<&[String]>,
    ) -> Result<Vec<RuleMatch>> {
        let rules: Vec<&Rule> = match rule_ids {
            Some(ids) => ids.iter().map(|id| self.get(id)).collect::<Result<_>>()?,
            None => self.list(true),
        };

        let mut matches = Vec::new();
        for rule in rules {
            let compiled = CompiledRule::new(rule)?;
            matches.extend(records.iter().filter_map(|r| compiled.evaluate(r, patterns)));
        }
        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(matches)
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| EngineError::RuleNotFound(id.to_string()))
    }
}
