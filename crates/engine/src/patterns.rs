use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::short_id;

/// Returned by extraction when no active pattern matches.
pub const UNKNOWN_MERCHANT: &str = "UNKNOWN";

const DEFAULT_CONFIDENCE: f32 = 0.8;
const EXACT_MATCH_BONUS: f32 = 0.1;
const TOP_PATTERNS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantPattern {
    pub id: String,
    pub name: String,
    pub pattern: String,
    pub category: Option<String>,
    pub confidence: f32,
    pub is_active: bool,
    pub usage_count: u64,
    pub success_rate: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDraft {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

fn default_active() -> bool {
    true
}

impl PatternDraft {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            category: None,
            confidence: DEFAULT_CONFIDENCE,
            is_active: true,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternUpdate {
    pub name: Option<String>,
    pub pattern: Option<String>,
    pub category: Option<String>,
    pub confidence: Option<f32>,
    pub is_active: Option<bool>,
    pub success_rate: Option<f32>,
}

/// The pattern that won extraction for a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantMatch {
    pub pattern_id: String,
    pub merchant: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternUsage {
    pub id: String,
    pub name: String,
    pub usage_count: u64,
    pub success_rate: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub total_patterns: usize,
    pub active_patterns: usize,
    pub total_usage: u64,
    pub average_confidence: f32,
    pub top_performing: Vec<PatternUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTest {
    pub pattern_id: String,
    pub pattern_name: String,
    pub description: String,
    pub extracted_merchant: String,
    pub matched: bool,
}

/// Pairs a stored pattern with its compiled, case-insensitive regex.
struct CompiledPattern {
    pattern: MerchantPattern,
    regex: Regex,
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

/// Registry of merchant-identification patterns.
///
/// Every stored pattern compiles; a pattern that does not is rejected at
/// `create`/`update` and never reaches the store.
#[derive(Default)]
pub struct PatternStore {
    patterns: Vec<CompiledPattern>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn create(&mut self, draft: PatternDraft) -> Result<MerchantPattern> {
        let regex = compile(&draft.pattern)?;
        let now = Utc::now();
        let pattern = MerchantPattern {
            id: short_id("pattern"),
            name: draft.name,
            pattern: draft.pattern,
            category: draft.category,
            confidence: draft.confidence.clamp(0.0, 1.0),
            is_active: draft.is_active,
            usage_count: 0,
            success_rate: 0.0,
            created_at: now,
            updated_at: now,
        };
        info!(id = %pattern.id, name = %pattern.name, "created merchant pattern");
        self.patterns.push(CompiledPattern {
            pattern: pattern.clone(),
            regex,
        });
        Ok(pattern)
    }

    pub fn get(&self, id: &str) -> Option<&MerchantPattern> {
        self.position(id).map(|idx| &self.patterns[idx].pattern)
    }

    /// Applies `update`. When the new pattern text does not compile the stored
    /// pattern is left exactly as it was.
    pub fn update(&mut self, id: &str, update: PatternUpdate) -> Result<MerchantPattern> {
        let idx = self
            .position(id)
            .ok_or_else(|| EngineError::PatternNotFound(id.to_string()))?;
        let regex = update.pattern.as_deref().map(compile).transpose()?;

        let entry = &mut self.patterns[idx];
        if let Some(regex) = regex {
            entry.regex = regex;
        }
        let p = &mut entry.pattern;
        if let Some(pattern) = update.pattern {
            p.pattern = pattern;
        }
        if let Some(name) = update.name {
            p.name = name;
        }
        if let Some(category) = update.category {
            p.category = Some(category);
        }
        if let Some(confidence) = update.confidence {
            p.confidence = confidence.clamp(0.0, 1.0);
        }
        if let Some(active) = update.is_active {
            p.is_active = active;
        }
        if let Some(rate) = update.success_rate {
            p.success_rate = rate.clamp(0.0, 1.0);
        }
        p.updated_at = Utc::now();

        info!(id, name = %p.name, "updated merchant pattern");
        Ok(p.clone())
    }

    pub fn delete(&mut self, id: &str) -> Result<MerchantPattern> {
        let idx = self
            .position(id)
            .ok_or_else(|| EngineError::PatternNotFound(id.to_string()))?;
        let removed = self.patterns.remove(idx).pattern;
        info!(id, name = %removed.name, "deleted merchant pattern");
        Ok(removed)
    }

    /// Patterns by usage descending, then confidence descending. Equal keys
    /// keep creation order.
    pub fn list(&self, active_only: bool) -> Vec<&MerchantPattern> {
        self.ordered()
            .into_iter()
            .map(|idx| &self.patterns[idx].pattern)
            .filter(|p| !active_only || p.is_active)
            .collect()
    }

    /// Decides which pattern would identify `description` without touching
    /// usage counters.
    pub fn best_match(&self, description: &str) -> Option<MerchantMatch> {
        let trimmed = description.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lowered = description.to_lowercase();

        let mut best: Option<MerchantMatch> = None;
        for idx in self.ordered() {
            let entry = &self.patterns[idx];
            if !entry.pattern.is_active || !entry.regex.is_match(&lowered) {
                continue;
            }
            let mut confidence = entry.pattern.confidence;
            if is_exact_match(&entry.pattern.pattern, trimmed) {
                confidence = (confidence + EXACT_MATCH_BONUS).min(1.0);
            }
            if best.as_ref().map_or(true, |b| confidence > b.confidence) {
                best = Some(MerchantMatch {
                    pattern_id: entry.pattern.id.clone(),
                    merchant: entry.pattern.name.clone(),
                    confidence,
                });
            }
        }
        best
    }

    /// Merchant name for `description`, or [`UNKNOWN_MERCHANT`].
    /// A successful match bumps the winning pattern's usage counter.
    pub fn extract_merchant(&mut self, description: &str) -> String {
        let Some(hit) = self.best_match(description) else {
            return UNKNOWN_MERCHANT.to_string();
        };
        if let Some(idx) = self.position(&hit.pattern_id) {
            self.patterns[idx].pattern.usage_count += 1;
        }
        debug!(merchant = %hit.merchant, confidence = hit.confidence, "extracted merchant");
        hit.merchant
    }

    pub fn stats(&self) -> PatternStats {
        let active: Vec<&MerchantPattern> = self.list(true);
        let average_confidence = if active.is_empty() {
            0.0
        } else {
            active.iter().map(|p| p.confidence).sum::<f32>() / active.len() as f32
        };

        let mut by_usage: Vec<&MerchantPattern> = self.list(false);
        by_usage.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));

        PatternStats {
            total_patterns: self.patterns.len(),
            active_patterns: active.len(),
            total_usage: self.patterns.iter().map(|e| e.pattern.usage_count).sum(),
            average_confidence,
            top_performing: by_usage
                .into_iter()
                .take(TOP_PATTERNS)
                .map(|p| PatternUsage {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    usage_count: p.usage_count,
                    success_rate: p.success_rate,
                    confidence: p.confidence,
                })
                .collect(),
        }
    }

    /// Runs extraction for `description` and reports it alongside the named pattern.
    pub fn test_pattern(&mut self, id: &str, description: &str) -> Result<PatternTest> {
        let name = self
            .get(id)
            .map(|p| p.name.clone())
            .ok_or_else(|| EngineError::PatternNotFound(id.to_string()))?;
        let extracted = self.extract_merchant(description);
        Ok(PatternTest {
            pattern_id: id.to_string(),
            pattern_name: name,
            description: description.to_string(),
            matched: extracted != UNKNOWN_MERCHANT,
            extracted_merchant: extracted,
        })
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.patterns.iter().position(|e| e.pattern.id == id)
    }

    fn ordered(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.patterns.len()).collect();
        order.sort_by(|&a, &b| {
            let (a, b) = (&self.patterns[a].pattern, &self.patterns[b].pattern);
            b.usage_count.cmp(&a.usage_count).then(
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        order
    }
}

/// Pattern text with any surrounding `\b` anchors removed equals the
/// description, ignoring case.
fn is_exact_match(pattern: &str, description: &str) -> bool {
    let mut text = pattern.trim();
    while let Some(rest) = text.strip_prefix(r"\b") {
        text = rest;
    }
    while let Some(rest) = text.strip_suffix(r"\b") {
        text = rest;
    }
    text.trim().to_lowercase() == description.to_lowercase()
}
