use labelwise_core::Record;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::Result;
use crate::patterns::{PatternStore, UNKNOWN_MERCHANT};
use crate::rules::RuleStore;

const MIN_LABELED: usize = 2;
const MIN_GROUP_SIZE: usize = 2;
const CONSISTENCY_WEIGHT: f32 = 0.6;
const SPECIFICITY_WEIGHT: f32 = 0.4;
/// Group size at which merchant specificity saturates.
const SPECIFICITY_SATURATION: f32 = 10.0;
const MAX_EVIDENCE: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub record_id: String,
    pub suggested_label_id: String,
    pub confidence: f32,
    pub reason: String,
    pub rule_id: Option<String>,
    pub pattern_matches: Vec<String>,
    pub similar_records: Vec<String>,
}

/// `0.6 * consistency + 0.4 * min(1, group_size / 10)`
pub fn group_confidence(label_consistency: f32, group_size: usize) -> f32 {
    let specificity = (group_size as f32 / SPECIFICITY_SATURATION).min(1.0);
    CONSISTENCY_WEIGHT * label_consistency + SPECIFICITY_WEIGHT * specificity
}

/// Suggests labels for unlabeled records from how other records of the same
/// merchant were labeled. Strongest suggestions first.
pub fn suggest(
    patterns: &mut PatternStore,
    records: &[Record],
    min_confidence: f32,
) -> Vec<Recommendation> {
    if records.iter().filter(|r| r.is_labeled()).count() < MIN_LABELED {
        return Vec::new();
    }

    let mut groups: Vec<(String, Vec<&Record>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let merchant = patterns.extract_merchant(&record.description);
        let idx = *index.entry(merchant.clone()).or_insert_with(|| {
            groups.push((merchant, Vec::new()));
            groups.len() - 1
        });
        groups[idx].1.push(record);
    }

    let mut out = Vec::new();
    for (merchant, members) in &groups {
        if merchant == UNKNOWN_MERCHANT || members.len() < MIN_GROUP_SIZE {
            continue;
        }
        let labeled: Vec<&Record> = members.iter().copied().filter(|r| r.is_labeled()).collect();
        let Some((label, mode_count)) = mode_label(&labeled) else {
            continue;
        };

        let consistency = mode_count as f32 / labeled.len() as f32;
        let confidence = group_confidence(consistency, members.len());
        if confidence < min_confidence {
            continue;
        }
        let similar: Vec<String> = labeled
            .iter()
            .take(MAX_EVIDENCE)
            .map(|r| r.id.clone())
            .collect();

        for record in members.iter().filter(|r| !r.is_labeled()) {
            out.push(Recommendation {
                record_id: record.id.clone(),
                suggested_label_id: label.to_string(),
                confidence,
                reason: format!(
                    "Pattern analysis: {} similar transactions labeled '{label}'",
                    labeled.len()
                ),
                rule_id: None,
                pattern_matches: vec![merchant.clone()],
                similar_records: similar.clone(),
            });
        }
    }

    sort_by_confidence(&mut out);
    debug!(suggestions = out.len(), "generated pattern suggestions");
    out
}

/// Most frequent label and its count; ties go to the label seen first.
fn mode_label<'a>(labeled: &[&'a Record]) -> Option<(&'a str, usize)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for label in labeled.iter().copied().filter_map(Record::label) {
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((label, 1)),
        }
    }
    counts
        .into_iter()
        .fold(None, |best, (label, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((label, n)),
        })
}

/// One suggestion per unlabeled record from the strongest active rule that
/// matches it.
pub fn from_rules(
    rules: &RuleStore,
    patterns: &mut PatternStore,
    records: &[Record],
    min_confidence: f32,
) -> Result<Vec<Recommendation>> {
    let unlabeled: Vec<Record> = records.iter().filter(|r| !r.is_labeled()).cloned().collect();
    let matches = rules.match_all(patterns, &unlabeled, None)?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in matches {
        if m.confidence < min_confidence || !seen.insert(m.record_id.clone()) {
            continue;
        }
        let rule = rules.get(&m.rule_id)?;
        out.push(Recommendation {
            record_id: m.record_id,
            suggested_label_id: rule.label_id.clone(),
            confidence: m.confidence,
            reason: format!("Rule '{}' matched", rule.name),
            rule_id: Some(rule.id.clone()),
            pattern_matches: m.matched_conditions.iter().map(|t| t.to_string()).collect(),
            similar_records: Vec::new(),
        });
    }
    Ok(out)
}

/// Keeps at most `limit` recommendations.
pub fn limit(mut recommendations: Vec<Recommendation>, limit: usize) -> Vec<Recommendation> {
    recommendations.truncate(limit);
    recommendations
}

fn sort_by_confidence(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
