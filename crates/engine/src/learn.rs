use labelwise_core::text::significant_words;
use labelwise_core::Record;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::patterns::{MerchantPattern, PatternDraft, PatternStore, UNKNOWN_MERCHANT};

/// Examples of one merchant/label pair needed before a pattern is learned.
pub const MIN_GROUP_SIZE: usize = 3;
const MIN_COMMON_WORDS: usize = 2;
const MAX_PATTERN_WORDS: usize = 3;

struct Group {
    merchant: String,
    label: String,
    descriptions: Vec<String>,
}

/// Learns merchant patterns from records that already carry a label.
///
/// Records are grouped by extracted merchant and label; every group with at
/// least [`MIN_GROUP_SIZE`] members whose descriptions share two or more
/// words yields a new pattern, which is stored and returned.
pub fn learn_from_labeled(store: &mut PatternStore, records: &[Record]) -> Vec<MerchantPattern> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for record in records {
        let Some(label) = record.label() else {
            continue;
        };
        let merchant = store.extract_merchant(&record.description);
        if merchant == UNKNOWN_MERCHANT {
            continue;
        }
        let key = (merchant.clone(), label.to_string());
        let idx = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                merchant,
                label: label.to_string(),
                descriptions: Vec::new(),
            });
            groups.len() - 1
        });
        groups[idx].descriptions.push(record.description.clone());
    }

    let mut learned = Vec::new();
    for group in groups {
        let count = group.descriptions.len();
        if count < MIN_GROUP_SIZE {
            continue;
        }
        let Some(pattern) = pattern_from_descriptions(&group.descriptions) else {
            continue;
        };
        let draft = PatternDraft::new(&group.merchant, pattern)
            .with_category(&group.label)
            .with_confidence(learned_confidence(count));
        match store.create(draft) {
            Ok(p) => learned.push(p),
            Err(e) => warn!(merchant = %group.merchant, "skipping learned pattern: {e}"),
        }
    }

    info!(learned = learned.len(), "learned merchant patterns");
    learned
}

/// `min(0.9, 0.5 + 0.1 * members)`
pub fn learned_confidence(members: usize) -> f32 {
    (0.5 + 0.1 * members as f32).min(0.9)
}

/// Word-bounded alternation of the words most descriptions share, or `None`
/// when fewer than two such words exist.
pub fn pattern_from_descriptions(descriptions: &[String]) -> Option<String> {
    if descriptions.len() < MIN_COMMON_WORDS {
        return None;
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for description in descriptions {
        let unique: HashSet<String> = significant_words(description).into_iter().collect();
        for word in unique {
            *counts.entry(word).or_default() += 1;
        }
    }

    let threshold = (descriptions.len() as f64 * 0.5).max(MIN_COMMON_WORDS as f64);
    let mut common: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count as f64 >= threshold)
        .collect();
    if common.len() < MIN_COMMON_WORDS {
        return None;
    }

    common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let parts: Vec<String> = common
        .iter()
        .take(MAX_PATTERN_WORDS)
        .map(|(word, _)| regex::escape(word))
        .collect();
    Some(format!(r"\b(?:{})\b", parts.join("|")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(id: &str, description: &str, label: &str) -> Record {
        let mut r = Record::new(id, 2);
        r.description = description.to_string();
        r.label_id = Some(label.to_string());
        r
    }

    fn descs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn starbucks_store() -> PatternStore {
        let mut store = PatternStore::new();
        store.create(PatternDraft::new("Starbucks", "starbucks")).unwrap();
        store
    }

    #[test]
    fn pattern_from_common_words() {
        let pattern = pattern_from_descriptions(&descs(&[
            "STARBUCKS STORE 1",
            "STARBUCKS STORE 22",
            "STARBUCKS STORE 333",
        ]))
        .unwrap();
        assert_eq!(pattern, r"\b(?:starbucks|store)\b");
    }

    #[test]
    fn pattern_requires_two_common_words() {
        assert_eq!(
            pattern_from_descriptions(&descs(&["STARBUCKS 1", "STARBUCKS 2", "STARBUCKS 3"])),
            None
        );
    }

    #[test]
    fn pattern_keeps_three_most_frequent_words() {
        let pattern = pattern_from_descriptions(&descs(&[
            "alpha beta gamma delta",
            "alpha beta gamma delta",
            "alpha beta gamma",
            "alpha beta",
        ]))
        .unwrap();
        assert_eq!(pattern, r"\b(?:alpha|beta|gamma)\b");
    }

    #[test]
    fn confidence_grows_with_examples_and_caps() {
        assert!((learned_confidence(3) - 0.8).abs() < 1e-6);
        assert_eq!(learned_confidence(10), 0.9);
    }

    #[test]
    fn learns_from_three_consistent_examples() {
        let mut store = starbucks_store();
        let records = vec![
            labeled("1", "STARBUCKS STORE 1", "coffee"),
            labeled("2", "STARBUCKS STORE 2", "coffee"),
            labeled("3", "STARBUCKS STORE 3", "coffee"),
        ];
        let learned = learn_from_labeled(&mut store, &records);
        assert_eq!(learned.len(), 1);
        let p = &learned[0];
        assert_eq!(p.name, "Starbucks");
        assert_eq!(p.category.as_deref(), Some("coffee"));
        assert_eq!(p.pattern, r"\b(?:starbucks|store)\b");
        assert!((p.confidence - 0.8).abs() < 1e-6);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn two_examples_never_learn() {
        let mut store = starbucks_store();
        let records = vec![
            labeled("1", "STARBUCKS STORE 1", "coffee"),
            labeled("2", "STARBUCKS STORE 2", "coffee"),
        ];
        assert!(learn_from_labeled(&mut store, &records).is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn groups_split_by_label() {
        let mut store = starbucks_store();
        let records = vec![
            labeled("1", "STARBUCKS STORE 1", "coffee"),
            labeled("2", "STARBUCKS STORE 2", "coffee"),
            labeled("3", "STARBUCKS STORE 3", "snacks"),
            labeled("4", "STARBUCKS STORE 4", "snacks"),
        ];
        assert!(learn_from_labeled(&mut store, &records).is_empty());
    }

    #[test]
    fn unlabeled_and_unknown_records_are_skipped() {
        let mut store = starbucks_store();
        let mut unlabeled = labeled("4", "STARBUCKS STORE 4", "");
        unlabeled.label_id = None;
        let records = vec![
            labeled("1", "PEETS COFFEE BAR", "coffee"),
            labeled("2", "PEETS COFFEE BAR", "coffee"),
            labeled("3", "PEETS COFFEE BAR", "coffee"),
            unlabeled,
        ];
        assert!(learn_from_labeled(&mut store, &records).is_empty());
    }
}
