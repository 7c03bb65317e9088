use labelwise_core::Record;
use labelwise_engine::recommend::{group_confidence, suggest};
use labelwise_engine::{
    evaluate, learn_from_labeled, validate, AmountCondition, Conditions, Engine, PatternDraft,
    PatternStore, RuleDraft, UNKNOWN_MERCHANT,
};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::str::FromStr;

fn from_json(value: Value) -> Record {
    let map: Map<String, Value> = match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    };
    Record::from_fields(&map)
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[test]
fn scenario_a_suggests_coffee_for_unlabeled_starbucks() {
    let records = vec![
        from_json(json!({"id": 1, "description": "STARBUCKS #123", "amount": 5.75, "label": "coffee"})),
        from_json(json!({"id": 2, "description": "STARBUCKS #456", "amount": 6.10, "label": "coffee"})),
        from_json(json!({"id": 3, "description": "STARBUCKS #789", "amount": 5.50})),
    ];
    let mut patterns = PatternStore::new();
    patterns
        .create(PatternDraft::new("STARBUCKS", "STARBUCKS").with_confidence(0.8))
        .unwrap();

    let out = suggest(&mut patterns, &records, 0.3);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].record_id, "3");
    assert_eq!(out[0].suggested_label_id, "coffee");
    assert!(out[0].confidence >= 0.3);
    assert!((out[0].confidence - 0.72).abs() < 1e-6);
    assert_eq!(out[0].similar_records, vec!["1", "2"]);
}

#[test]
fn scenario_b_min_greater_than_max_is_invalid() {
    let rule = RuleDraft::new("backwards", "x")
        .with_conditions(Conditions {
            amount: Some(AmountCondition {
                exact: None,
                min: Some(d("10")),
                max: Some(d("5")),
            }),
            ..Conditions::default()
        })
        .into_rule();
    let v = validate(&rule);
    assert!(!v.is_valid);
    assert!(v
        .errors
        .iter()
        .any(|e| e.contains("cannot be greater than maximum")));
}

#[test]
fn scenario_c_unconfigured_description_is_unknown() {
    let mut patterns = PatternStore::new();
    assert_eq!(patterns.extract_merchant("AMAZON.COM*MK1AB2"), UNKNOWN_MERCHANT);
}

#[test]
fn scenario_d_apply_touches_only_matching_records() {
    let mut engine = Engine::new();
    let rule = engine
        .rules
        .create(RuleDraft::new("rent", "housing").with_conditions(Conditions {
            description: Some("rent".to_string()),
            ..Conditions::default()
        }))
        .unwrap();

    let mut records: Vec<Record> = (0..10)
        .map(|i| {
            let description = if i % 4 == 0 { "MONTHLY RENT" } else { "GROCERIES" };
            from_json(json!({"id": format!("t{i}"), "description": description, "amount": "10"}))
        })
        .collect();
    let before = records.clone();

    let outcome = engine.apply(&rule.id, &mut records, None).unwrap();
    assert_eq!(outcome.applied, 3);

    for (i, (after, before)) in records.iter().zip(&before).enumerate() {
        if i % 4 == 0 {
            assert_eq!(after.label(), Some("housing"));
        } else {
            assert_eq!(after, before);
        }
    }
    assert_eq!(engine.rules.get(&rule.id).unwrap().match_count, 3);
}

#[test]
fn extraction_is_deterministic() {
    let mut patterns = PatternStore::new();
    for (name, pattern, confidence) in [
        ("Coffee", "coffee", 0.6),
        ("Starbucks", "starbucks", 0.8),
        ("Sb", "sb", 0.8),
    ] {
        patterns
            .create(PatternDraft::new(name, pattern).with_confidence(confidence))
            .unwrap();
    }
    for description in ["STARBUCKS COFFEE", "SB COFFEE", "coffee", "nothing"] {
        let first = patterns.best_match(description);
        let again = patterns.best_match(description);
        assert_eq!(first, again);
    }
}

#[test]
fn evaluate_matched_conditions_reflect_checks() {
    let mut patterns = PatternStore::new();
    let rule = RuleDraft::new("mixed", "x")
        .with_conditions(Conditions {
            description: Some("rent".to_string()),
            amount: Some(AmountCondition {
                exact: None,
                min: Some(d("100")),
                max: Some(d("2000")),
            }),
            ..Conditions::default()
        })
        .with_confidence(0.6)
        .into_rule();

    let hit = from_json(json!({"id": "a", "description": "RENT", "amount": "1500"}));
    let m = evaluate(&rule, &hit, &mut patterns).unwrap().unwrap();
    let tags: Vec<String> = m.matched_conditions.iter().map(|t| t.to_string()).collect();
    assert_eq!(tags, vec!["description", "amount_min", "amount_max"]);
    assert!(m.confidence <= 0.6);

    let miss = from_json(json!({"id": "b", "description": "FOOD", "amount": "5000"}));
    let m = evaluate(&rule, &miss, &mut patterns).unwrap().unwrap();
    let tags: Vec<String> = m.matched_conditions.iter().map(|t| t.to_string()).collect();
    assert_eq!(tags, vec!["amount_min"]);

    let none = from_json(json!({"id": "c", "description": "FOOD"}));
    assert!(evaluate(&rule, &none, &mut patterns).unwrap().is_none());
}

#[test]
fn empty_rule_never_validates() {
    let rule = RuleDraft::new("empty", "x").into_rule();
    let v = validate(&rule);
    assert!(!v.is_valid);
    assert!(!v.errors.is_empty());
}

#[test]
fn recommendation_confidence_monotonic_in_consistency() {
    for size in [2, 5, 10, 20] {
        let mut last = f32::MIN;
        for agreeing in 1..=size {
            let c = group_confidence(agreeing as f32 / size as f32, size);
            assert!(c >= last);
            last = c;
        }
    }
}

#[test]
fn learning_needs_three_examples() {
    let mut patterns = PatternStore::new();
    patterns.create(PatternDraft::new("Netflix", "netflix")).unwrap();
    let labeled = |id: &str| {
        from_json(json!({"id": id, "description": "NETFLIX MONTHLY PLAN", "amount": "15.99", "label": "subscriptions"}))
    };

    let two = vec![labeled("1"), labeled("2")];
    assert!(learn_from_labeled(&mut patterns, &two).is_empty());

    let three = vec![labeled("1"), labeled("2"), labeled("3")];
    let learned = learn_from_labeled(&mut patterns, &three);
    assert_eq!(learned.len(), 1);
    assert_eq!(learned[0].pattern, r"\b(?:monthly|netflix|plan)\b");
    assert_eq!(learned[0].category.as_deref(), Some("subscriptions"));
}

#[test]
fn rule_from_record_round_trip_through_engine() {
    let mut engine = Engine::from_toml(
        r#"
        [[patterns]]
        name = "Starbucks"
        pattern = "starbucks"
        "#,
    )
    .unwrap();
    let source = from_json(json!({"id": "r1", "description": "STARBUCKS #123", "amount": "-5.00"}));
    let rule = engine.create_rule_from_record(&source, "coffee", None).unwrap();
    assert_eq!(rule.name, "Auto-rule for Starbucks");

    let mut batch = vec![
        source.clone(),
        from_json(json!({"id": "r2", "description": "STARBUCKS #999", "amount": "-5.10"})),
        from_json(json!({"id": "r3", "description": "SHELL OIL"})),
    ];
    let outcome = engine.apply(&rule.id, &mut batch, None).unwrap();
    assert_eq!(outcome.record_ids, vec!["r1", "r2"]);
    assert!(batch[0].label_confidence.unwrap() <= 0.7);
}

#[test]
fn exact_amount_matches_within_a_cent() {
    let mut patterns = PatternStore::new();
    let rule = RuleDraft::new("rent", "housing")
        .with_conditions(Conditions {
            amount: Some(AmountCondition {
                exact: Some(d("1500.00")),
                min: None,
                max: None,
            }),
            ..Conditions::default()
        })
        .into_rule();

    for amount in ["1500.00", "1499.99", "1500.01"] {
        let record = from_json(json!({"id": amount, "description": "RENT", "amount": amount}));
        let m = evaluate(&rule, &record, &mut patterns).unwrap().unwrap();
        assert_eq!(m.matched_conditions.len(), 1);
        assert_eq!(m.matched_conditions[0].to_string(), "amount_exact");
    }
    let off = from_json(json!({"id": "x", "description": "RENT", "amount": "1500.02"}));
    assert!(evaluate(&rule, &off, &mut patterns).unwrap().is_none());
}

#[test]
fn match_confidence_respects_rule_ceiling() {
    let mut patterns = PatternStore::new();
    patterns.create(PatternDraft::new("Starbucks", "starbucks")).unwrap();
    let records = [
        from_json(json!({"id": "1", "description": "STARBUCKS", "amount": "5", "category": "Food"})),
        from_json(json!({"id": "2", "description": "STARBUCKS COFFEE", "amount": "50"})),
        from_json(json!({"id": "3", "description": "TEA", "category": "Food"})),
    ];
    for ceiling in [0.05, 0.3, 0.5, 0.95, 1.0] {
        let rule = RuleDraft::new("all", "x")
            .with_conditions(Conditions {
                merchant: Some("Starbucks".to_string()),
                description: Some("starbucks".to_string()),
                category: Some("food".to_string()),
                amount: Some(AmountCondition {
                    exact: Some(d("5")),
                    min: Some(d("1")),
                    max: Some(d("10")),
                }),
                ..Conditions::default()
            })
            .with_confidence(ceiling)
            .into_rule();
        for record in &records {
            if let Some(m) = evaluate(&rule, record, &mut patterns).unwrap() {
                assert!(m.confidence <= ceiling);
            }
        }
    }
}
