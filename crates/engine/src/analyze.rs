use chrono::NaiveDate;
use labelwise_core::money::{checked_sum, mean, round_cents};
use labelwise_core::text::content_tokens;
use labelwise_core::{DateRange, Record};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::info;

use crate::patterns::{PatternStore, UNKNOWN_MERCHANT};

const TOP_MERCHANTS: usize = 10;
const TOP_RECURRING: usize = 10;
const TOP_WORDS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantCount {
    pub merchant: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MerchantAnalysis {
    pub top_merchants: Vec<MerchantCount>,
    pub total_unique_merchants: usize,
    pub most_common_merchant: Option<String>,
}

/// Histogram buckets. `under_10` holds positive amounts only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRanges {
    pub under_10: usize,
    #[serde(rename = "10_to_50")]
    pub from_10_to_50: usize,
    #[serde(rename = "50_to_100")]
    pub from_50_to_100: usize,
    #[serde(rename = "100_to_500")]
    pub from_100_to_500: usize,
    #[serde(rename = "500_to_1000")]
    pub from_500_to_1000: usize,
    pub over_1000: usize,
}

impl AmountRanges {
    fn add(&mut self, amount: Decimal) {
        let bucket = match amount {
            a if a >= Decimal::from(1000) => &mut self.over_1000,
            a if a >= Decimal::from(500) => &mut self.from_500_to_1000,
            a if a >= Decimal::from(100) => &mut self.from_100_to_500,
            a if a >= Decimal::from(50) => &mut self.from_50_to_100,
            a if a >= Decimal::from(10) => &mut self.from_10_to_50,
            a if a > Decimal::ZERO => &mut self.under_10,
            _ => return,
        };
        *bucket += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountSummary {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub avg_amount: Decimal,
    pub median_amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmountAnalysis {
    pub recurring_amounts: Vec<Decimal>,
    pub amount_ranges: AmountRanges,
    pub statistics: Option<AmountSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordCount {
    pub word: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptionAnalysis {
    pub common_words: Vec<WordCount>,
    pub total_descriptions: usize,
    pub avg_description_length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountStatistics {
    pub count: usize,
    pub min: Decimal,
    pub max: Decimal,
    pub average: Decimal,
    pub median: Decimal,
    /// `None` when the total does not fit in a `Decimal`.
    pub total_volume: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateStatistics {
    pub count: usize,
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
    pub date_range_days: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub amounts: Option<AmountStatistics>,
    pub dates: Option<DateStatistics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub total_records: usize,
    pub labeled_records: usize,
    pub merchant_patterns: MerchantAnalysis,
    pub amount_patterns: AmountAnalysis,
    pub description_patterns: DescriptionAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<BatchStatistics>,
}

/// Aggregate view of a whole batch, labeled or not.
pub fn analyze_patterns(
    patterns: &mut PatternStore,
    records: &[Record],
    include_statistics: bool,
) -> PatternAnalysis {
    let analysis = PatternAnalysis {
        total_records: records.len(),
        labeled_records: records.iter().filter(|r| r.is_labeled()).count(),
        merchant_patterns: analyze_merchants(patterns, records),
        amount_patterns: analyze_amounts(records),
        description_patterns: analyze_descriptions(records),
        statistics: include_statistics.then(|| batch_statistics(records)),
    };
    info!(records = records.len(), "analyzed batch patterns");
    analysis
}

/// Counts in first-seen order, then sorted by count descending. The sort is
/// stable so ties stay in first-seen order.
fn ranked<T: Eq + Hash + Clone>(items: impl IntoIterator<Item = T>) -> Vec<(T, usize)> {
    let mut counts: Vec<(T, usize)> = Vec::new();
    let mut index: HashMap<T, usize> = HashMap::new();
    for item in items {
        match index.get(&item) {
            Some(&idx) => counts[idx].1 += 1,
            None => {
                index.insert(item.clone(), counts.len());
                counts.push((item, 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

pub fn analyze_merchants(patterns: &mut PatternStore, records: &[Record]) -> MerchantAnalysis {
    let merchants: Vec<String> = records
        .iter()
        .map(|r| patterns.extract_merchant(&r.description))
        .filter(|m| m != UNKNOWN_MERCHANT)
        .collect();

    let counts = ranked(merchants);
    MerchantAnalysis {
        total_unique_merchants: counts.len(),
        most_common_merchant: counts.first().map(|(m, _)| m.clone()),
        top_merchants: counts
            .into_iter()
            .take(TOP_MERCHANTS)
            .map(|(merchant, count)| MerchantCount { merchant, count })
            .collect(),
    }
}

pub fn analyze_amounts(records: &[Record]) -> AmountAnalysis {
    let amounts: Vec<Decimal> = records.iter().filter_map(|r| r.amount).collect();
    if amounts.is_empty() {
        return AmountAnalysis::default();
    }

    let mut recurring: Vec<Decimal> = ranked(amounts.iter().map(|a| round_cents(*a).normalize()))
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(amount, _)| amount)
        .collect();
    recurring.sort_by(|a, b| b.cmp(a));
    recurring.truncate(TOP_RECURRING);

    let mut ranges = AmountRanges::default();
    for amount in &amounts {
        ranges.add(*amount);
    }

    let mut sorted = amounts.clone();
    sorted.sort();

    AmountAnalysis {
        recurring_amounts: recurring,
        amount_ranges: ranges,
        statistics: Some(AmountSummary {
            min_amount: sorted[0],
            max_amount: sorted[sorted.len() - 1],
            avg_amount: mean(&amounts).unwrap_or_default(),
            median_amount: sorted[sorted.len() / 2],
        }),
    }
}

pub fn analyze_descriptions(records: &[Record]) -> DescriptionAnalysis {
    let descriptions: Vec<&str> = records
        .iter()
        .map(|r| r.description.as_str())
        .filter(|d| !d.is_empty())
        .collect();
    if descriptions.is_empty() {
        return DescriptionAnalysis::default();
    }

    let words = ranked(descriptions.iter().flat_map(|d| content_tokens(d)));
    let total_length: usize = descriptions.iter().map(|d| d.chars().count()).sum();

    DescriptionAnalysis {
        common_words: words
            .into_iter()
            .take(TOP_WORDS)
            .map(|(word, count)| WordCount { word, count })
            .collect(),
        total_descriptions: descriptions.len(),
        avg_description_length: total_length as f64 / descriptions.len() as f64,
    }
}

pub fn batch_statistics(records: &[Record]) -> BatchStatistics {
    let mut amounts: Vec<Decimal> = records.iter().filter_map(|r| r.amount).collect();
    let dates: Vec<NaiveDate> = records.iter().filter_map(|r| r.date).collect();

    let amount_stats = if amounts.is_empty() {
        None
    } else {
        amounts.sort();
        Some(AmountStatistics {
            count: amounts.len(),
            min: amounts[0],
            max: amounts[amounts.len() - 1],
            average: mean(&amounts).unwrap_or_default(),
            median: amounts[amounts.len() / 2],
            total_volume: checked_sum(&amounts),
        })
    };

    let date_stats = match (dates.iter().min(), dates.iter().max()) {
        (Some(&earliest), Some(&latest)) => Some(DateStatistics {
            count: dates.len(),
            earliest,
            latest,
            date_range_days: DateRange::new(Some(earliest), Some(latest))
                .days()
                .unwrap_or_default(),
        }),
        _ => None,
    };

    BatchStatistics {
        amounts: amount_stats,
        dates: date_stats,
    }
}
