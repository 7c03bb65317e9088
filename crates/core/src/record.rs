use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::money::parse_amount;
use crate::period::parse_date;

/// One transaction row after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    /// 1-based spreadsheet row; the header occupies row 1.
    pub row_number: usize,
    pub date: Option<NaiveDate>,
    pub description: String,
    pub amount: Option<Decimal>,
    pub balance: Option<Decimal>,
    pub category: Option<String>,
    pub account: Option<String>,
    pub reference: Option<String>,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
    pub normalized_description: Option<String>,
    pub merchant_name: Option<String>,
    pub label_id: Option<String>,
    pub label_confidence: Option<f32>,
}

impl Record {
    pub fn new(id: impl Into<String>, row_number: usize) -> Self {
        Record {
            id: id.into(),
            row_number,
            date: None,
            description: String::new(),
            amount: None,
            balance: None,
            category: None,
            account: None,
            reference: None,
            is_valid: true,
            validation_errors: Vec::new(),
            normalized_description: None,
            merchant_name: None,
            label_id: None,
            label_confidence: None,
        }
    }

    pub fn is_labeled(&self) -> bool {
        self.label().is_some()
    }

    pub fn label(&self) -> Option<&str> {
        self.label_id.as_deref().filter(|l| !l.is_empty())
    }

    pub fn invalidate(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.validation_errors.push(message.into());
    }

    pub fn apply_label(&mut self, label_id: &str, confidence: f32) {
        self.label_id = Some(label_id.to_string());
        self.label_confidence = Some(confidence.clamp(0.0, 1.0));
    }

    /// Builds a record from a loosely-typed field map.
    ///
    /// Both key casings used by older exports are understood (`description`
    /// and `Description`, ...); the lower-case key wins when both are set.
    /// Unparseable dates and amounts invalidate the record instead of failing.
    pub fn from_fields(fields: &Map<String, Value>) -> Record {
        let id = text_field(fields, &["id"]).unwrap_or_default();
        let row_number = fields
            .get("row_number")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(0);
        let mut record = Record::new(id, row_number);

        record.description = text_field(fields, &["description", "Description"])
            .map(|d| d.trim().to_string())
            .unwrap_or_default();
        record.category = text_field(fields, &["category", "Category"]);
        record.account = text_field(fields, &["account", "Account"]);
        record.reference = text_field(fields, &["reference", "Reference"]);
        record.merchant_name = text_field(fields, &["merchant_name"]);
        record.normalized_description = text_field(fields, &["normalized_description"]);
        record.label_id = text_field(fields, &["label", "label_id"]).filter(|l| !l.is_empty());
        record.label_confidence = fields
            .get("label_confidence")
            .and_then(Value::as_f64)
            .map(|c| c as f32);

        if let Some(raw) = text_field(fields, &["amount", "Amount"]) {
            match parse_amount(&raw) {
                Ok(amount) => record.amount = Some(amount),
                Err(e) => record.invalidate(e.to_string()),
            }
        }
        if let Some(raw) = text_field(fields, &["balance", "Balance"]) {
            match parse_amount(&raw) {
                Ok(balance) => record.balance = Some(balance),
                Err(e) => record.invalidate(e.to_string()),
            }
        }
        if let Some(raw) = text_field(fields, &["date", "Date"]).filter(|d| !d.trim().is_empty()) {
            match parse_date(&raw) {
                Ok(date) => record.date = Some(date),
                Err(e) => record.invalidate(e.to_string()),
            }
        }

        record
    }
}

/// First non-null value among `keys`, rendered as text.
fn text_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .find(|v| !v.is_null())
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}
