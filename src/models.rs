use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

pub type TransactionId = i64;
pub type ClientId = i64;

/// The acting operator, passed into every write. Never a global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operator {
    pub id: i64,
    pub name: String,
}

/// Operator verdict on a flagged transaction. `Undecided` maps to SQL NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorMarker {
    Undecided,
    Fraud,
    Legit,
}

impl OperatorMarker {
    pub fn from_column(value: Option<bool>) -> Self {
        match value {
            None => OperatorMarker::Undecided,
            Some(true) => OperatorMarker::Fraud,
            Some(false) => OperatorMarker::Legit,
        }
    }

    pub fn as_column(self) -> Option<bool> {
        match self {
            OperatorMarker::Undecided => None,
            OperatorMarker::Fraud => Some(true),
            OperatorMarker::Legit => Some(false),
        }
    }

    pub fn is_decided(self) -> bool {
        self != OperatorMarker::Undecided
    }
}

impl fmt::Display for OperatorMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperatorMarker::Undecided => "undecided",
            OperatorMarker::Fraud => "fraud",
            OperatorMarker::Legit => "legit",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudCase {
    pub transaction_id: TransactionId,
    pub client_id: ClientId,
    pub model_fraud_marker: bool,
    pub operator_fraud_marker: OperatorMarker,
    pub model_decision_timestamp: DateTime<Utc>,
    pub operator_decision_timestamp: Option<DateTime<Utc>>,
    pub operator_id: Option<i64>,
}

impl FraudCase {
    pub fn is_pending(&self) -> bool {
        self.model_fraud_marker && self.operator_fraud_marker == OperatorMarker::Undecided
    }
}

/// One page of the pending-review set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 100;

    pub fn first(limit: i64) -> Self {
        Self {
            limit: limit.max(1),
            offset: 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(Self::DEFAULT_LIMIT)
    }
}

/// Wide aggregate row as returned by the trend query: one row per day that had activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyFraudCounts {
    pub date: NaiveDate,
    pub model_fraud_count: i64,
    pub operator_fraud_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMaker {
    Model,
    Operator,
}

impl DecisionMaker {
    pub const ALL: [DecisionMaker; 2] = [DecisionMaker::Model, DecisionMaker::Operator];
}

impl fmt::Display for DecisionMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionMaker::Model => f.write_str("model"),
            DecisionMaker::Operator => f.write_str("operator"),
        }
    }
}

/// Long-form trend row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub decision_maker: DecisionMaker,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageSnapshot {
    pub date: NaiveDate,
    pub to_check: i64,
    pub checked: i64,
    pub fraud_confirmed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureAttribution {
    pub transaction_id: TransactionId,
    pub feature_name: String,
    pub shap_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientRecord {
    pub client_id: ClientId,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub region: Option<String>,
    pub segment: Option<String>,
    pub registered_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub client_id: ClientId,
    pub amount: f64,
    pub currency: String,
    pub merchant: Option<String>,
    pub merchant_category: Option<String>,
    pub channel: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn case(model: bool, operator: OperatorMarker) -> FraudCase {
        FraudCase {
            transaction_id: 1,
            client_id: 1,
            model_fraud_marker: model,
            operator_fraud_marker: operator,
            model_decision_timestamp: Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
            operator_decision_timestamp: None,
            operator_id: None,
        }
    }

    #[test]
    fn marker_maps_to_nullable_column() {
        for marker in [
            OperatorMarker::Undecided,
            OperatorMarker::Fraud,
            OperatorMarker::Legit,
        ] {
            assert_eq!(OperatorMarker::from_column(marker.as_column()), marker);
        }
        assert_eq!(OperatorMarker::Undecided.as_column(), None);
    }

    #[test]
    fn only_model_flagged_undecided_cases_are_pending() {
        assert!(case(true, OperatorMarker::Undecided).is_pending());
        assert!(!case(true, OperatorMarker::Fraud).is_pending());
        assert!(!case(true, OperatorMarker::Legit).is_pending());
        assert!(!case(false, OperatorMarker::Undecided).is_pending());
    }

    #[test]
    fn page_limit_is_at_least_one() {
        assert_eq!(Page::first(0).limit, 1);
        assert_eq!(Page::default().limit, Page::DEFAULT_LIMIT);
    }
}
