//! Deterministic demo dataset, shared by `seed` and the in-memory store.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::models::{
    ClientRecord, CoverageSnapshot, FeatureAttribution, FraudCase, OperatorMarker,
    TransactionRecord,
};

const FEATURES: [&str; 12] = [
    "amount_zscore",
    "merchant_risk_score",
    "hour_of_day",
    "distance_from_home_km",
    "txn_count_24h",
    "new_device",
    "card_present",
    "account_age_days",
    "failed_logins_7d",
    "foreign_currency",
    "chargeback_history",
    "velocity_1h",
];

// (transaction_id, client_id, days_ago, hour, model flag, operator verdict, amount, merchant, category, channel)
#[allow(clippy::type_complexity)]
const CASES: [(i64, i64, i64, u32, bool, OperatorMarker, f64, &str, &str, &str); 14] = [
    (101, 1, 0, 9, true, OperatorMarker::Undecided, 1_249.90, "Nordic Electronics", "electronics", "online"),
    (102, 2, 0, 10, true, OperatorMarker::Undecided, 86.15, "City Fuel 24", "fuel", "pos"),
    (103, 3, 1, 14, true, OperatorMarker::Undecided, 4_980.00, "Atlas Jewelers", "jewelry", "online"),
    (104, 1, 1, 22, true, OperatorMarker::Fraud, 730.00, "Quickwire Transfers", "money_transfer", "online"),
    (105, 4, 2, 3, true, OperatorMarker::Undecided, 312.40, "Lumen Games", "digital_goods", "online"),
    (106, 5, 2, 11, false, OperatorMarker::Undecided, 42.00, "Green Grocer", "grocery", "pos"),
    (107, 2, 3, 16, true, OperatorMarker::Legit, 189.99, "SkyHigh Air", "travel", "online"),
    (108, 3, 4, 1, true, OperatorMarker::Fraud, 2_150.00, "Atlas Jewelers", "jewelry", "online"),
    (109, 99, 4, 8, true, OperatorMarker::Undecided, 640.00, "Harbor Pawn", "pawn", "pos"),
    (110, 4, 5, 19, true, OperatorMarker::Undecided, 75.50, "Metro Taxi", "transport", "mobile"),
    (111, 5, 6, 12, true, OperatorMarker::Fraud, 999.00, "Lumen Games", "digital_goods", "online"),
    (112, 1, 6, 15, false, OperatorMarker::Undecided, 18.20, "Corner Cafe", "restaurants", "pos"),
    (113, 2, 9, 13, true, OperatorMarker::Fraud, 3_400.00, "Quickwire Transfers", "money_transfer", "online"),
    (114, 3, 12, 9, true, OperatorMarker::Undecided, 55.00, "Green Grocer", "grocery", "pos"),
];

/// Transactions whose ledger record is deliberately absent.
const MISSING_TRANSACTION_RECORDS: [i64; 1] = [110];

/// Transactions without attribution rows.
const MISSING_ATTRIBUTIONS: [i64; 1] = [114];

#[derive(Debug, Clone)]
pub struct DemoData {
    pub clients: Vec<ClientRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub cases: Vec<FraudCase>,
    pub attributions: Vec<FeatureAttribution>,
    pub coverage: Vec<CoverageSnapshot>,
}

fn at(day: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour % 24, 0, 0).unwrap_or(NaiveTime::MIN);
    day.and_time(time).and_utc()
}

fn date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn client(
    client_id: i64,
    full_name: &str,
    birth_date: Option<NaiveDate>,
    region: &str,
    segment: &str,
    registered_at: Option<NaiveDate>,
) -> ClientRecord {
    ClientRecord {
        client_id,
        full_name: full_name.to_string(),
        birth_date,
        region: Some(region.to_string()),
        segment: Some(segment.to_string()),
        registered_at,
    }
}

/// Signed, deterministic attribution for one feature of one transaction.
fn attribution_value(transaction_id: i64, feature_index: usize) -> f64 {
    let raw = (transaction_id * 37 + feature_index as i64 * 53) % 201 - 100;
    let damping = 1.0 + feature_index as f64 * 0.35;
    (raw as f64 / 250.0 / damping * 1000.0).round() / 1000.0
}

impl DemoData {
    pub fn build(today: NaiveDate) -> Self {
        let clients = vec![
            client(1, "Avery Lee", date(1988, 4, 12), "North", "retail", date(2019, 3, 1)),
            client(2, "Jules Moreno", date(1975, 11, 2), "West", "premium", date(2015, 6, 20)),
            client(3, "Kiara Patel", date(1999, 1, 30), "South", "retail", date(2024, 9, 9)),
            client(4, "Mateo Silva", date(1962, 7, 8), "East", "private", date(2010, 1, 15)),
            client(5, "Noor Haddad", date(2001, 5, 17), "North", "student", date(2025, 2, 4)),
        ];

        let mut transactions = Vec::new();
        let mut cases = Vec::new();
        let mut attributions = Vec::new();

        for (tx_id, client_id, days_ago, hour, model, verdict, amount, merchant, category, channel) in
            CASES
        {
            let day = today - Duration::days(days_ago);
            let occurred_at = at(day, hour);
            let decided = verdict.is_decided();

            cases.push(FraudCase {
                transaction_id: tx_id,
                client_id,
                model_fraud_marker: model,
                operator_fraud_marker: verdict,
                model_decision_timestamp: occurred_at + Duration::minutes(2),
                operator_decision_timestamp: decided.then(|| occurred_at + Duration::hours(3)),
                operator_id: decided.then_some(1),
            });

            if !MISSING_TRANSACTION_RECORDS.contains(&tx_id) {
                transactions.push(TransactionRecord {
                    transaction_id: tx_id,
                    client_id,
                    amount,
                    currency: "EUR".to_string(),
                    merchant: Some(merchant.to_string()),
                    merchant_category: Some(category.to_string()),
                    channel: Some(channel.to_string()),
                    occurred_at,
                });
            }

            if !MISSING_ATTRIBUTIONS.contains(&tx_id) {
                for (index, feature) in FEATURES.iter().enumerate() {
                    attributions.push(FeatureAttribution {
                        transaction_id: tx_id,
                        feature_name: feature.to_string(),
                        shap_value: attribution_value(tx_id, index),
                    });
                }
            }
        }

        let coverage = vec![
            CoverageSnapshot {
                date: today - Duration::days(1),
                to_check: 12,
                checked: 12,
                fraud_confirmed: 5,
            },
            CoverageSnapshot {
                date: today,
                to_check: 10,
                checked: 7,
                fraud_confirmed: 4,
            },
        ];

        Self {
            clients,
            transactions,
            cases,
            attributions,
            coverage,
        }
    }
}
