use serde::Serialize;
use tracing::{debug, warn};

use crate::db::ReviewStore;
use crate::error::{InputError, StoreError};
use crate::loader::ReviewDataset;
use crate::models::{ClientRecord, FeatureAttribution, TransactionId, TransactionRecord};
use crate::session::parse_transaction_id;

pub const TOP_ATTRIBUTIONS: i64 = 10;

/// One independently loaded part of the detail panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Section<T> {
    Available(T),
    Missing,
    Unavailable(String),
}

impl<T> Section<T> {
    pub fn as_available(&self) -> Option<&T> {
        match self {
            Section::Available(value) => Some(value),
            _ => None,
        }
    }

    fn from_lookup(lookup: Result<Option<T>, StoreError>, what: &str, id: i64) -> Self {
        match lookup {
            Ok(Some(value)) => Section::Available(value),
            Ok(None) => {
                debug!(id, "no {what} record");
                Section::Missing
            }
            Err(err) => {
                warn!(id, error = %err, "failed to load {what} record");
                Section::Unavailable(err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Pushes the prediction towards fraud.
    TowardsFraud,
    /// Pushes the prediction away from fraud.
    AwayFromFraud,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedAttribution {
    pub rank: usize,
    pub feature_name: String,
    pub shap_value: f64,
    pub direction: Direction,
}

impl RankedAttribution {
    fn new(rank: usize, row: FeatureAttribution) -> Self {
        let direction = if row.shap_value > 0.0 {
            Direction::TowardsFraud
        } else if row.shap_value < 0.0 {
            Direction::AwayFromFraud
        } else {
            Direction::Neutral
        };
        Self {
            rank,
            feature_name: row.feature_name,
            shap_value: row.shap_value,
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailView {
    pub transaction_id: TransactionId,
    pub client: Section<ClientRecord>,
    pub transaction: Section<TransactionRecord>,
    pub attributions: Section<Vec<RankedAttribution>>,
}

/// Validate a raw selection and resolve its detail panel.
pub async fn resolve_raw(
    store: &dyn ReviewStore,
    dataset: Option<&ReviewDataset>,
    raw: &str,
) -> Result<DetailView, InputError> {
    let transaction_id = parse_transaction_id(raw)?;
    Ok(resolve(store, dataset, transaction_id).await)
}

/// Resolve client, transaction and top attributions for one transaction.
/// Each part degrades on its own; the view itself never fails.
pub async fn resolve(
    store: &dyn ReviewStore,
    dataset: Option<&ReviewDataset>,
    transaction_id: TransactionId,
) -> DetailView {
    let transaction = Section::from_lookup(
        store.transaction(transaction_id).await,
        "transaction",
        transaction_id,
    );

    let client_id = match dataset.and_then(|d| d.pending_case(transaction_id)) {
        Some(case) => Some(case.client_id),
        None => match store.fraud_case(transaction_id).await {
            Ok(Some(case)) => Some(case.client_id),
            Ok(None) => transaction.as_available().map(|record| record.client_id),
            Err(err) => {
                warn!(transaction_id, error = %err, "failed to look up fraud case");
                transaction.as_available().map(|record| record.client_id)
            }
        },
    };

    let client = match client_id {
        Some(client_id) => {
            Section::from_lookup(store.client(client_id).await, "client", client_id)
        }
        None => Section::Missing,
    };

    let attributions = match store.top_attributions(transaction_id, TOP_ATTRIBUTIONS).await {
        Ok(rows) if rows.is_empty() => Section::Missing,
        Ok(rows) => Section::Available(
            rows.into_iter()
                .enumerate()
                .map(|(index, row)| RankedAttribution::new(index + 1, row))
                .collect(),
        ),
        Err(err) => {
            warn!(transaction_id, error = %err, "failed to load attributions");
            Section::Unavailable(err.to_string())
        }
    };

    DetailView {
        transaction_id,
        client,
        transaction,
        attributions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;
    use crate::memory::{MemoryReviewStore, ReadKind};
    use crate::models::{FraudCase, OperatorMarker, Page};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[tokio::test]
    async fn resolves_all_sections() {
        let store = MemoryReviewStore::demo(today());
        let dataset = loader::load(&store, Page::default(), today()).await.unwrap();
        let view = resolve(&store, Some(&dataset), 101).await;

        assert_eq!(view.client.as_available().unwrap().full_name, "Avery Lee");
        assert_eq!(view.transaction.as_available().unwrap().amount, 1_249.90);
        let ranked = view.attributions.as_available().unwrap();
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].rank, 1);
        assert!(ranked
            .windows(2)
            .all(|w| w[0].shap_value.abs() >= w[1].shap_value.abs()));
    }

    #[tokio::test]
    async fn missing_client_keeps_other_sections() {
        let store = MemoryReviewStore::demo(today());
        let view = resolve(&store, None, 109).await;

        assert_eq!(view.client, Section::Missing);
        assert!(view.transaction.as_available().is_some());
        assert!(view.attributions.as_available().is_some());
    }

    #[tokio::test]
    async fn missing_transaction_and_attributions_are_empty_states() {
        let store = MemoryReviewStore::demo(today());

        let view = resolve(&store, None, 110).await;
        assert_eq!(view.transaction, Section::Missing);
        assert!(view.client.as_available().is_some());

        let view = resolve(&store, None, 114).await;
        assert_eq!(view.attributions, Section::Missing);
    }

    #[tokio::test]
    async fn attribution_sign_is_preserved() {
        let store = MemoryReviewStore::new();
        store
            .insert_case(FraudCase {
                transaction_id: 7,
                client_id: 1,
                model_fraud_marker: true,
                operator_fraud_marker: OperatorMarker::Undecided,
                model_decision_timestamp: Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap(),
                operator_decision_timestamp: None,
                operator_id: None,
            })
            .await;
        for (name, value) in [("velocity_1h", -0.42), ("new_device", 0.3), ("hour_of_day", 0.0)] {
            store
                .insert_attribution(FeatureAttribution {
                    transaction_id: 7,
                    feature_name: name.to_string(),
                    shap_value: value,
                })
                .await;
        }

        let view = resolve(&store, None, 7).await;
        let ranked = view.attributions.as_available().unwrap();
        assert_eq!(ranked[0].feature_name, "velocity_1h");
        assert_eq!(ranked[0].shap_value, -0.42);
        assert_eq!(ranked[0].direction, Direction::AwayFromFraud);
        assert_eq!(ranked[1].direction, Direction::TowardsFraud);
        assert_eq!(ranked[2].direction, Direction::Neutral);
    }

    #[tokio::test]
    async fn malformed_selection_is_rejected_before_lookup() {
        let store = MemoryReviewStore::demo(today());
        let err = resolve_raw(&store, None, "101 OR 1=1").await.unwrap_err();
        assert!(matches!(err, InputError::MalformedTransactionId { .. }));
    }

    #[tokio::test]
    async fn unknown_transaction_renders_empty_sections() {
        let store = MemoryReviewStore::demo(today());
        let view = resolve_raw(&store, None, "999999").await.unwrap();
        assert_eq!(view.client, Section::Missing);
        assert_eq!(view.transaction, Section::Missing);
        assert_eq!(view.attributions, Section::Missing);
    }

    #[tokio::test]
    async fn failed_client_lookup_degrades_only_its_section() {
        let store = MemoryReviewStore::demo(today());
        store.fail_reads(ReadKind::Client).await;

        let view = resolve(&store, None, 101).await;

        assert!(matches!(view.client, Section::Unavailable(_)));
        assert!(view.transaction.as_available().is_some());
        assert_eq!(view.attributions.as_available().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn failed_attribution_and_transaction_lookups_are_unavailable() {
        let store = MemoryReviewStore::demo(today());
        store.fail_reads(ReadKind::Attributions).await;
        store.fail_reads(ReadKind::Transaction).await;

        let view = resolve(&store, None, 101).await;

        assert!(matches!(view.attributions, Section::Unavailable(_)));
        assert!(matches!(view.transaction, Section::Unavailable(_)));
        assert_eq!(view.client.as_available().unwrap().client_id, 1);
    }

    #[tokio::test]
    async fn failed_case_lookup_falls_back_to_transaction_client() {
        let store = MemoryReviewStore::demo(today());
        store.fail_reads(ReadKind::FraudCase).await;

        let view = resolve(&store, None, 103).await;

        assert_eq!(view.client.as_available().unwrap().client_id, 3);
    }
}
