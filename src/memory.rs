//! In-memory review store backed by the demo dataset.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::db::{ReviewStore, WritePolicy, WriteResult};
use crate::demo::DemoData;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    ClientId, ClientRecord, CoverageSnapshot, DailyFraudCounts, FeatureAttribution, FraudCase,
    OperatorMarker, Page, TransactionId, TransactionRecord,
};

/// Read paths of the store, used to inject query failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadKind {
    Pending,
    Trend,
    Coverage,
    FraudCase,
    Client,
    Transaction,
    Attributions,
}

#[derive(Default)]
struct State {
    cases: BTreeMap<TransactionId, FraudCase>,
    clients: HashMap<ClientId, ClientRecord>,
    transactions: HashMap<TransactionId, TransactionRecord>,
    attributions: HashMap<TransactionId, Vec<FeatureAttribution>>,
    coverage: HashMap<NaiveDate, CoverageSnapshot>,
    failing_writes: HashSet<TransactionId>,
    failing_reads: HashSet<ReadKind>,
    write_delay: Option<Duration>,
    writes: usize,
}

impl State {
    fn check_read(&self, kind: ReadKind) -> StoreResult<()> {
        if self.failing_reads.contains(&kind) {
            return Err(StoreError::Unavailable(format!("{kind:?} query rejected")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryReviewStore {
    state: RwLock<State>,
}

impl MemoryReviewStore {
    pub fn demo(today: NaiveDate) -> Self {
        Self::from_data(DemoData::build(today))
    }

    pub fn from_data(data: DemoData) -> Self {
        let mut state = State::default();
        for case in data.cases {
            state.cases.insert(case.transaction_id, case);
        }
        for client in data.clients {
            state.clients.insert(client.client_id, client);
        }
        for record in data.transactions {
            state.transactions.insert(record.transaction_id, record);
        }
        for attribution in data.attributions {
            state
                .attributions
                .entry(attribution.transaction_id)
                .or_default()
                .push(attribution);
        }
        for snapshot in data.coverage {
            state.coverage.insert(snapshot.date, snapshot);
        }
        Self {
            state: RwLock::new(state),
        }
    }
}

#[cfg(test)]
impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_case(&self, case: FraudCase) {
        self.state
            .write()
            .await
            .cases
            .insert(case.transaction_id, case);
    }

    pub async fn insert_attribution(&self, attribution: FeatureAttribution) {
        self.state
            .write()
            .await
            .attributions
            .entry(attribution.transaction_id)
            .or_default()
            .push(attribution);
    }

    /// Make every write to `transaction_id` fail.
    pub async fn fail_writes_for(&self, transaction_id: TransactionId) {
        self.state.write().await.failing_writes.insert(transaction_id);
    }

    /// Make every read of `kind` fail.
    pub async fn fail_reads(&self, kind: ReadKind) {
        self.state.write().await.failing_reads.insert(kind);
    }

    /// Stall each write by `delay` before it is applied.
    pub async fn set_write_delay(&self, delay: Option<Duration>) {
        self.state.write().await.write_delay = delay;
    }

    pub async fn case_count(&self) -> usize {
        self.state.read().await.cases.len()
    }

    /// Number of successfully applied writes.
    pub async fn write_count(&self) -> usize {
        self.state.read().await.writes
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn pending_cases(&self, page: Page) -> StoreResult<Vec<FraudCase>> {
        let state = self.state.read().await;
        state.check_read(ReadKind::Pending)?;
        let mut pending: Vec<&FraudCase> =
            state.cases.values().filter(|case| case.is_pending()).collect();
        pending.sort_by(|a, b| {
            a.model_decision_timestamp
                .cmp(&b.model_decision_timestamp)
                .then(a.transaction_id.cmp(&b.transaction_id))
        });

        Ok(pending
            .into_iter()
            .skip(page.offset.max(0) as usize)
            .take(page.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn daily_fraud_counts(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyFraudCounts>> {
        let state = self.state.read().await;
        state.check_read(ReadKind::Trend)?;
        let mut by_day: BTreeMap<NaiveDate, DailyFraudCounts> = BTreeMap::new();

        for case in state.cases.values() {
            let day = case.model_decision_timestamp.date_naive();
            if day < from || day > to {
                continue;
            }
            let entry = by_day.entry(day).or_insert(DailyFraudCounts {
                date: day,
                model_fraud_count: 0,
                operator_fraud_count: 0,
            });
            if case.model_fraud_marker {
                entry.model_fraud_count += 1;
            }
            if case.operator_fraud_marker == OperatorMarker::Fraud {
                entry.operator_fraud_count += 1;
            }
        }

        Ok(by_day.into_values().collect())
    }

    async fn coverage_for(&self, date: NaiveDate) -> StoreResult<Option<CoverageSnapshot>> {
        let state = self.state.read().await;
        state.check_read(ReadKind::Coverage)?;
        Ok(state.coverage.get(&date).cloned())
    }

    async fn fraud_case(&self, transaction_id: TransactionId) -> StoreResult<Option<FraudCase>> {
        let state = self.state.read().await;
        state.check_read(ReadKind::FraudCase)?;
        Ok(state.cases.get(&transaction_id).cloned())
    }

    async fn client(&self, client_id: ClientId) -> StoreResult<Option<ClientRecord>> {
        let state = self.state.read().await;
        state.check_read(ReadKind::Client)?;
        Ok(state.clients.get(&client_id).cloned())
    }

    async fn transaction(
        &self,
        transaction_id: TransactionId,
    ) -> StoreResult<Option<TransactionRecord>> {
        let state = self.state.read().await;
        state.check_read(ReadKind::Transaction)?;
        Ok(state.transactions.get(&transaction_id).cloned())
    }

    async fn top_attributions(
        &self,
        transaction_id: TransactionId,
        limit: i64,
    ) -> StoreResult<Vec<FeatureAttribution>> {
        let state = self.state.read().await;
        state.check_read(ReadKind::Attributions)?;
        let mut rows = state
            .attributions
            .get(&transaction_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by(|a, b| {
            b.shap_value
                .abs()
                .partial_cmp(&a.shap_value.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.feature_name.cmp(&b.feature_name))
        });
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn apply_decision(
        &self,
        transaction_id: TransactionId,
        fraud: bool,
        operator_id: i64,
        policy: WritePolicy,
    ) -> StoreResult<WriteResult> {
        let delay = self.state.read().await.write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if state.failing_writes.contains(&transaction_id) {
            return Err(StoreError::Unavailable(format!(
                "write rejected for transaction {transaction_id}"
            )));
        }

        let Some(case) = state.cases.get_mut(&transaction_id) else {
            return Ok(WriteResult::NotFound);
        };
        if policy == WritePolicy::OnlyIfPending && case.operator_fraud_marker.is_decided() {
            return Ok(WriteResult::AlreadyResolved);
        }

        let decided_at = Utc::now();
        case.operator_fraud_marker = OperatorMarker::from_column(Some(fraud));
        case.operator_decision_timestamp = Some(decided_at);
        case.operator_id = Some(operator_id);
        state.writes += 1;

        Ok(WriteResult::Applied { decided_at })
    }
}
