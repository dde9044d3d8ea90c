use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CommitSettings;
use crate::db::{ReviewStore, WritePolicy, WriteResult};
use crate::loader::{self, ReviewDataset};
use crate::models::{Operator, OperatorMarker, Page, TransactionId};
use crate::session::ReviewSession;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Written { decided_at: DateTime<Utc> },
    /// Still undecided at commit time; nothing was written.
    Skipped,
    NotFound,
    /// Another operator resolved the case first (guarded writes only).
    Conflict,
    Failed { reason: String },
    /// The write did not finish within the per-row timeout. The deadline covers
    /// the whole transaction including COMMIT, so a row that timed out while the
    /// server was already committing may still have been written; reload to
    /// see its actual state.
    TimedOut,
}

impl RowOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, RowOutcome::Written { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RowOutcome::Failed { .. } | RowOutcome::TimedOut | RowOutcome::NotFound | RowOutcome::Conflict
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowReport {
    pub transaction_id: TransactionId,
    pub marker: OperatorMarker,
    #[serde(flatten)]
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub batch_id: Uuid,
    pub operator_id: i64,
    pub rows: Vec<RowReport>,
}

impl CommitReport {
    pub fn written(&self) -> usize {
        self.rows.iter().filter(|row| row.outcome.is_written()).count()
    }

    pub fn skipped(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.outcome == RowOutcome::Skipped)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.rows.iter().filter(|row| row.outcome.is_failure()).count()
    }

    pub fn outcome_for(&self, transaction_id: TransactionId) -> Option<&RowOutcome> {
        self.rows
            .iter()
            .find(|row| row.transaction_id == transaction_id)
            .map(|row| &row.outcome)
    }
}

/// Write every decided row of the session, one atomic update per row.
///
/// Rows are written concurrently up to `settings.max_concurrent_writes`, each
/// bounded by `settings.write_timeout`. A failing row never blocks or rolls back
/// the others. Undecided rows are reported as skipped and never reach the store.
pub async fn commit_decisions(
    store: Arc<dyn ReviewStore>,
    operator: &Operator,
    session: &ReviewSession,
    settings: CommitSettings,
    policy: WritePolicy,
) -> CommitReport {
    let batch_id = Uuid::new_v4();
    let rows: Vec<(TransactionId, OperatorMarker)> = session.rows().collect();
    let mut outcomes: Vec<Option<RowOutcome>> = vec![None; rows.len()];

    let permits = Arc::new(Semaphore::new(settings.max_concurrent_writes.max(1)));
    let mut tasks = JoinSet::new();

    for (index, (transaction_id, marker)) in rows.iter().copied().enumerate() {
        let Some(fraud) = marker.as_column() else {
            outcomes[index] = Some(RowOutcome::Skipped);
            continue;
        };

        let store = Arc::clone(&store);
        let permits = Arc::clone(&permits);
        let operator_id = operator.id;
        let timeout = settings.write_timeout;

        tasks.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    return (
                        index,
                        RowOutcome::Failed {
                            reason: err.to_string(),
                        },
                    )
                }
            };
            let write = store.apply_decision(transaction_id, fraud, operator_id, policy);
            let outcome = match tokio::time::timeout(timeout, write).await {
                Ok(Ok(WriteResult::Applied { decided_at })) => RowOutcome::Written { decided_at },
                Ok(Ok(WriteResult::AlreadyResolved)) => RowOutcome::Conflict,
                Ok(Ok(WriteResult::NotFound)) => RowOutcome::NotFound,
                Ok(Err(err)) => RowOutcome::Failed {
                    reason: err.to_string(),
                },
                Err(_) => RowOutcome::TimedOut,
            };
            (index, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(err) => warn!(%batch_id, error = %err, "decision write task aborted"),
        }
    }

    let rows: Vec<RowReport> = rows
        .into_iter()
        .zip(outcomes)
        .map(|((transaction_id, marker), outcome)| {
            let outcome = outcome.unwrap_or_else(|| RowOutcome::Failed {
                reason: "write task aborted".to_string(),
            });
            match &outcome {
                RowOutcome::Written { .. } => {
                    info!(%batch_id, transaction_id, %marker, operator_id = operator.id, "decision committed")
                }
                RowOutcome::Skipped => {}
                other => warn!(%batch_id, transaction_id, outcome = ?other, "decision not committed"),
            }
            RowReport {
                transaction_id,
                marker,
                outcome,
            }
        })
        .collect();

    CommitReport {
        batch_id,
        operator_id: operator.id,
        rows,
    }
}

/// Commit the session, then reload so only still-pending rows remain in it.
pub async fn submit_and_refresh(
    store: Arc<dyn ReviewStore>,
    operator: &Operator,
    session: &mut ReviewSession,
    settings: CommitSettings,
    policy: WritePolicy,
    page: Page,
    today: NaiveDate,
) -> anyhow::Result<(CommitReport, ReviewDataset)> {
    let report = commit_decisions(Arc::clone(&store), operator, session, settings, policy).await;
    let dataset = loader::load(store.as_ref(), page, today).await?;
    session.reseed(&dataset.pending);
    Ok((report, dataset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryReviewStore;
    use crate::models::FraudCase;
    use chrono::TimeZone;
    use std::time::Duration;

    fn operator() -> Operator {
        Operator {
            id: 1,
            name: "Test Operator".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn pending_case(transaction_id: TransactionId) -> FraudCase {
        FraudCase {
            transaction_id,
            client_id: 1,
            model_fraud_marker: true,
            operator_fraud_marker: OperatorMarker::Undecided,
            model_decision_timestamp: Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap(),
            operator_decision_timestamp: None,
            operator_id: None,
        }
    }

    async fn store_with(ids: &[TransactionId]) -> Arc<MemoryReviewStore> {
        let store = Arc::new(MemoryReviewStore::new());
        for id in ids {
            store.insert_case(pending_case(*id)).await;
        }
        store
    }

    fn session(rows: &[(TransactionId, OperatorMarker)]) -> ReviewSession {
        let mut session = ReviewSession::new();
        for (id, marker) in rows {
            session.set(*id, *marker);
        }
        session
    }

    #[tokio::test]
    async fn undecided_rows_are_skipped() {
        let store = store_with(&[101, 102, 103]).await;
        let session = session(&[
            (101, OperatorMarker::Fraud),
            (102, OperatorMarker::Undecided),
            (103, OperatorMarker::Legit),
        ]);

        let report = commit_decisions(
            store.clone(),
            &operator(),
            &session,
            CommitSettings::default(),
            WritePolicy::LastWriteWins,
        )
        .await;

        assert_eq!(store.write_count().await, 2);
        assert_eq!(report.written(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.outcome_for(102), Some(&RowOutcome::Skipped));

        let untouched = store.fraud_case(102).await.unwrap().unwrap();
        assert_eq!(untouched.operator_fraud_marker, OperatorMarker::Undecided);
        assert!(untouched.operator_decision_timestamp.is_none());

        let legit = store.fraud_case(103).await.unwrap().unwrap();
        assert_eq!(legit.operator_fraud_marker, OperatorMarker::Legit);
        assert_eq!(legit.operator_id, Some(1));
    }

    #[tokio::test]
    async fn repeated_commit_overwrites_with_later_timestamp() {
        let store = store_with(&[101]).await;
        let session = session(&[(101, OperatorMarker::Fraud)]);

        let first = commit_decisions(
            store.clone(),
            &operator(),
            &session,
            CommitSettings::default(),
            WritePolicy::LastWriteWins,
        )
        .await;
        let second = commit_decisions(
            store.clone(),
            &operator(),
            &session,
            CommitSettings::default(),
            WritePolicy::LastWriteWins,
        )
        .await;

        let Some(RowOutcome::Written { decided_at: first_at }) = first.outcome_for(101).cloned()
        else {
            panic!("first commit did not write");
        };
        let Some(RowOutcome::Written { decided_at: second_at }) = second.outcome_for(101).cloned()
        else {
            panic!("second commit did not write");
        };
        assert!(second_at >= first_at);

        assert_eq!(store.case_count().await, 1);
        let case = store.fraud_case(101).await.unwrap().unwrap();
        assert_eq!(case.operator_fraud_marker, OperatorMarker::Fraud);
        assert_eq!(case.operator_decision_timestamp, Some(second_at));
    }

    #[tokio::test]
    async fn failing_row_does_not_block_others() {
        let store = store_with(&[101, 103]).await;
        store.fail_writes_for(103).await;
        let mut session = session(&[(101, OperatorMarker::Fraud), (103, OperatorMarker::Legit)]);

        let (report, dataset) = submit_and_refresh(
            store.clone(),
            &operator(),
            &mut session,
            CommitSettings::default(),
            WritePolicy::LastWriteWins,
            Page::default(),
            today(),
        )
        .await
        .unwrap();

        assert!(report.outcome_for(101).unwrap().is_written());
        assert!(matches!(
            report.outcome_for(103),
            Some(RowOutcome::Failed { .. })
        ));

        let pending: Vec<TransactionId> = dataset
            .pending
            .iter()
            .map(|case| case.transaction_id)
            .collect();
        assert_eq!(pending, vec![103]);
        assert_eq!(session.marker(101), None);
        assert_eq!(session.marker(103), Some(OperatorMarker::Legit));
    }

    #[tokio::test]
    async fn slow_write_times_out_alone() {
        let store = store_with(&[101]).await;
        store.set_write_delay(Some(Duration::from_millis(200))).await;
        let session = session(&[(101, OperatorMarker::Fraud)]);
        let settings = CommitSettings {
            max_concurrent_writes: 2,
            write_timeout: Duration::from_millis(20),
        };

        let report = commit_decisions(
            store.clone(),
            &operator(),
            &session,
            settings,
            WritePolicy::LastWriteWins,
        )
        .await;

        assert_eq!(report.outcome_for(101), Some(&RowOutcome::TimedOut));
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn guarded_commit_reports_conflict() {
        let store = store_with(&[101]).await;
        let first = session(&[(101, OperatorMarker::Fraud)]);
        let second = session(&[(101, OperatorMarker::Legit)]);

        commit_decisions(
            store.clone(),
            &operator(),
            &first,
            CommitSettings::default(),
            WritePolicy::OnlyIfPending,
        )
        .await;
        let report = commit_decisions(
            store.clone(),
            &Operator {
                id: 2,
                name: "Second Operator".to_string(),
            },
            &second,
            CommitSettings::default(),
            WritePolicy::OnlyIfPending,
        )
        .await;

        assert_eq!(report.outcome_for(101), Some(&RowOutcome::Conflict));
        let case = store.fraud_case(101).await.unwrap().unwrap();
        assert_eq!(case.operator_fraud_marker, OperatorMarker::Fraud);
        assert_eq!(case.operator_id, Some(1));
    }

    #[tokio::test]
    async fn unknown_transaction_is_reported() {
        let store = store_with(&[]).await;
        let session = session(&[(404, OperatorMarker::Fraud)]);

        let report = commit_decisions(
            store,
            &operator(),
            &session,
            CommitSettings::default(),
            WritePolicy::LastWriteWins,
        )
        .await;

        assert_eq!(report.outcome_for(404), Some(&RowOutcome::NotFound));
    }

    #[tokio::test]
    async fn report_serializes_one_flat_object_per_row() {
        let store = store_with(&[101]).await;
        let session = session(&[(101, OperatorMarker::Fraud), (102, OperatorMarker::Undecided)]);

        let report = commit_decisions(
            store,
            &operator(),
            &session,
            CommitSettings::default(),
            WritePolicy::LastWriteWins,
        )
        .await;
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["operator_id"], 1);
        let rows = value["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["transaction_id"], 101);
        assert_eq!(rows[0]["marker"], "fraud");
        assert_eq!(rows[0]["outcome"], "written");
        assert!(rows[0]["decided_at"].is_string());
        assert_eq!(rows[1]["outcome"], "skipped");
        assert_eq!(rows[1]["marker"], "undecided");
    }
}
