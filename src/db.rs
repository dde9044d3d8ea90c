use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::demo::DemoData;
use crate::error::StoreResult;
use crate::models::{
    ClientId, ClientRecord, CoverageSnapshot, DailyFraudCounts, FeatureAttribution, FraudCase,
    OperatorMarker, Page, TransactionId, TransactionRecord,
};

const PENDING_CASES_SQL: &str = r#"
    SELECT transaction_id, client_id, model_fraud_marker, operator_fraud_marker,
           model_decision_timestamp, operator_decision_timestamp, operator_id
    FROM transactions.fraud_transactions
    WHERE model_fraud_marker IS TRUE
      AND operator_fraud_marker IS NULL
    ORDER BY model_decision_timestamp, transaction_id
    LIMIT $1 OFFSET $2
"#;

const FRAUD_CASE_SQL: &str = r#"
    SELECT transaction_id, client_id, model_fraud_marker, operator_fraud_marker,
           model_decision_timestamp, operator_decision_timestamp, operator_id
    FROM transactions.fraud_transactions
    WHERE transaction_id = $1
"#;

// Days are UTC calendar days, matching the `today` the caller binds.
const DAILY_FRAUD_COUNTS_SQL: &str = r#"
    SELECT (model_decision_timestamp AT TIME ZONE 'UTC')::date AS date,
           COUNT(*) FILTER (WHERE model_fraud_marker IS TRUE) AS model_fraud_count,
           COUNT(*) FILTER (WHERE operator_fraud_marker IS TRUE) AS operator_fraud_count
    FROM transactions.fraud_transactions
    WHERE (model_decision_timestamp AT TIME ZONE 'UTC')::date BETWEEN $1::date AND $2::date
    GROUP BY 1
    ORDER BY 1
"#;

const COVERAGE_SQL: &str = r#"
    SELECT date, to_check, checked, fraud_confirmed
    FROM operators.operator_stats
    WHERE date = $1
"#;

const CLIENT_SQL: &str = r#"
    SELECT client_id, full_name, birth_date, region, segment, registered_at
    FROM public.clients
    WHERE client_id = $1
"#;

const TRANSACTION_SQL: &str = r#"
    SELECT transaction_id, client_id, amount, currency, merchant, merchant_category,
           channel, occurred_at
    FROM public.transactions
    WHERE transaction_id = $1
"#;

const TOP_ATTRIBUTIONS_SQL: &str = r#"
    SELECT transaction_id, feature_name, shap_value
    FROM public.shap_values
    WHERE transaction_id = $1
    ORDER BY abs(shap_value) DESC, feature_name
    LIMIT $2
"#;

const UPDATE_DECISION_SQL: &str = r#"
    UPDATE transactions.fraud_transactions
    SET operator_fraud_marker = $1,
        operator_decision_timestamp = now(),
        operator_id = $2
    WHERE transaction_id = $3
    RETURNING operator_decision_timestamp
"#;

const UPDATE_PENDING_DECISION_SQL: &str = r#"
    UPDATE transactions.fraud_transactions
    SET operator_fraud_marker = $1,
        operator_decision_timestamp = now(),
        operator_id = $2
    WHERE transaction_id = $3
      AND operator_fraud_marker IS NULL
    RETURNING operator_decision_timestamp
"#;

const CASE_EXISTS_SQL: &str =
    "SELECT EXISTS (SELECT 1 FROM transactions.fraud_transactions WHERE transaction_id = $1)";

/// How a decision write treats a case another operator already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Overwrite unconditionally; repeating a decision refreshes its timestamp.
    #[default]
    LastWriteWins,
    /// Only write while the case is still undecided.
    OnlyIfPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    Applied { decided_at: DateTime<Utc> },
    AlreadyResolved,
    NotFound,
}

/// Read and write surface of the review workflow.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn pending_cases(&self, page: Page) -> StoreResult<Vec<FraudCase>>;

    /// Per-day counts for days in `from..=to` that have at least one case.
    async fn daily_fraud_counts(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyFraudCounts>>;

    async fn coverage_for(&self, date: NaiveDate) -> StoreResult<Option<CoverageSnapshot>>;

    async fn fraud_case(&self, transaction_id: TransactionId) -> StoreResult<Option<FraudCase>>;

    async fn client(&self, client_id: ClientId) -> StoreResult<Option<ClientRecord>>;

    async fn transaction(
        &self,
        transaction_id: TransactionId,
    ) -> StoreResult<Option<TransactionRecord>>;

    async fn top_attributions(
        &self,
        transaction_id: TransactionId,
        limit: i64,
    ) -> StoreResult<Vec<FeatureAttribution>>;

    /// Record one operator verdict. Each call is its own atomic unit.
    async fn apply_decision(
        &self,
        transaction_id: TransactionId,
        fraud: bool,
        operator_id: i64,
        policy: WritePolicy,
    ) -> StoreResult<WriteResult>;
}

/// Connection options with the session pinned to UTC, so `::date` casts and
/// `now()` agree with the UTC `today` computed by the caller.
pub fn connect_options(database_url: &str) -> anyhow::Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(database_url)
        .context("DATABASE_URL is not a valid Postgres connection string")?;
    Ok(options.options([("timezone", "UTC")]))
}

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(connect_options(database_url)?)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<()> {
    let data = DemoData::build(today);
    let mut tx = pool.begin().await?;

    for client in &data.clients {
        sqlx::query(
            r#"
            INSERT INTO public.clients
            (client_id, full_name, birth_date, region, segment, registered_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (client_id) DO UPDATE
            SET full_name = EXCLUDED.full_name, region = EXCLUDED.region,
                segment = EXCLUDED.segment
            "#,
        )
        .bind(client.client_id)
        .bind(&client.full_name)
        .bind(client.birth_date)
        .bind(&client.region)
        .bind(&client.segment)
        .bind(client.registered_at)
        .execute(&mut *tx)
        .await?;
    }

    for record in &data.transactions {
        sqlx::query(
            r#"
            INSERT INTO public.transactions
            (transaction_id, client_id, amount, currency, merchant, merchant_category,
             channel, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(record.transaction_id)
        .bind(record.client_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(&record.merchant)
        .bind(&record.merchant_category)
        .bind(&record.channel)
        .bind(record.occurred_at)
        .execute(&mut *tx)
        .await?;
    }

    for case in &data.cases {
        sqlx::query(
            r#"
            INSERT INTO transactions.fraud_transactions
            (transaction_id, client_id, model_fraud_marker, operator_fraud_marker,
             model_decision_timestamp, operator_decision_timestamp, operator_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(case.transaction_id)
        .bind(case.client_id)
        .bind(case.model_fraud_marker)
        .bind(case.operator_fraud_marker.as_column())
        .bind(case.model_decision_timestamp)
        .bind(case.operator_decision_timestamp)
        .bind(case.operator_id)
        .execute(&mut *tx)
        .await?;
    }

    for attribution in &data.attributions {
        sqlx::query(
            r#"
            INSERT INTO public.shap_values (transaction_id, feature_name, shap_value)
            VALUES ($1, $2, $3)
            ON CONFLICT (transaction_id, feature_name) DO UPDATE
            SET shap_value = EXCLUDED.shap_value
            "#,
        )
        .bind(attribution.transaction_id)
        .bind(&attribution.feature_name)
        .bind(attribution.shap_value)
        .execute(&mut *tx)
        .await?;
    }

    for snapshot in &data.coverage {
        sqlx::query(
            r#"
            INSERT INTO operators.operator_stats (date, to_check, checked, fraud_confirmed)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (date) DO UPDATE
            SET to_check = EXCLUDED.to_check, checked = EXCLUDED.checked,
                fraud_confirmed = EXCLUDED.fraud_confirmed
            "#,
        )
        .bind(snapshot.date)
        .bind(snapshot.to_check)
        .bind(snapshot.checked)
        .bind(snapshot.fraud_confirmed)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(
        cases = data.cases.len(),
        clients = data.clients.len(),
        "seeded demo dataset"
    );
    Ok(())
}

pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn fraud_case_from_row(row: &PgRow) -> Result<FraudCase, sqlx::Error> {
    Ok(FraudCase {
        transaction_id: row.try_get("transaction_id")?,
        client_id: row.try_get("client_id")?,
        model_fraud_marker: row.try_get("model_fraud_marker")?,
        operator_fraud_marker: OperatorMarker::from_column(row.try_get("operator_fraud_marker")?),
        model_decision_timestamp: row.try_get("model_decision_timestamp")?,
        operator_decision_timestamp: row.try_get("operator_decision_timestamp")?,
        operator_id: row.try_get("operator_id")?,
    })
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn pending_cases(&self, page: Page) -> StoreResult<Vec<FraudCase>> {
        let rows = sqlx::query(PENDING_CASES_SQL)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        let mut cases = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            cases.push(fraud_case_from_row(row)?);
        }
        debug!(count = cases.len(), offset = page.offset, "fetched pending cases");
        Ok(cases)
    }

    async fn daily_fraud_counts(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyFraudCounts>> {
        let rows = sqlx::query(DAILY_FRAUD_COUNTS_SQL)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            counts.push(DailyFraudCounts {
                date: row.try_get("date")?,
                model_fraud_count: row.try_get("model_fraud_count")?,
                operator_fraud_count: row.try_get("operator_fraud_count")?,
            });
        }
        Ok(counts)
    }

    async fn coverage_for(&self, date: NaiveDate) -> StoreResult<Option<CoverageSnapshot>> {
        let row = sqlx::query(COVERAGE_SQL)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(CoverageSnapshot {
                date: row.try_get("date")?,
                to_check: row.try_get("to_check")?,
                checked: row.try_get("checked")?,
                fraud_confirmed: row.try_get("fraud_confirmed")?,
            })),
            None => Ok(None),
        }
    }

    async fn fraud_case(&self, transaction_id: TransactionId) -> StoreResult<Option<FraudCase>> {
        let row = sqlx::query(FRAUD_CASE_SQL)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(fraud_case_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn client(&self, client_id: ClientId) -> StoreResult<Option<ClientRecord>> {
        let row = sqlx::query(CLIENT_SQL)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(ClientRecord {
                client_id: row.try_get("client_id")?,
                full_name: row.try_get("full_name")?,
                birth_date: row.try_get("birth_date")?,
                region: row.try_get("region")?,
                segment: row.try_get("segment")?,
                registered_at: row.try_get("registered_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn transaction(
        &self,
        transaction_id: TransactionId,
    ) -> StoreResult<Option<TransactionRecord>> {
        let row = sqlx::query(TRANSACTION_SQL)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(TransactionRecord {
                transaction_id: row.try_get("transaction_id")?,
                client_id: row.try_get("client_id")?,
                amount: row.try_get("amount")?,
                currency: row.try_get("currency")?,
                merchant: row.try_get("merchant")?,
                merchant_category: row.try_get("merchant_category")?,
                channel: row.try_get("channel")?,
                occurred_at: row.try_get("occurred_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn top_attributions(
        &self,
        transaction_id: TransactionId,
        limit: i64,
    ) -> StoreResult<Vec<FeatureAttribution>> {
        let rows = sqlx::query(TOP_ATTRIBUTIONS_SQL)
            .bind(transaction_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut attributions = Vec::with_capacity(rows.len());
        for row in rows {
            attributions.push(FeatureAttribution {
                transaction_id: row.try_get("transaction_id")?,
                feature_name: row.try_get("feature_name")?,
                shap_value: row.try_get("shap_value")?,
            });
        }
        Ok(attributions)
    }

    async fn apply_decision(
        &self,
        transaction_id: TransactionId,
        fraud: bool,
        operator_id: i64,
        policy: WritePolicy,
    ) -> StoreResult<WriteResult> {
        let statement = match policy {
            WritePolicy::LastWriteWins => UPDATE_DECISION_SQL,
            WritePolicy::OnlyIfPending => UPDATE_PENDING_DECISION_SQL,
        };

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(statement)
            .bind(fraud)
            .bind(operator_id)
            .bind(transaction_id)
            .fetch_optional(&mut *tx)
            .await?;

        let result = match updated {
            Some(row) => WriteResult::Applied {
                decided_at: row.try_get("operator_decision_timestamp")?,
            },
            None => {
                let exists: bool = sqlx::query_scalar(CASE_EXISTS_SQL)
                    .bind(transaction_id)
                    .fetch_one(&mut *tx)
                    .await?;
                if exists {
                    WriteResult::AlreadyResolved
                } else {
                    WriteResult::NotFound
                }
            }
        };

        tx.commit().await?;
        Ok(result)
    }
}

/// Lower bound of a trailing window of `days` days ending on `today`.
pub fn window_start(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(days.max(1) - 1)
}
