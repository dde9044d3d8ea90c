use std::collections::HashMap;

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::db::{window_start, ReviewStore};
use crate::models::{
    CoverageSnapshot, DailyFraudCounts, DecisionMaker, FraudCase, Page, TrendPoint,
};

pub const TREND_DAYS: i64 = 7;

/// Everything one dashboard pass needs, loaded together.
#[derive(Debug, Clone)]
pub struct ReviewDataset {
    pub loaded_for: NaiveDate,
    pub page: Page,
    pub pending: Vec<FraudCase>,
    pub trend: Vec<TrendPoint>,
    /// `None` means no operator activity has been recorded today.
    pub coverage: Option<CoverageSnapshot>,
}

impl ReviewDataset {
    pub fn pending_case(&self, transaction_id: i64) -> Option<&FraudCase> {
        self.pending
            .iter()
            .find(|case| case.transaction_id == transaction_id)
    }
}

/// Trend and coverage for the statistics panel, without the pending set.
#[derive(Debug, Clone)]
pub struct StatisticsDataset {
    pub loaded_for: NaiveDate,
    pub trend: Vec<TrendPoint>,
    pub coverage: Option<CoverageSnapshot>,
}

/// Run the trend and coverage queries. Any failure aborts the load.
pub async fn load_statistics(
    store: &dyn ReviewStore,
    today: NaiveDate,
) -> anyhow::Result<StatisticsDataset> {
    let from = window_start(today, TREND_DAYS);
    let counts = store
        .daily_fraud_counts(from, today)
        .await
        .context("failed to load fraud trend")?;

    let coverage = store
        .coverage_for(today)
        .await
        .context("failed to load operator coverage")?;

    Ok(StatisticsDataset {
        loaded_for: today,
        trend: melt_trend(&counts, from, TREND_DAYS),
        coverage,
    })
}

/// Run the pending, trend and coverage queries. Any failure aborts the whole load.
pub async fn load(
    store: &dyn ReviewStore,
    page: Page,
    today: NaiveDate,
) -> anyhow::Result<ReviewDataset> {
    let pending = store
        .pending_cases(page)
        .await
        .context("failed to load pending fraud cases")?;

    let statistics = load_statistics(store, today).await?;

    debug!(
        pending = pending.len(),
        has_coverage = statistics.coverage.is_some(),
        "loaded review dataset"
    );

    Ok(ReviewDataset {
        loaded_for: today,
        page,
        pending,
        trend: statistics.trend,
        coverage: statistics.coverage,
    })
}

/// Reshape wide daily counts into long form, one row per day per decision maker.
/// Days without activity get zero counts so the window has no gaps.
pub fn melt_trend(counts: &[DailyFraudCounts], from: NaiveDate, days: i64) -> Vec<TrendPoint> {
    let by_day: HashMap<NaiveDate, &DailyFraudCounts> =
        counts.iter().map(|row| (row.date, row)).collect();

    let mut points = Vec::with_capacity(days.max(0) as usize * DecisionMaker::ALL.len());
    for maker in DecisionMaker::ALL {
        for offset in 0..days.max(0) {
            let date = from + Duration::days(offset);
            let count = by_day
                .get(&date)
                .map(|row| match maker {
                    DecisionMaker::Model => row.model_fraud_count,
                    DecisionMaker::Operator => row.operator_fraud_count,
                })
                .unwrap_or(0);
            points.push(TrendPoint {
                date,
                decision_maker: maker,
                count,
            });
        }
    }
    points
}
