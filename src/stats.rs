use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{CoverageSnapshot, DecisionMaker, TrendPoint};

/// `numerator / denominator * 100`, rounded to one decimal place.
/// `None` when the denominator is zero or negative.
pub fn percentage(numerator: i64, denominator: i64) -> Option<f64> {
    if denominator <= 0 {
        return None;
    }
    let per_mille = (numerator as f64 * 1000.0) / denominator as f64;
    Some(per_mille.round() / 10.0)
}

/// Share of today's due cases that have been checked.
pub fn coverage_percentage(snapshot: &CoverageSnapshot) -> Option<f64> {
    percentage(snapshot.checked, snapshot.to_check)
}

/// Share of checked cases the operator confirmed as fraud.
pub fn confirmation_percentage(snapshot: &CoverageSnapshot) -> Option<f64> {
    percentage(snapshot.fraud_confirmed, snapshot.checked)
}

/// Display-ready coverage figures. The pie splits `to_check` into checked/remaining.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageFigures {
    pub date: NaiveDate,
    pub checked: i64,
    pub remaining: i64,
    pub coverage_pct: Option<f64>,
    pub confirmation_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CoverageView {
    /// No row for today.
    NoData,
    /// A row exists but nothing was due.
    NoActivity { date: NaiveDate },
    Figures(CoverageFigures),
}

pub fn coverage_view(snapshot: Option<&CoverageSnapshot>) -> CoverageView {
    let Some(snapshot) = snapshot else {
        return CoverageView::NoData;
    };
    if snapshot.to_check <= 0 {
        return CoverageView::NoActivity {
            date: snapshot.date,
        };
    }
    CoverageView::Figures(CoverageFigures {
        date: snapshot.date,
        checked: snapshot.checked,
        remaining: (snapshot.to_check - snapshot.checked).max(0),
        coverage_pct: coverage_percentage(snapshot),
        confirmation_pct: confirmation_percentage(snapshot),
    })
}

/// One group of the grouped bar chart: both series for a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendGroup {
    pub date: NaiveDate,
    pub model: i64,
    pub operator: i64,
}

pub fn group_trend(points: &[TrendPoint]) -> Vec<TrendGroup> {
    let mut groups: BTreeMap<NaiveDate, TrendGroup> = BTreeMap::new();
    for point in points {
        let group = groups.entry(point.date).or_insert(TrendGroup {
            date: point.date,
            model: 0,
            operator: 0,
        });
        match point.decision_maker {
            DecisionMaker::Model => group.model += point.count,
            DecisionMaker::Operator => group.operator += point.count,
        }
    }
    groups.into_values().collect()
}

/// Text bar of `width` cells scaled against `max`.
pub fn bar(value: f64, max: f64, width: usize) -> usize {
    if max <= 0.0 || value <= 0.0 {
        return 0;
    }
    let cells = (value / max * width as f64).round() as usize;
    cells.clamp(1, width)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(to_check: i64, checked: i64, fraud_confirmed: i64) -> CoverageSnapshot {
        CoverageSnapshot {
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            to_check,
            checked,
            fraud_confirmed,
        }
    }

    #[test]
    fn coverage_is_rounded_to_one_decimal() {
        assert_eq!(coverage_percentage(&snapshot(10, 7, 4)), Some(70.0));
        assert_eq!(coverage_percentage(&snapshot(3, 1, 0)), Some(33.3));
        assert_eq!(coverage_percentage(&snapshot(3, 2, 0)), Some(66.7));
    }

    #[test]
    fn confirmation_is_rounded_to_one_decimal() {
        assert_eq!(confirmation_percentage(&snapshot(10, 7, 4)), Some(57.1));
    }

    #[test]
    fn zero_denominators_yield_no_figure() {
        assert_eq!(coverage_percentage(&snapshot(0, 0, 0)), None);
        assert_eq!(confirmation_percentage(&snapshot(5, 0, 0)), None);
    }

    #[test]
    fn coverage_view_distinguishes_empty_states() {
        assert_eq!(coverage_view(None), CoverageView::NoData);
        assert!(matches!(
            coverage_view(Some(&snapshot(0, 0, 0))),
            CoverageView::NoActivity { .. }
        ));
        let CoverageView::Figures(figures) = coverage_view(Some(&snapshot(10, 7, 4))) else {
            panic!("expected figures");
        };
        assert_eq!(figures.remaining, 3);
        assert_eq!(figures.coverage_pct, Some(70.0));
        assert_eq!(figures.confirmation_pct, Some(57.1));
    }

    #[test]
    fn over_checked_day_has_no_negative_remainder() {
        let CoverageView::Figures(figures) = coverage_view(Some(&snapshot(4, 6, 1))) else {
            panic!("expected figures");
        };
        assert_eq!(figures.remaining, 0);
        assert_eq!(figures.coverage_pct, Some(150.0));
    }

    #[test]
    fn trend_groups_pair_both_series() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let points = vec![
            TrendPoint {
                date,
                decision_maker: DecisionMaker::Model,
                count: 5,
            },
            TrendPoint {
                date,
                decision_maker: DecisionMaker::Operator,
                count: 2,
            },
        ];
        assert_eq!(
            group_trend(&points),
            vec![TrendGroup {
                date,
                model: 5,
                operator: 2
            }]
        );
    }

    #[test]
    fn bars_scale_and_keep_nonzero_visible() {
        assert_eq!(bar(0.0, 10.0, 20), 0);
        assert_eq!(bar(10.0, 10.0, 20), 20);
        assert_eq!(bar(0.1, 10.0, 20), 1);
        assert_eq!(bar(5.0, 0.0, 20), 0);
    }
}
