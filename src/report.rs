use std::fmt::Write;

use crate::commit::{CommitReport, RowOutcome};
use crate::detail::{DetailView, Direction, Section};
use crate::loader::ReviewDataset;
use crate::models::{CoverageSnapshot, FraudCase, Operator, TrendPoint};
use crate::stats::{self, CoverageView};

const BAR_WIDTH: usize = 24;

fn optional(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

pub fn render_pending(output: &mut String, pending: &[FraudCase]) {
    if pending.is_empty() {
        let _ = writeln!(output, "No transactions are waiting for review.");
        return;
    }

    let _ = writeln!(
        output,
        "| transaction_id | client_id | model_fraud_marker | operator_fraud_marker | flagged_at |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|");
    for case in pending {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            case.transaction_id,
            case.client_id,
            case.model_fraud_marker,
            case.operator_fraud_marker,
            case.model_decision_timestamp.format("%Y-%m-%d %H:%M")
        );
    }
}

pub fn render_trend(output: &mut String, trend: &[TrendPoint]) {
    let groups = stats::group_trend(trend);
    let max = groups
        .iter()
        .map(|group| group.model.max(group.operator))
        .max()
        .unwrap_or(0) as f64;

    if max == 0.0 {
        let _ = writeln!(output, "No fraud flags in the last {} days.", groups.len());
    }

    for group in &groups {
        let _ = writeln!(
            output,
            "- {} model    {:<width$} {}",
            group.date,
            "#".repeat(stats::bar(group.model as f64, max, BAR_WIDTH)),
            group.model,
            width = BAR_WIDTH
        );
        let _ = writeln!(
            output,
            "- {} operator {:<width$} {}",
            group.date,
            "=".repeat(stats::bar(group.operator as f64, max, BAR_WIDTH)),
            group.operator,
            width = BAR_WIDTH
        );
    }
}

pub fn render_coverage(output: &mut String, coverage: Option<&CoverageSnapshot>) {
    match stats::coverage_view(coverage) {
        CoverageView::NoData => {
            let _ = writeln!(output, "No operator activity recorded for today.");
        }
        CoverageView::NoActivity { date } => {
            let _ = writeln!(output, "Nothing was due for review on {date}.");
        }
        CoverageView::Figures(figures) => {
            let _ = writeln!(output, "- Checked: {}", figures.checked);
            let _ = writeln!(output, "- Remaining: {}", figures.remaining);
            if let Some(pct) = figures.coverage_pct {
                let _ = writeln!(output, "- Checked transactions: {pct:.1}%");
            }
            match figures.confirmation_pct {
                Some(pct) => {
                    let _ = writeln!(output, "- Confirmed as fraud: {pct:.1}%");
                }
                None => {
                    let _ = writeln!(output, "- Confirmed as fraud: no checks yet");
                }
            }
        }
    }
}

pub fn render_detail(output: &mut String, view: &DetailView) {
    let _ = writeln!(output, "## Transaction {}", view.transaction_id);
    let _ = writeln!(output);
    let _ = writeln!(output, "### Client");
    match &view.client {
        Section::Available(client) => {
            let _ = writeln!(output, "- Client id: {}", client.client_id);
            let _ = writeln!(output, "- Name: {}", client.full_name);
            let _ = writeln!(
                output,
                "- Birth date: {}",
                client
                    .birth_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            let _ = writeln!(output, "- Region: {}", optional(&client.region));
            let _ = writeln!(output, "- Segment: {}", optional(&client.segment));
        }
        Section::Missing => {
            let _ = writeln!(output, "No client data.");
        }
        Section::Unavailable(reason) => {
            let _ = writeln!(output, "Client data unavailable: {reason}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Transaction");
    match &view.transaction {
        Section::Available(record) => {
            let _ = writeln!(output, "- Amount: {:.2} {}", record.amount, record.currency);
            let _ = writeln!(output, "- Merchant: {}", optional(&record.merchant));
            let _ = writeln!(output, "- Category: {}", optional(&record.merchant_category));
            let _ = writeln!(output, "- Channel: {}", optional(&record.channel));
            let _ = writeln!(
                output,
                "- Occurred at: {}",
                record.occurred_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        Section::Missing => {
            let _ = writeln!(output, "No transaction data.");
        }
        Section::Unavailable(reason) => {
            let _ = writeln!(output, "Transaction data unavailable: {reason}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Feature attribution (SHAP)");
    match &view.attributions {
        Section::Available(rows) => {
            let max = rows
                .iter()
                .map(|row| row.shap_value.abs())
                .fold(0.0_f64, f64::max);
            for row in rows {
                let cells = stats::bar(row.shap_value.abs(), max, BAR_WIDTH);
                let (glyph, label) = match row.direction {
                    Direction::TowardsFraud => ('+', "towards fraud"),
                    Direction::AwayFromFraud => ('-', "away from fraud"),
                    Direction::Neutral => (' ', "neutral"),
                };
                let _ = writeln!(
                    output,
                    "{:>2}. {:<24} {:+.3} {:<width$} {}",
                    row.rank,
                    row.feature_name,
                    row.shap_value,
                    glyph.to_string().repeat(cells),
                    label,
                    width = BAR_WIDTH
                );
            }
        }
        Section::Missing => {
            let _ = writeln!(output, "No attribution data.");
        }
        Section::Unavailable(reason) => {
            let _ = writeln!(output, "Attribution data unavailable: {reason}");
        }
    }
}

pub fn render_commit_report(output: &mut String, report: &CommitReport) {
    let _ = writeln!(
        output,
        "Batch {}: {} written, {} skipped, {} not committed.",
        report.batch_id,
        report.written(),
        report.skipped(),
        report.failed()
    );
    for row in &report.rows {
        let status = match &row.outcome {
            RowOutcome::Written { decided_at } => {
                format!("saved at {}", decided_at.format("%Y-%m-%d %H:%M:%S UTC"))
            }
            RowOutcome::Skipped => "skipped (undecided)".to_string(),
            RowOutcome::NotFound => "not found".to_string(),
            RowOutcome::Conflict => "already resolved by another operator".to_string(),
            RowOutcome::Failed { reason } => format!("failed: {reason}"),
            RowOutcome::TimedOut => "timed out".to_string(),
        };
        let _ = writeln!(output, "- {} -> {}: {}", row.transaction_id, row.marker, status);
    }
}

/// The whole review screen as Markdown.
pub fn build_report(
    operator: &Operator,
    dataset: &ReviewDataset,
    detail: Option<&DetailView>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Fraud Monitoring");
    let _ = writeln!(
        output,
        "Operator: {} (id {}), generated for {}",
        operator.name, operator.id, dataset.loaded_for
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Flagged Transactions Awaiting Review");
    render_pending(&mut output, &dataset.pending);
    if dataset.pending.len() as i64 >= dataset.page.limit {
        let _ = writeln!(
            output,
            "\nShowing {} rows from offset {}; more may be pending.",
            dataset.pending.len(),
            dataset.page.offset
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Fraud Flags per Day");
    render_trend(&mut output, &dataset.trend);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Operator Activity Today");
    render_coverage(&mut output, dataset.coverage.as_ref());

    if let Some(view) = detail {
        let _ = writeln!(output);
        let _ = writeln!(output, "---");
        render_detail(&mut output, view);
    }

    output
}
