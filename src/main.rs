use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commit;
mod config;
mod db;
mod demo;
mod detail;
mod error;
mod loader;
mod memory;
mod models;
mod report;
mod session;
mod stats;

use config::{Backend, Config, RawConfig};
use db::{PgReviewStore, ReviewStore, WritePolicy};
use memory::MemoryReviewStore;
use models::Page;
use session::ReviewSession;

#[derive(Parser)]
#[command(name = "fraud-review-desk")]
#[command(about = "Operator review desk for model-flagged fraudulent transactions", long_about = None)]
struct Cli {
    /// Use the in-memory demo dataset instead of Postgres
    #[arg(long, global = true)]
    demo: bool,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    database_url: Option<String>,

    #[arg(long, default_value_t = 5, global = true)]
    max_connections: u32,

    /// Identity recorded on every committed decision
    #[arg(long, env = "FRAUD_DESK_OPERATOR_ID", global = true)]
    operator_id: Option<i64>,

    #[arg(long, env = "FRAUD_DESK_OPERATOR_NAME", global = true)]
    operator_name: Option<String>,

    #[arg(long, env = "FRAUD_DESK_MAX_CONCURRENT_WRITES", default_value_t = 4, global = true)]
    max_concurrent_writes: usize,

    #[arg(long, env = "FRAUD_DESK_WRITE_TIMEOUT_SECS", default_value_t = 10, global = true)]
    write_timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a realistic demo dataset
    Seed,
    /// List transactions waiting for review
    Pending {
        #[arg(long, default_value_t = Page::DEFAULT_LIMIT)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Record operator verdicts and commit them
    Review {
        /// Verdict as <transaction_id>=<fraud|legit|undecided>; repeatable
        #[arg(long = "decide", value_name = "TX=VERDICT")]
        decisions: Vec<String>,
        /// CSV with columns transaction_id,operator_fraud_marker
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Remove a row from the session before committing; repeatable
        #[arg(long = "drop", value_name = "TX")]
        dropped: Vec<String>,
        /// Refuse to overwrite cases another operator already resolved
        #[arg(long)]
        guard_pending: bool,
        #[arg(long, default_value_t = Page::DEFAULT_LIMIT)]
        limit: i64,
        #[arg(long)]
        json: bool,
    },
    /// Show the 7-day trend and today's operator coverage
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Show client, transaction and feature attribution for one transaction
    Detail {
        #[arg(long)]
        transaction_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Render the full review screen as Markdown
    Report {
        #[arg(long)]
        transaction_id: Option<String>,
        #[arg(long, default_value_t = Page::DEFAULT_LIMIT)]
        limit: i64,
        #[arg(long, default_value = "fraud-review.md")]
        out: PathBuf,
    },
}

/// Apply one operator edit, adding the row when it is not on the loaded page.
fn edit(session: &mut ReviewSession, transaction_id: i64, marker: models::OperatorMarker) {
    if session.add_row(transaction_id) {
        warn!(transaction_id, "transaction is not on the loaded pending page; adding it");
    }
    session.set(transaction_id, marker);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_raw(RawConfig {
        demo: cli.demo,
        database_url: cli.database_url,
        max_connections: cli.max_connections,
        operator_id: cli.operator_id,
        operator_name: cli.operator_name,
        max_concurrent_writes: cli.max_concurrent_writes,
        write_timeout_secs: cli.write_timeout_secs,
    })?;
    let today = Utc::now().date_naive();

    let (store, pool): (Arc<dyn ReviewStore>, _) = match &config.backend {
        Backend::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = db::connect(database_url, *max_connections).await?;
            let store = Arc::new(PgReviewStore::new(pool.clone())) as Arc<dyn ReviewStore>;
            (store, Some(pool))
        }
        Backend::Demo => {
            info!("using in-memory demo dataset");
            let store = Arc::new(MemoryReviewStore::demo(today)) as Arc<dyn ReviewStore>;
            (store, None)
        }
    };

    match cli.command {
        Commands::InitDb => match &pool {
            Some(pool) => {
                db::init_db(pool).await?;
                println!("Schema ready.");
            }
            None => println!("Demo store needs no schema."),
        },
        Commands::Seed => match &pool {
            Some(pool) => {
                db::seed(pool, today).await?;
                println!("Seed data inserted.");
            }
            None => println!("Demo store is already seeded."),
        },
        Commands::Pending { limit, offset } => {
            let page = Page {
                limit: limit.max(1),
                offset: offset.max(0),
            };
            let pending = store
                .pending_cases(page)
                .await
                .context("failed to load pending fraud cases")?;
            let mut output = String::new();
            report::render_pending(&mut output, &pending);
            print!("{output}");
        }
        Commands::Review {
            decisions,
            csv,
            dropped,
            guard_pending,
            limit,
            json,
        } => {
            let operator = config.operator()?;
            let page = Page::first(limit);
            let dataset = loader::load(store.as_ref(), page, today).await?;
            let mut session = ReviewSession::seeded(&dataset.pending);

            for raw in &decisions {
                let (transaction_id, marker) = session::parse_decision(raw)?;
                edit(&mut session, transaction_id, marker);
            }
            if let Some(path) = &csv {
                for (transaction_id, marker) in session::read_decisions_csv(path)? {
                    edit(&mut session, transaction_id, marker);
                }
            }
            for raw in &dropped {
                session.remove_row(session::parse_transaction_id(raw)?);
            }

            if session.decided_count() == 0 {
                println!("No decisions to submit.");
                return Ok(());
            }
            info!(
                decided = session.decided_count(),
                rows = session.len(),
                "submitting review session"
            );

            let policy = if guard_pending {
                WritePolicy::OnlyIfPending
            } else {
                WritePolicy::LastWriteWins
            };
            let (outcome, refreshed) = commit::submit_and_refresh(
                Arc::clone(&store),
                operator,
                &mut session,
                config.commit,
                policy,
                page,
                today,
            )
            .await?;

            if json {
                let payload = serde_json::json!({
                    "commit": outcome,
                    "still_pending": refreshed.pending.len(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                let mut output = String::new();
                report::render_commit_report(&mut output, &outcome);
                print!("{output}");
                println!("{} transactions still pending review.", refreshed.pending.len());
            }
        }
        Commands::Stats { json } => {
            let statistics = loader::load_statistics(store.as_ref(), today).await?;
            if json {
                let payload = serde_json::json!({
                    "date": statistics.loaded_for,
                    "trend": statistics.trend,
                    "coverage": stats::coverage_view(statistics.coverage.as_ref()),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                let mut output = String::new();
                report::render_trend(&mut output, &statistics.trend);
                output.push('\n');
                report::render_coverage(&mut output, statistics.coverage.as_ref());
                print!("{output}");
            }
        }
        Commands::Detail {
            transaction_id,
            json,
        } => {
            let view = detail::resolve_raw(store.as_ref(), None, &transaction_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                let mut output = String::new();
                report::render_detail(&mut output, &view);
                print!("{output}");
            }
        }
        Commands::Report {
            transaction_id,
            limit,
            out,
        } => {
            let dataset = loader::load(store.as_ref(), Page::first(limit), today).await?;
            let view = match transaction_id.as_deref() {
                Some(raw) => Some(detail::resolve_raw(store.as_ref(), Some(&dataset), raw).await?),
                None => None,
            };
            let report = report::build_report(config.operator()?, &dataset, view.as_ref());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
