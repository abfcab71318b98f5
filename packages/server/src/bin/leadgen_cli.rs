//! Operator CLI for the lead pipeline
//!
//! Every command prints one JSON document on stdout; logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leadgen_core::common::{MemberId, SearchId};
use leadgen_core::config::Config;
use leadgen_core::domains::credits::models::REASON_GRANT;
use leadgen_core::domains::credits::{grant_credits, refund_lead_credit};
use leadgen_core::domains::pipeline::PipelineHandler;
use leadgen_core::domains::searches::activities::{create_search, get_search_status};
use leadgen_core::kernel::jobs::{sweep_stale_jobs, RunnerConfig};
use leadgen_core::kernel::{connect, ServerDeps};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "leadgen_cli")]
#[command(about = "Lead pipeline operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,

    /// Create a search and enqueue its discovery job
    CreateSearch {
        #[arg(long)]
        owner: MemberId,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 25)]
        max_results: i32,
    },

    /// Show a search's status and counters
    Status { search_id: SearchId },

    /// Add credits to an owner's wallet
    Grant {
        #[arg(long)]
        owner: MemberId,
        #[arg(long)]
        amount: i32,
        #[arg(long, default_value = REASON_GRANT)]
        reason: String,
    },

    /// Refund the credit charged for one lead
    Refund {
        #[arg(long)]
        owner: MemberId,
        #[arg(long)]
        search: SearchId,
        #[arg(long)]
        lead_key: String,
    },

    /// Fail jobs whose lease expired and schedule their retries
    SweepStale,
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,leadgen_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let pool = connect(&config).await?;
    let deps = Arc::new(ServerDeps::without_collaborators(pool));

    match cli.command {
        Commands::Migrate => {
            sqlx::migrate!("./migrations")
                .run(&deps.db_pool)
                .await
                .context("Failed to run migrations")?;
            output(&json!({ "success": true }))
        }
        Commands::CreateSearch {
            owner,
            query,
            max_results,
        } => {
            let search = create_search(owner, &query, max_results, &deps).await?;
            output(&search)
        }
        Commands::Status { search_id } => {
            let status = get_search_status(search_id, &deps).await?;
            output(&status)
        }
        Commands::Grant {
            owner,
            amount,
            reason,
        } => {
            let wallet = grant_credits(owner, amount, &reason, &deps.db_pool).await?;
            output(&wallet)
        }
        Commands::Refund {
            owner,
            search,
            lead_key,
        } => {
            let outcome = refund_lead_credit(owner, search, &lead_key, &deps.db_pool).await?;
            output(&outcome)
        }
        Commands::SweepStale => {
            let runner_config = RunnerConfig::from_config(&config);
            let swept = sweep_stale_jobs(
                deps,
                Arc::new(PipelineHandler),
                runner_config.retry_policy,
                runner_config.lease_timeout,
            )
            .await?;
            output(&json!({ "swept": swept }))
        }
    }
}
