mod analytics;
mod config;
mod connect;
mod constants;
mod db;
mod facebook;
mod metrics;
mod models;
mod store;
mod sync;
mod telemetry;
mod worker;

use clap::{Parser, Subcommand};
use std::error::Error;
use std::sync::Arc;
use tracing::info;

use crate::analytics::{CampaignSummary, PortfolioStats};
use crate::connect::AccountConnector;
use crate::facebook::FacebookAPI;
use crate::metrics::PlaceholderRevenue;
use crate::models::{Identity, Platform};
use crate::store::CampaignStore;
use crate::sync::CampaignSync;

#[derive(Debug, Parser)]
#[command(version, about = "Facebook Ads campaign sync worker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync every connected user on an interval (default)
    Worker,
    /// Sync one user's campaigns now
    Sync {
        #[arg(long, env = "SYNC_AUTH_ID")]
        auth_id: String,
    },
    /// Store a Facebook token and pick the ad account to sync
    Connect {
        #[arg(long)]
        auth_id: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "FACEBOOK_ACCESS_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long)]
        account_id: Option<String>,
    },
    /// Print ROI and risk figures for a user's campaigns
    Stats {
        #[arg(long)]
        auth_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::from_env()?;
    telemetry::init_telemetry()?;

    // Initialize database connection
    let db = Arc::new(db::Database::new(&config.database_url).await?);
    db.migrate().await?;

    let store: Arc<dyn CampaignStore> = db.clone();
    let platform = Arc::new(FacebookAPI::new(config.graph_base_url()));
    let revenue = Arc::new(PlaceholderRevenue {
        payout_per_conversion: config.revenue_per_conversion,
        spend_multiplier: config.revenue_spend_multiplier,
    });
    let sync = Arc::new(CampaignSync::new(store.clone(), platform.clone(), revenue));

    match cli.command.unwrap_or(Command::Worker) {
        Command::Worker => {
            info!(interval_secs = config.sync_interval.as_secs(), "Starting sync worker");
            let worker = worker::SyncWorker::new(store.clone(), sync.clone(), config.sync_interval);
            tokio::select! {
                _ = worker.run() => {}
                _ = tokio::signal::ctrl_c() => info!("Shutting down"),
            }
        }
        Command::Sync { auth_id } => {
            let outcome = sync.run(Some(&Identity::new(auth_id))).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Connect { auth_id, email, token, account_id } => {
            let connector = AccountConnector::new(store.clone(), platform);
            let outcome = connector
                .connect(Some(&Identity::new(auth_id)), &email, &token, account_id.as_deref())
                .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Stats { auth_id } => {
            let campaigns = match store.find_user(&auth_id).await? {
                Some(user) => store.list_campaigns(&user.id, Platform::Facebook).await?,
                None => Vec::new(),
            };
            let summaries: Vec<CampaignSummary> =
                campaigns.iter().map(CampaignSummary::from_campaign).collect();
            let report = serde_json::json!({
                "portfolio": PortfolioStats::from_campaigns(&campaigns),
                "campaigns": summaries,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    // Release the connection before exit
    drop(sync);
    drop(store);
    if let Ok(db) = Arc::try_unwrap(db) {
        db.close().await;
    }

    Ok(())
}
