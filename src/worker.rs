use crate::analytics::PortfolioStats;
use crate::db::DatabaseError;
use crate::models::{Platform, SyncOutcome, User};
use crate::store::CampaignStore;
use crate::sync::CampaignSync;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub users: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub campaigns: usize,
}

pub struct SyncWorker {
    store: Arc<dyn CampaignStore>,
    sync: Arc<CampaignSync>,
    interval: Duration,
}

impl SyncWorker {
    pub fn new(store: Arc<dyn CampaignStore>, sync: Arc<CampaignSync>, interval: Duration) -> Self {
        Self {
            store,
            sync,
            interval,
        }
    }

    /// Syncs every user with a stored Facebook credential once.
    pub async fn run_once(&self) -> Result<PassSummary, DatabaseError> {
        let users = self.store.users_with_credential(Platform::Facebook).await?;
        let mut summary = PassSummary {
            users: users.len(),
            ..PassSummary::default()
        };

        for user in &users {
            let outcome = self.sync.run(Some(&user.identity())).await;
            if outcome.success {
                summary.succeeded += 1;
                summary.campaigns += outcome.campaign_count;
                self.log_portfolio(user).await;
            } else {
                summary.failed += 1;
                report_failure(user, &outcome);
            }
        }

        info!(
            users = summary.users,
            succeeded = summary.succeeded,
            failed = summary.failed,
            campaigns = summary.campaigns,
            "Sync pass finished"
        );
        Ok(summary)
    }

    pub async fn run(&self) {
        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Could not load connected users");
            }

            time::sleep(self.interval).await;
        }
    }

    async fn log_portfolio(&self, user: &User) {
        match self.store.list_campaigns(&user.id, Platform::Facebook).await {
            Ok(campaigns) => {
                let stats = PortfolioStats::from_campaigns(&campaigns);
                info!(
                    user_id = %user.id,
                    campaigns = stats.campaign_count,
                    active = stats.active_campaigns,
                    at_risk = stats.campaigns_at_risk,
                    spend = stats.total_spend,
                    revenue = stats.total_revenue,
                    roi = stats.roi,
                    "Portfolio updated"
                );
            }
            Err(e) => warn!(user_id = %user.id, error = %e, "Could not load portfolio"),
        }
    }
}

fn report_failure(user: &User, outcome: &SyncOutcome) {
    warn!(
        user_id = %user.id,
        error = outcome.error.as_deref().unwrap_or("unknown error"),
        "Sync failed for user"
    );
}
