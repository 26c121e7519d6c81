use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::db::DatabaseError;
use crate::facebook::{AdAccountData, AdsPlatform, CampaignData, FacebookApiError, InsightData};
use crate::metrics::{map_effective_status, metrics_from_insight, RevenueEstimator};
use crate::models::{
    AdAccount, CampaignMetrics, CampaignUpsert, Identity, Platform, SyncOutcome, Tenant, User,
};
use crate::store::CampaignStore;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unauthorized")]
    AuthenticationMissing,
    #[error("User not found in database")]
    UserNotFound,
    #[error("Facebook not connected")]
    CredentialMissing,
    #[error("No ad accounts found")]
    NoAdAccounts,
    #[error("{0}")]
    Upstream(#[from] FacebookApiError),
    #[error("Failed to store campaign data")]
    Persistence(#[from] DatabaseError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
}

impl SyncReport {
    pub fn processed(&self) -> usize {
        self.created + self.updated
    }
}

type LockKey = (String, Platform);

/// Reconciles a user's Facebook campaigns into the local campaign table.
pub struct CampaignSync {
    store: Arc<dyn CampaignStore>,
    platform: Arc<dyn AdsPlatform>,
    revenue: Arc<dyn RevenueEstimator>,
    in_flight: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

/// Prefers the first account with lifetime spend, else the first listed.
pub fn select_ad_account(accounts: &[AdAccountData]) -> Option<&AdAccountData> {
    accounts
        .iter()
        .find(|account| account.has_spend())
        .or_else(|| accounts.first())
}

impl CampaignSync {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        platform: Arc<dyn AdsPlatform>,
        revenue: Arc<dyn RevenueEstimator>,
    ) -> Self {
        Self {
            store,
            platform,
            revenue,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run(&self, identity: Option<&Identity>) -> SyncOutcome {
        match self.try_run(identity).await {
            Ok(report) => {
                info!(
                    created = report.created,
                    updated = report.updated,
                    "Synced {} campaigns",
                    report.processed()
                );
                SyncOutcome::synced(report.created, report.updated)
            }
            Err(e) => {
                match &e {
                    SyncError::Persistence(inner) => error!(error = %inner, "Campaign sync failed"),
                    _ => warn!(error = %e, "Campaign sync failed"),
                }
                SyncOutcome::failed(e.to_string())
            }
        }
    }

    pub async fn try_run(&self, identity: Option<&Identity>) -> Result<SyncReport, SyncError> {
        let identity = identity.ok_or(SyncError::AuthenticationMissing)?;

        let user = self.store
            .find_user(&identity.auth_id)
            .await?
            .ok_or(SyncError::UserNotFound)?;

        let credential = self.store
            .get_credential(&user.id, Platform::Facebook)
            .await?
            .filter(|c| !c.access_token.trim().is_empty())
            .ok_or(SyncError::CredentialMissing)?;
        let token = credential.access_token.trim();

        // One sync at a time per user and platform
        let key = (user.id.clone(), Platform::Facebook);
        let lock = self.lock_for(&key);
        let result = {
            let _guard = lock.lock().await;
            self.sync_account(&user, token).await
        };
        self.release_lock(&key, lock);
        result
    }

    async fn sync_account(&self, user: &User, token: &str) -> Result<SyncReport, SyncError> {
        let tenant = self.store.find_or_create_tenant(&user.email).await?;
        let account = self.resolve_ad_account(&tenant, token).await?;
        let account_id = account.external_account_id.as_str();
        info!(user_id = %user.id, account_id, "Syncing Facebook campaigns");

        let roster = self.platform.get_campaigns(token, account_id).await?;
        debug!(count = roster.len(), "Fetched campaign roster");

        let insights = match self.platform.get_campaign_insights(token, account_id).await {
            Ok(insights) => insights,
            Err(e) => {
                warn!(account_id, error = %e, "Insights unavailable, treating all campaigns as inactive");
                Vec::new()
            }
        };
        debug!(count = insights.len(), "Fetched lifetime insights");

        self.merge(user, &roster, &insights).await
    }

    fn lock_for(&self, key: &LockKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drops the map entry once no other run holds or waits on it.
    fn release_lock(&self, key: &LockKey, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    async fn resolve_ad_account(&self, tenant: &Tenant, token: &str) -> Result<AdAccount, SyncError> {
        if let Some(account) = self.store
            .find_ad_account(tenant.id, Platform::Facebook)
            .await?
            .filter(|a| !a.external_account_id.is_empty())
        {
            return Ok(account);
        }

        let accounts = self.platform.get_ad_accounts(token).await?;
        let chosen = select_ad_account(&accounts).ok_or(SyncError::NoAdAccounts)?;
        info!(
            account_id = %chosen.id,
            has_spend = chosen.has_spend(),
            available = accounts.len(),
            "Selected ad account"
        );

        Ok(self.store
            .upsert_ad_account(tenant.id, Platform::Facebook, &chosen.id)
            .await?)
    }

    async fn merge(
        &self,
        user: &User,
        roster: &[CampaignData],
        insights: &[InsightData],
    ) -> Result<SyncReport, SyncError> {
        let roster_by_id: HashMap<&str, &CampaignData> =
            roster.iter().map(|c| (c.id.as_str(), c)).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut report = SyncReport::default();

        // Campaigns with recorded activity
        for insight in insights {
            let id = insight.campaign_id.as_str();
            if id.is_empty() {
                warn!("Skipping insight row without campaign_id");
                continue;
            }
            if !seen.insert(id) {
                continue;
            }

            let entry = roster_by_id.get(id).copied();
            let effective_status = entry.and_then(|c| c.effective_status.as_deref());
            let name = insight
                .campaign_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .or_else(|| entry.map(|c| c.name.as_str()).filter(|n| !n.is_empty()))
                .unwrap_or(id);

            let campaign = CampaignUpsert {
                user_id: user.id.clone(),
                platform: Platform::Facebook,
                name: name.to_string(),
                status: map_effective_status(effective_status),
                metrics: metrics_from_insight(insight, effective_status, self.revenue.as_ref()),
            };
            self.upsert_campaign(&campaign, &mut report).await?;
        }

        // Campaigns with no lifetime activity
        for entry in roster {
            let id = entry.id.as_str();
            if id.is_empty() || !seen.insert(id) {
                continue;
            }

            let effective_status = entry.effective_status.as_deref();
            let campaign = CampaignUpsert {
                user_id: user.id.clone(),
                platform: Platform::Facebook,
                name: if entry.name.is_empty() { id.to_string() } else { entry.name.clone() },
                status: map_effective_status(effective_status),
                metrics: CampaignMetrics::zeroed(id, effective_status),
            };
            self.upsert_campaign(&campaign, &mut report).await?;
        }

        Ok(report)
    }

    async fn upsert_campaign(
        &self,
        campaign: &CampaignUpsert,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let existing = self.store
            .find_campaign(&campaign.user_id, campaign.platform, campaign.external_id())
            .await?;

        match existing {
            Some(existing) => {
                debug!(campaign_id = existing.id, external_id = campaign.external_id(), "Updating campaign");
                self.store.update_campaign(existing.id, campaign).await?;
                report.updated += 1;
            }
            None => {
                let created = self.store.insert_campaign(campaign).await?;
                debug!(campaign_id = created.id, external_id = campaign.external_id(), "Created campaign");
                report.created += 1;
            }
        }

        Ok(())
    }
}
