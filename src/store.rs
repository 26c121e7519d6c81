use async_trait::async_trait;

use crate::db::DatabaseError;
use crate::models::{AdAccount, Campaign, CampaignUpsert, Credential, Platform, Tenant, User};

/// Persistence operations needed by connect, sync and the worker.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn find_user(&self, auth_id: &str) -> Result<Option<User>, DatabaseError>;

    async fn create_user(&self, auth_id: &str, email: &str) -> Result<User, DatabaseError>;

    async fn get_credential(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<Credential>, DatabaseError>;

    async fn save_credential(
        &self,
        user_id: &str,
        platform: Platform,
        access_token: &str,
    ) -> Result<(), DatabaseError>;

    async fn users_with_credential(&self, platform: Platform) -> Result<Vec<User>, DatabaseError>;

    async fn find_or_create_tenant(&self, name: &str) -> Result<Tenant, DatabaseError>;

    async fn find_ad_account(
        &self,
        tenant_id: i64,
        platform: Platform,
    ) -> Result<Option<AdAccount>, DatabaseError>;

    /// Inserts the account or, if (tenant, platform, external id) exists,
    /// marks it active and refreshes `connected_at`.
    async fn upsert_ad_account(
        &self,
        tenant_id: i64,
        platform: Platform,
        external_account_id: &str,
    ) -> Result<AdAccount, DatabaseError>;

    async fn find_campaign(
        &self,
        user_id: &str,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<Campaign>, DatabaseError>;

    async fn insert_campaign(&self, campaign: &CampaignUpsert) -> Result<Campaign, DatabaseError>;

    async fn update_campaign(&self, id: i64, campaign: &CampaignUpsert) -> Result<(), DatabaseError>;

    async fn list_campaigns(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Vec<Campaign>, DatabaseError>;
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        users: Vec<User>,
        credentials: Vec<Credential>,
        tenants: Vec<Tenant>,
        ad_accounts: Vec<AdAccount>,
        campaigns: Vec<Campaign>,
        // Rows whose external_id column is NULL
        unkeyed: HashSet<i64>,
        next_id: i64,
    }

    impl State {
        fn next_id(&mut self) -> i64 {
            self.next_id += 1;
            self.next_id
        }
    }

    /// In-memory `CampaignStore` for tests.
    #[derive(Default)]
    pub struct MemoryStore {
        state: Mutex<State>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn campaigns(&self) -> Vec<Campaign> {
            self.state.lock().unwrap().campaigns.clone()
        }

        pub fn ad_accounts(&self) -> Vec<AdAccount> {
            self.state.lock().unwrap().ad_accounts.clone()
        }

        pub fn tenants(&self) -> Vec<Tenant> {
            self.state.lock().unwrap().tenants.clone()
        }

        /// Inserts a row the way it was stored before external_id had its
        /// own column: only the metrics bag carries the id.
        pub fn insert_unkeyed_campaign(&self, campaign: &CampaignUpsert) -> Campaign {
            let mut state = self.state.lock().unwrap();
            let row = new_row(&mut state, campaign);
            state.unkeyed.insert(row.id);
            state.campaigns.push(row.clone());
            row
        }

        pub fn set_ad_account_status(&self, id: i64, status: &str) {
            let mut state = self.state.lock().unwrap();
            if let Some(account) = state.ad_accounts.iter_mut().find(|a| a.id == id) {
                account.status = status.to_string();
            }
        }
    }

    fn new_row(state: &mut State, campaign: &CampaignUpsert) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: state.next_id(),
            user_id: campaign.user_id.clone(),
            name: campaign.name.clone(),
            platform: campaign.platform,
            status: campaign.status,
            external_id: campaign.external_id().to_string(),
            metrics: campaign.metrics.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    #[async_trait]
    impl CampaignStore for MemoryStore {
        async fn find_user(&self, auth_id: &str) -> Result<Option<User>, DatabaseError> {
            let state = self.state.lock().unwrap();
            Ok(state.users.iter().find(|u| u.auth_id == auth_id).cloned())
        }

        async fn create_user(&self, auth_id: &str, email: &str) -> Result<User, DatabaseError> {
            let mut state = self.state.lock().unwrap();
            let user = User {
                id: format!("user-{}", state.next_id()),
                auth_id: auth_id.to_string(),
                email: email.to_string(),
            };
            state.users.push(user.clone());
            Ok(user)
        }

        async fn get_credential(
            &self,
            user_id: &str,
            platform: Platform,
        ) -> Result<Option<Credential>, DatabaseError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .credentials
                .iter()
                .find(|c| c.user_id == user_id && c.platform == platform)
                .cloned())
        }

        async fn save_credential(
            &self,
            user_id: &str,
            platform: Platform,
            access_token: &str,
        ) -> Result<(), DatabaseError> {
            let mut state = self.state.lock().unwrap();
            match state
                .credentials
                .iter_mut()
                .find(|c| c.user_id == user_id && c.platform == platform)
            {
                Some(existing) => {
                    existing.access_token = access_token.to_string();
                    existing.updated_at = Utc::now();
                }
                None => state.credentials.push(Credential {
                    user_id: user_id.to_string(),
                    platform,
                    access_token: access_token.to_string(),
                    updated_at: Utc::now(),
                }),
            }
            Ok(())
        }

        async fn users_with_credential(&self, platform: Platform) -> Result<Vec<User>, DatabaseError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .users
                .iter()
                .filter(|u| {
                    state.credentials.iter().any(|c| {
                        c.user_id == u.id && c.platform == platform && !c.access_token.trim().is_empty()
                    })
                })
                .cloned()
                .collect())
        }

        async fn find_or_create_tenant(&self, name: &str) -> Result<Tenant, DatabaseError> {
            let mut state = self.state.lock().unwrap();
            if let Some(tenant) = state.tenants.iter().find(|t| t.name == name) {
                return Ok(tenant.clone());
            }
            let tenant = Tenant {
                id: state.next_id(),
                name: name.to_string(),
                plan: "trial".to_string(),
            };
            state.tenants.push(tenant.clone());
            Ok(tenant)
        }

        async fn find_ad_account(
            &self,
            tenant_id: i64,
            platform: Platform,
        ) -> Result<Option<AdAccount>, DatabaseError> {
            let state = self.state.lock().unwrap();
            // Active accounts first, then the most recently connected
            Ok(state
                .ad_accounts
                .iter()
                .filter(|a| a.tenant_id == tenant_id && a.platform == platform)
                .max_by_key(|a| (a.status == "active", a.connected_at, a.id))
                .cloned())
        }

        async fn upsert_ad_account(
            &self,
            tenant_id: i64,
            platform: Platform,
            external_account_id: &str,
        ) -> Result<AdAccount, DatabaseError> {
            let mut state = self.state.lock().unwrap();
            if let Some(existing) = state.ad_accounts.iter_mut().find(|a| {
                a.tenant_id == tenant_id
                    && a.platform == platform
                    && a.external_account_id == external_account_id
            }) {
                existing.status = "active".to_string();
                existing.connected_at = Utc::now();
                return Ok(existing.clone());
            }
            let account = AdAccount {
                id: state.next_id(),
                tenant_id,
                platform,
                external_account_id: external_account_id.to_string(),
                status: "active".to_string(),
                connected_at: Utc::now(),
            };
            state.ad_accounts.push(account.clone());
            Ok(account)
        }

        async fn find_campaign(
            &self,
            user_id: &str,
            platform: Platform,
            external_id: &str,
        ) -> Result<Option<Campaign>, DatabaseError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .campaigns
                .iter()
                .find(|c| {
                    let key = if state.unkeyed.contains(&c.id) {
                        &c.metrics.external_id
                    } else {
                        &c.external_id
                    };
                    c.user_id == user_id && c.platform == platform && key == external_id
                })
                .cloned())
        }

        async fn insert_campaign(&self, campaign: &CampaignUpsert) -> Result<Campaign, DatabaseError> {
            let mut state = self.state.lock().unwrap();
            let row = new_row(&mut state, campaign);
            state.campaigns.push(row.clone());
            Ok(row)
        }

        async fn update_campaign(&self, id: i64, campaign: &CampaignUpsert) -> Result<(), DatabaseError> {
            let mut state = self.state.lock().unwrap();
            state.unkeyed.remove(&id);
            if let Some(row) = state.campaigns.iter_mut().find(|c| c.id == id) {
                row.name = campaign.name.clone();
                row.status = campaign.status;
                row.external_id = campaign.external_id().to_string();
                row.metrics = campaign.metrics.clone();
                row.updated_at = Utc::now();
            }
            Ok(())
        }

        async fn list_campaigns(
            &self,
            user_id: &str,
            platform: Platform,
        ) -> Result<Vec<Campaign>, DatabaseError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .campaigns
                .iter()
                .filter(|c| c.user_id == user_id && c.platform == platform)
                .cloned()
                .collect())
        }
    }
}
