use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::constants::FB_ACCOUNT_STATUS_ACTIVE;
use crate::db::DatabaseError;
use crate::facebook::{AdAccountData, AdsPlatform, FacebookApiError};
use crate::models::{ConnectOutcome, Identity, Platform};
use crate::store::CampaignStore;

const DEFAULT_ACCOUNT_NAME: &str = "Facebook Ad Account";

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Unauthorized. Please log in.")]
    AuthenticationMissing,
    #[error("Access Token is required.")]
    TokenMissing,
    #[error("Account \"{name}\" is not active (status: {status})")]
    AccountInactive { name: String, status: i64 },
    #[error("No ad accounts found. Make sure your token has access to at least one ad account.")]
    NoAdAccounts,
    #[error("No active ad accounts found. All your accounts may be disabled.")]
    NoActiveAdAccounts,
    #[error("{0}")]
    Upstream(#[from] FacebookApiError),
    #[error("Failed to save account connection")]
    Persistence(#[from] DatabaseError),
}

/// Graph ad account ids carry an `act_` prefix that users often leave off.
pub fn normalize_account_id(account_id: &str) -> String {
    let account_id = account_id.trim();
    if account_id.starts_with("act_") {
        account_id.to_string()
    } else {
        format!("act_{}", account_id)
    }
}

fn is_active(account: &AdAccountData) -> bool {
    account.account_status == Some(FB_ACCOUNT_STATUS_ACTIVE)
}

/// Active account with spend first, then any active account.
pub fn choose_active_account(accounts: &[AdAccountData]) -> Option<&AdAccountData> {
    accounts
        .iter()
        .find(|a| is_active(a) && a.has_spend())
        .or_else(|| accounts.iter().find(|a| is_active(a)))
}

/// Stores a user's Facebook token and the ad account it should sync.
pub struct AccountConnector {
    store: Arc<dyn CampaignStore>,
    platform: Arc<dyn AdsPlatform>,
}

impl AccountConnector {
    pub fn new(store: Arc<dyn CampaignStore>, platform: Arc<dyn AdsPlatform>) -> Self {
        Self { store, platform }
    }

    pub async fn connect(
        &self,
        identity: Option<&Identity>,
        email: &str,
        token: &str,
        account_id: Option<&str>,
    ) -> ConnectOutcome {
        match self.try_connect(identity, email, token, account_id).await {
            Ok((account_id, account_name)) => {
                info!(account_id = %account_id, "Connected Facebook ad account");
                ConnectOutcome::connected(account_id, account_name)
            }
            Err(e) => {
                match &e {
                    ConnectError::Persistence(inner) => error!(error = %inner, "Connect failed"),
                    _ => warn!(error = %e, "Connect failed"),
                }
                ConnectOutcome::failed(e.to_string())
            }
        }
    }

    async fn try_connect(
        &self,
        identity: Option<&Identity>,
        email: &str,
        token: &str,
        account_id: Option<&str>,
    ) -> Result<(String, String), ConnectError> {
        let identity = identity.ok_or(ConnectError::AuthenticationMissing)?;

        let token = token.trim();
        if token.is_empty() {
            return Err(ConnectError::TokenMissing);
        }

        let account = match account_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.verify_account(token, &normalize_account_id(id)).await?,
            None => self.discover_account(token).await?,
        };
        let account_name = account
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_ACCOUNT_NAME.to_string());

        let user = match self.store.find_user(&identity.auth_id).await? {
            Some(user) => user,
            None => self.store.create_user(&identity.auth_id, email).await?,
        };
        self.store.save_credential(&user.id, Platform::Facebook, token).await?;

        let tenant = self.store.find_or_create_tenant(&user.email).await?;
        self.store
            .upsert_ad_account(tenant.id, Platform::Facebook, &account.id)
            .await?;

        Ok((account.id, account_name))
    }

    async fn verify_account(&self, token: &str, account_id: &str) -> Result<AdAccountData, ConnectError> {
        let mut account = self.platform.get_ad_account(token, account_id).await?;
        if account.id.is_empty() {
            account.id = account_id.to_string();
        }

        if !is_active(&account) {
            return Err(ConnectError::AccountInactive {
                name: account.name.clone().unwrap_or_else(|| DEFAULT_ACCOUNT_NAME.to_string()),
                status: account.account_status.unwrap_or_default(),
            });
        }

        Ok(account)
    }

    async fn discover_account(&self, token: &str) -> Result<AdAccountData, ConnectError> {
        let accounts = self.platform.get_ad_accounts(token).await?;
        if accounts.is_empty() {
            return Err(ConnectError::NoAdAccounts);
        }

        let chosen = choose_active_account(&accounts).ok_or(ConnectError::NoActiveAdAccounts)?;
        if !chosen.has_spend() {
            warn!(
                account_id = %chosen.id,
                "Selected account has no spend; pass an account id to pick another"
            );
        }

        Ok(chosen.clone())
    }
}
