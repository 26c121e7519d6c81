use crate::models::{
    AdAccount, Campaign, CampaignMetrics, CampaignStatus, CampaignUpsert, Credential, Platform,
    Tenant, User,
};
use crate::store::CampaignStore;
use async_trait::async_trait;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use std::str::FromStr;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, Config, Row};
use tracing::{error, info};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../migrations/schema.sql");

const CAMPAIGN_COLUMNS: &str =
    "id, user_id, campaign_name, status, external_id, metrics, created_at, updated_at";
const AD_ACCOUNT_COLUMNS: &str =
    "id, tenant_id, external_account_id, status, connected_at";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("SSL error: {0}")]
    SslError(#[from] openssl::error::ErrorStack),
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
}

pub struct Database {
    client: Client,
    connection: JoinHandle<()>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, DatabaseError> {
        // Configure SSL
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        // Managed Postgres endpoints present self-signed certificates
        builder.set_verify(SslVerifyMode::NONE);
        let connector = MakeTlsConnector::new(builder.build());

        // Parse the connection config from URL
        let mut config = Config::from_str(database_url)
            .map_err(|e| DatabaseError::InvalidConnectionString(e.to_string()))?;

        let (client, connection) = config
            .connect_timeout(std::time::Duration::from_secs(5))
            .connect(connector)
            .await?;

        // Spawn the connection handler
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Database connection error");
            }
        });

        info!("Connected to database");
        Ok(Self { client, connection })
    }

    /// Applies the idempotent schema.
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        self.client.batch_execute(SCHEMA).await?;
        Ok(())
    }

    /// Drops the client and waits for the connection task to finish.
    pub async fn close(self) {
        let Self { client, connection } = self;
        drop(client);
        if let Err(e) = connection.await {
            error!(error = %e, "Database connection task failed");
        }
    }
}

fn user_from_row(row: &Row) -> Result<User, DatabaseError> {
    Ok(User {
        id: row.try_get("id")?,
        auth_id: row.try_get("auth_id")?,
        email: row.try_get("email")?,
    })
}

fn ad_account_from_row(row: &Row, platform: Platform) -> Result<AdAccount, DatabaseError> {
    Ok(AdAccount {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        platform,
        external_account_id: row.try_get("external_account_id")?,
        status: row.try_get("status")?,
        connected_at: row.try_get("connected_at")?,
    })
}

fn campaign_from_row(row: &Row, platform: Platform) -> Result<Campaign, DatabaseError> {
    let Json(metrics): Json<CampaignMetrics> = row.try_get("metrics")?;
    let status: String = row.try_get("status")?;
    let external_id: Option<String> = row.try_get("external_id")?;

    Ok(Campaign {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("campaign_name")?,
        platform,
        status: CampaignStatus::from_db(&status),
        external_id: external_id.unwrap_or_else(|| metrics.external_id.clone()),
        metrics,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CampaignStore for Database {
    async fn find_user(&self, auth_id: &str) -> Result<Option<User>, DatabaseError> {
        let row = self.client.query_opt(
            "SELECT id, auth_id, email FROM users WHERE auth_id = $1",
            &[&auth_id],
        ).await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_user(&self, auth_id: &str, email: &str) -> Result<User, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let row = self.client.query_one(
            "INSERT INTO users (id, auth_id, email)
             VALUES ($1, $2, $3)
             ON CONFLICT (auth_id) DO UPDATE SET email = EXCLUDED.email
             RETURNING id, auth_id, email",
            &[&id, &auth_id, &email],
        ).await?;

        user_from_row(&row)
    }

    async fn get_credential(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<Credential>, DatabaseError> {
        let row = self.client.query_opt(
            "SELECT user_id, traffic_source_api_key, updated_at
             FROM settings
             WHERE user_id = $1 AND traffic_source = $2",
            &[&user_id, &platform.as_str()],
        ).await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let access_token: Option<String> = row.try_get("traffic_source_api_key")?;
        let updated_at = row.try_get("updated_at")?;
        Ok(access_token.map(|access_token| Credential {
            user_id: user_id.to_string(),
            platform,
            access_token,
            updated_at,
        }))
    }

    async fn save_credential(
        &self,
        user_id: &str,
        platform: Platform,
        access_token: &str,
    ) -> Result<(), DatabaseError> {
        self.client.execute(
            "INSERT INTO settings (user_id, traffic_source, traffic_source_api_key, updated_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (user_id, traffic_source) DO UPDATE
             SET traffic_source_api_key = EXCLUDED.traffic_source_api_key, updated_at = NOW()",
            &[&user_id, &platform.as_str(), &access_token],
        ).await?;

        Ok(())
    }

    async fn users_with_credential(&self, platform: Platform) -> Result<Vec<User>, DatabaseError> {
        let rows = self.client.query(
            "SELECT u.id, u.auth_id, u.email
             FROM users u
             INNER JOIN settings s ON s.user_id = u.id
             WHERE s.traffic_source = $1
               AND COALESCE(TRIM(s.traffic_source_api_key), '') <> ''
             ORDER BY u.email",
            &[&platform.as_str()],
        ).await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn find_or_create_tenant(&self, name: &str) -> Result<Tenant, DatabaseError> {
        // The no-op update makes RETURNING yield the existing row too
        let row = self.client.query_one(
            "INSERT INTO tenants (name, plan)
             VALUES ($1, 'trial')
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, name, plan",
            &[&name],
        ).await?;

        Ok(Tenant {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            plan: row.try_get("plan")?,
        })
    }

    async fn find_ad_account(
        &self,
        tenant_id: i64,
        platform: Platform,
    ) -> Result<Option<AdAccount>, DatabaseError> {
        let row = self.client.query_opt(
            &format!(
                "SELECT {} FROM ad_accounts
                 WHERE tenant_id = $1 AND platform = $2
                 ORDER BY (status = 'active') DESC, connected_at DESC
                 LIMIT 1",
                AD_ACCOUNT_COLUMNS
            ),
            &[&tenant_id, &platform.as_str()],
        ).await?;

        row.map(|row| ad_account_from_row(&row, platform)).transpose()
    }

    async fn upsert_ad_account(
        &self,
        tenant_id: i64,
        platform: Platform,
        external_account_id: &str,
    ) -> Result<AdAccount, DatabaseError> {
        let row = self.client.query_one(
            &format!(
                "INSERT INTO ad_accounts (tenant_id, platform, external_account_id, status, connected_at)
                 VALUES ($1, $2, $3, 'active', NOW())
                 ON CONFLICT (tenant_id, platform, external_account_id) DO UPDATE
                 SET status = 'active', connected_at = NOW()
                 RETURNING {}",
                AD_ACCOUNT_COLUMNS
            ),
            &[&tenant_id, &platform.as_str(), &external_account_id],
        ).await?;

        ad_account_from_row(&row, platform)
    }

    async fn find_campaign(
        &self,
        user_id: &str,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<Campaign>, DatabaseError> {
        let row = self.client.query_opt(
            &format!(
                "SELECT {} FROM campaigns
                 WHERE user_id = $1 AND platform = $2
                   AND (external_id = $3
                        OR (external_id IS NULL AND metrics ->> 'external_id' = $3))
                 ORDER BY id
                 LIMIT 1",
                CAMPAIGN_COLUMNS
            ),
            &[&user_id, &platform.as_str(), &external_id],
        ).await?;

        row.map(|row| campaign_from_row(&row, platform)).transpose()
    }

    async fn insert_campaign(&self, campaign: &CampaignUpsert) -> Result<Campaign, DatabaseError> {
        let row = self.client.query_one(
            &format!(
                "INSERT INTO campaigns
                    (user_id, campaign_name, platform, status, external_id, metrics, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
                 RETURNING {}",
                CAMPAIGN_COLUMNS
            ),
            &[
                &campaign.user_id,
                &campaign.name,
                &campaign.platform.as_str(),
                &campaign.status.as_str(),
                &campaign.external_id(),
                &Json(&campaign.metrics),
            ],
        ).await?;

        campaign_from_row(&row, campaign.platform)
    }

    async fn update_campaign(&self, id: i64, campaign: &CampaignUpsert) -> Result<(), DatabaseError> {
        self.client.execute(
            "UPDATE campaigns
             SET campaign_name = $2, status = $3, external_id = $4, metrics = $5, updated_at = NOW()
             WHERE id = $1",
            &[
                &id,
                &campaign.name,
                &campaign.status.as_str(),
                &campaign.external_id(),
                &Json(&campaign.metrics),
            ],
        ).await?;

        Ok(())
    }

    async fn list_campaigns(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Vec<Campaign>, DatabaseError> {
        let rows = self.client.query(
            &format!(
                "SELECT {} FROM campaigns WHERE user_id = $1 AND platform = $2 ORDER BY id",
                CAMPAIGN_COLUMNS
            ),
            &[&user_id, &platform.as_str()],
        ).await?;

        rows.iter().map(|row| campaign_from_row(row, platform)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs a reachable Postgres: DATABASE_URL=... cargo test -- --ignored
    async fn test_database() -> Option<Database> {
        dotenv::dotenv().ok();
        let url = std::env::var("DATABASE_URL").ok()?;
        let db = Database::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        Some(db)
    }

    async fn fresh_user(db: &Database) -> User {
        let auth_id = format!("auth-{}", Uuid::new_v4());
        db.create_user(&auth_id, &format!("{}@example.com", auth_id)).await.unwrap()
    }

    fn upsert(user_id: &str, external_id: &str, name: &str) -> CampaignUpsert {
        CampaignUpsert {
            user_id: user_id.to_string(),
            platform: Platform::Facebook,
            name: name.to_string(),
            status: CampaignStatus::Active,
            metrics: CampaignMetrics::zeroed(external_id, Some("ACTIVE")),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn campaign_insert_find_update() {
        let Some(db) = test_database().await else { return };
        let user = fresh_user(&db).await;

        let created = db.insert_campaign(&upsert(&user.id, "c1", "First")).await.unwrap();
        assert_eq!(created.external_id, "c1");

        let found = db.find_campaign(&user.id, Platform::Facebook, "c1").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);

        db.update_campaign(created.id, &upsert(&user.id, "c1", "Renamed")).await.unwrap();
        let campaigns = db.list_campaigns(&user.id, Platform::Facebook).await.unwrap();
        assert_eq!(campaigns.len(), 1);
        assert_eq!(campaigns[0].name, "Renamed");
        assert!(db.find_campaign(&user.id, Platform::Facebook, "c2").await.unwrap().is_none());

        db.close().await;
    }

    #[tokio::test]
    #[ignore]
    async fn unkeyed_row_is_adopted_in_place() {
        let Some(db) = test_database().await else { return };
        let user = fresh_user(&db).await;

        let bag = serde_json::json!({ "external_id": "c7", "conversions": null, "spend": "12.50" });
        let row = db.client.query_one(
            "INSERT INTO campaigns (user_id, campaign_name, platform, status, metrics)
             VALUES ($1, 'Legacy', 'facebook', 'inactive', $2)
             RETURNING id",
            &[&user.id, &Json(&bag)],
        ).await.unwrap();
        let legacy_id: i64 = row.get("id");

        let found = db.find_campaign(&user.id, Platform::Facebook, "c7").await.unwrap().unwrap();
        assert_eq!(found.id, legacy_id);
        assert_eq!(found.external_id, "c7");
        assert_eq!(found.metrics.spend, 12.5);
        assert_eq!(found.metrics.conversions, 0);

        db.update_campaign(legacy_id, &upsert(&user.id, "c7", "Adopted")).await.unwrap();
        let row = db.client.query_one(
            "SELECT external_id FROM campaigns WHERE id = $1",
            &[&legacy_id],
        ).await.unwrap();
        let column: Option<String> = row.get("external_id");
        assert_eq!(column.as_deref(), Some("c7"));
        assert_eq!(db.list_campaigns(&user.id, Platform::Facebook).await.unwrap().len(), 1);

        db.close().await;
    }

    #[tokio::test]
    #[ignore]
    async fn reconnect_keeps_one_tenant_and_ad_account() {
        let Some(db) = test_database().await else { return };
        let user = fresh_user(&db).await;

        db.save_credential(&user.id, Platform::Facebook, "old").await.unwrap();
        db.save_credential(&user.id, Platform::Facebook, "new").await.unwrap();
        let credential = db.get_credential(&user.id, Platform::Facebook).await.unwrap().unwrap();
        assert_eq!(credential.access_token, "new");

        let tenant = db.find_or_create_tenant(&user.email).await.unwrap();
        let again = db.find_or_create_tenant(&user.email).await.unwrap();
        assert_eq!(tenant.id, again.id);

        let first = db.upsert_ad_account(tenant.id, Platform::Facebook, "act_1").await.unwrap();
        let second = db.upsert_ad_account(tenant.id, Platform::Facebook, "act_1").await.unwrap();
        assert_eq!(first.id, second.id);

        let row = db.client.query_one(
            "SELECT COUNT(*) AS n FROM ad_accounts WHERE tenant_id = $1",
            &[&tenant.id],
        ).await.unwrap();
        let count: i64 = row.get("n");
        assert_eq!(count, 1);

        let found = db.find_ad_account(tenant.id, Platform::Facebook).await.unwrap().unwrap();
        assert_eq!(found.external_account_id, "act_1");
        assert_eq!(found.status, "active");

        db.close().await;
    }
}
