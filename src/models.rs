use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::constants::PLATFORM_FACEBOOK;
use crate::metrics::{parse_f64, parse_i64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => PLATFORM_FACEBOOK,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller. Authentication itself happens upstream of this
/// service; only the resolved external identity is passed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub auth_id: String,
}

impl Identity {
    pub fn new(auth_id: impl Into<String>) -> Self {
        Self { auth_id: auth_id.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub auth_id: String,
    pub email: String,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity::new(self.auth_id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub platform: Platform,
    pub access_token: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub plan: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdAccount {
    pub id: i64,
    pub tenant_id: i64,
    pub platform: Platform,
    pub external_account_id: String,
    pub status: String,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Inactive,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Inactive => "inactive",
        }
    }

    /// Reads a stored status. Anything unrecognised is treated as inactive.
    pub fn from_db(value: &str) -> Self {
        match value {
            "active" => CampaignStatus::Active,
            "paused" => CampaignStatus::Paused,
            _ => CampaignStatus::Inactive,
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The metrics bag stored as JSONB on every campaign row.
///
/// `revenue` is an estimate produced by a `RevenueEstimator`, not reported
/// revenue.
///
/// Older rows may hold `null` or numeric strings in place of numbers; those
/// read back as 0 or the parsed value rather than failing the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CampaignMetrics {
    #[serde(deserialize_with = "lenient_text")]
    pub external_id: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub spend: f64,
    #[serde(deserialize_with = "lenient_i64")]
    pub clicks: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub impressions: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub conversions: i64,
    #[serde(deserialize_with = "lenient_f64")]
    pub revenue: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub cpc: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub ctr: f64,
    #[serde(deserialize_with = "lenient_text")]
    pub effective_status: String,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Some(Value::String(s)) => parse_f64(Some(&s)),
        _ => 0.0,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => parse_i64(Some(&n.to_string())),
        Some(Value::String(s)) => parse_i64(Some(&s)),
        _ => 0,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub platform: Platform,
    pub status: CampaignStatus,
    pub external_id: String,
    pub metrics: CampaignMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written on insert or update of a synced campaign.
#[derive(Debug, Clone)]
pub struct CampaignUpsert {
    pub user_id: String,
    pub platform: Platform,
    pub name: String,
    pub status: CampaignStatus,
    pub metrics: CampaignMetrics,
}

impl CampaignUpsert {
    pub fn external_id(&self) -> &str {
        &self.metrics.external_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    pub campaign_count: usize,
    pub created_count: usize,
    pub updated_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn synced(created_count: usize, updated_count: usize) -> Self {
        Self {
            success: true,
            campaign_count: created_count + updated_count,
            created_count,
            updated_count,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            campaign_count: 0,
            created_count: 0,
            updated_count: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectOutcome {
    pub fn connected(account_id: String, account_name: String) -> Self {
        Self {
            success: true,
            account_id: Some(account_id),
            account_name: Some(account_name),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            account_id: None,
            account_name: None,
            error: Some(error.into()),
        }
    }
}
