use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use crate::constants::{
    FB_AD_ACCOUNT_FIELDS,
    FB_AD_ACCOUNT_LIST_FIELDS,
    FB_AD_ACCOUNT_PAGE_LIMIT,
    FB_CAMPAIGN_FIELDS,
    FB_INSIGHT_FIELDS,
    FB_PAGE_LIMIT,
};

#[derive(Error, Debug)]
pub enum FacebookApiError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("{0}")]
    Api(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdAccountData {
    pub id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub account_status: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount_spent: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl AdAccountData {
    /// Lifetime spend in the account currency's minor unit.
    pub fn amount_spent_minor(&self) -> i64 {
        self.amount_spent
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(0)
    }

    pub fn has_spend(&self) -> bool {
        self.amount_spent_minor() > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub effective_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightData {
    #[serde(default)]
    pub campaign_id: String,
    #[serde(default)]
    pub campaign_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub spend: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub clicks: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub impressions: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cpc: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ctr: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionValue {
    pub action_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphList<T> {
    data: Option<Vec<T>>,
    error: Option<GraphError>,
}

// Graph sends most numbers as strings, but not consistently.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn api_error(error: GraphError) -> FacebookApiError {
    FacebookApiError::Api(
        error
            .message
            .unwrap_or_else(|| "Unknown Facebook API error".to_string()),
    )
}

/// Read-only view of an ads platform, as used by sync and connect.
#[async_trait]
pub trait AdsPlatform: Send + Sync {
    async fn get_ad_accounts(&self, access_token: &str) -> Result<Vec<AdAccountData>, FacebookApiError>;

    async fn get_ad_account(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<AdAccountData, FacebookApiError>;

    async fn get_campaigns(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<CampaignData>, FacebookApiError>;

    async fn get_campaign_insights(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<InsightData>, FacebookApiError>;
}

pub struct FacebookAPI {
    client: Client,
    base_url: String,
}

impl FacebookAPI {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&str, String)],
    ) -> Result<Value, FacebookApiError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(%url, "Graph API request");

        let response = self.client
            .get(&url)
            .query(&[("access_token", access_token)])
            .query(params)
            .send()
            .await
            .map_err(|e| FacebookApiError::RequestFailed(e.to_string()))?;

        // Graph returns an error object with a 4xx status, so the body is
        // decoded whatever the status code.
        response
            .json::<Value>()
            .await
            .map_err(|e| FacebookApiError::InvalidResponse(e.to_string()))
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, FacebookApiError> {
        let body = self.get_json(path, access_token, params).await?;
        let list: GraphList<T> = serde_json::from_value(body)
            .map_err(|e| FacebookApiError::InvalidResponse(e.to_string()))?;

        if let Some(error) = list.error {
            return Err(api_error(error));
        }

        Ok(list.data.unwrap_or_default())
    }
}

#[async_trait]
impl AdsPlatform for FacebookAPI {
    async fn get_ad_accounts(&self, access_token: &str) -> Result<Vec<AdAccountData>, FacebookApiError> {
        self.get_list(
            "me/adaccounts",
            access_token,
            &[
                ("fields", FB_AD_ACCOUNT_LIST_FIELDS.to_string()),
                ("limit", FB_AD_ACCOUNT_PAGE_LIMIT.to_string()),
            ],
        )
        .await
    }

    async fn get_ad_account(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<AdAccountData, FacebookApiError> {
        let mut body = self
            .get_json(
                account_id,
                access_token,
                &[("fields", FB_AD_ACCOUNT_FIELDS.to_string())],
            )
            .await?;

        if let Some(error) = body.get_mut("error").map(Value::take) {
            let error: GraphError = serde_json::from_value(error)
                .map_err(|e| FacebookApiError::InvalidResponse(e.to_string()))?;
            return Err(api_error(error));
        }

        serde_json::from_value(body).map_err(|e| FacebookApiError::InvalidResponse(e.to_string()))
    }

    async fn get_campaigns(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<CampaignData>, FacebookApiError> {
        self.get_list(
            &format!("{}/campaigns", account_id),
            access_token,
            &[
                ("fields", FB_CAMPAIGN_FIELDS.to_string()),
                ("limit", FB_PAGE_LIMIT.to_string()),
            ],
        )
        .await
    }

    async fn get_campaign_insights(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<InsightData>, FacebookApiError> {
        self.get_list(
            &format!("{}/insights", account_id),
            access_token,
            &[
                ("level", "campaign".to_string()),
                ("date_preset", "maximum".to_string()),
                ("fields", FB_INSIGHT_FIELDS.to_string()),
                ("limit", FB_PAGE_LIMIT.to_string()),
            ],
        )
        .await
    }
}
