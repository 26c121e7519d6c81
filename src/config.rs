use crate::constants::{
    DEFAULT_REVENUE_PER_CONVERSION,
    DEFAULT_REVENUE_SPEND_MULTIPLIER,
    FACEBOOK_API_VERSION,
    FACEBOOK_BASE_URL,
    WORKER_INTERVAL_SECS,
};
use dotenv::dotenv;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub facebook_graph_url: String,
    pub facebook_api_version: String,
    pub sync_interval: Duration,
    pub revenue_per_conversion: f64,
    pub revenue_spend_multiplier: f64,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable not found: {0}")]
    MissingEnv(String),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid Graph API URL: {0}")]
    InvalidGraphUrl(String),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests don't have to
    /// touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_URL".to_string()))?;

        // Validate the URL format
        Url::parse(&database_url)
            .map_err(|e| ConfigError::InvalidDatabaseUrl(e.to_string()))?;

        let facebook_graph_url = lookup("FACEBOOK_GRAPH_URL")
            .unwrap_or_else(|| FACEBOOK_BASE_URL.to_string());
        Url::parse(&facebook_graph_url)
            .map_err(|e| ConfigError::InvalidGraphUrl(e.to_string()))?;

        let facebook_api_version = lookup("FACEBOOK_API_VERSION")
            .unwrap_or_else(|| FACEBOOK_API_VERSION.to_string());

        let interval_secs: u64 = parse_or(&lookup, "SYNC_INTERVAL_SECS", WORKER_INTERVAL_SECS)?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SYNC_INTERVAL_SECS".to_string(),
                value: "0".to_string(),
            });
        }
        let revenue_per_conversion =
            parse_or(&lookup, "REVENUE_PER_CONVERSION", DEFAULT_REVENUE_PER_CONVERSION)?;
        let revenue_spend_multiplier =
            parse_or(&lookup, "REVENUE_SPEND_MULTIPLIER", DEFAULT_REVENUE_SPEND_MULTIPLIER)?;

        Ok(Self {
            database_url,
            facebook_graph_url: facebook_graph_url.trim_end_matches('/').to_string(),
            facebook_api_version,
            sync_interval: Duration::from_secs(interval_secs),
            revenue_per_conversion,
            revenue_spend_multiplier,
        })
    }

    pub fn graph_base_url(&self) -> String {
        format!("{}/{}", self.facebook_graph_url, self.facebook_api_version)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &redact_password(&self.database_url))
            .field("facebook_graph_url", &self.facebook_graph_url)
            .field("facebook_api_version", &self.facebook_api_version)
            .field("sync_interval", &self.sync_interval)
            .field("revenue_per_conversion", &self.revenue_per_conversion)
            .field("revenue_spend_multiplier", &self.revenue_spend_multiplier)
            .finish()
    }
}

fn redact_password(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            // Only fails for cannot-be-a-base URLs, which carry no password
            let _ = url.set_password(Some("****"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<invalid>".to_string(),
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}
