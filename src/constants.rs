// API Versions
pub const FACEBOOK_API_VERSION: &str = "v19.0";

// API Base URLs
pub const FACEBOOK_BASE_URL: &str = "https://graph.facebook.com";

// Platforms
pub const PLATFORM_FACEBOOK: &str = "facebook";

// Worker Settings
pub const WORKER_INTERVAL_SECS: u64 = 1800; // 30 minutes

// Facebook API Fields
pub const FB_AD_ACCOUNT_LIST_FIELDS: &str = "id,account_id,name,account_status,amount_spent,currency";
pub const FB_AD_ACCOUNT_FIELDS: &str = "id,name,account_status,amount_spent,currency";
pub const FB_CAMPAIGN_FIELDS: &str = "id,name,status,effective_status";
pub const FB_INSIGHT_FIELDS: &str = "campaign_id,campaign_name,spend,clicks,impressions,cpc,ctr,actions";

// Facebook API paging
pub const FB_AD_ACCOUNT_PAGE_LIMIT: u32 = 100;
pub const FB_PAGE_LIMIT: u32 = 500;

// Facebook account_status value for an enabled account
pub const FB_ACCOUNT_STATUS_ACTIVE: i64 = 1;

// Revenue estimate defaults
pub const DEFAULT_REVENUE_PER_CONVERSION: f64 = 50.0;
pub const DEFAULT_REVENUE_SPEND_MULTIPLIER: f64 = 1.2;

// Placeholder effective status for insights without a roster entry
pub const UNKNOWN_EFFECTIVE_STATUS: &str = "UNKNOWN";
