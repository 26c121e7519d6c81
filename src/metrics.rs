use crate::constants::{
    DEFAULT_REVENUE_PER_CONVERSION,
    DEFAULT_REVENUE_SPEND_MULTIPLIER,
    UNKNOWN_EFFECTIVE_STATUS,
};
use crate::facebook::{ActionValue, InsightData};
use crate::models::{CampaignMetrics, CampaignStatus};

// Effective statuses that map to something other than inactive.
const EFFECTIVE_STATUS_TABLE: &[(&str, CampaignStatus)] = &[
    ("ACTIVE", CampaignStatus::Active),
    ("PAUSED", CampaignStatus::Paused),
];

// Action types counted as conversions, highest priority first.
const CONVERSION_ACTION_TYPES: &[&str] = &["lead", "purchase"];

pub fn map_effective_status(effective_status: Option<&str>) -> CampaignStatus {
    effective_status
        .and_then(|status| {
            EFFECTIVE_STATUS_TABLE
                .iter()
                .find(|(name, _)| *name == status)
                .map(|(_, mapped)| *mapped)
        })
        .unwrap_or(CampaignStatus::Inactive)
}

/// Estimates revenue for a campaign from its conversions and spend.
pub trait RevenueEstimator: Send + Sync {
    fn estimate(&self, conversions: i64, spend: f64) -> f64;
}

/// Placeholder revenue model: a fixed payout per conversion, or a spend
/// multiplier when there are no conversions. Not real revenue data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaceholderRevenue {
    pub payout_per_conversion: f64,
    pub spend_multiplier: f64,
}

impl Default for PlaceholderRevenue {
    fn default() -> Self {
        Self {
            payout_per_conversion: DEFAULT_REVENUE_PER_CONVERSION,
            spend_multiplier: DEFAULT_REVENUE_SPEND_MULTIPLIER,
        }
    }
}

impl RevenueEstimator for PlaceholderRevenue {
    fn estimate(&self, conversions: i64, spend: f64) -> f64 {
        if conversions > 0 {
            conversions as f64 * self.payout_per_conversion
        } else {
            spend * self.spend_multiplier
        }
    }
}

pub fn parse_f64(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Integer counts occasionally arrive as "40.0"; those truncate to 40.
pub fn parse_i64(value: Option<&str>) -> i64 {
    let Some(raw) = value.map(str::trim) else {
        return 0;
    };

    raw.parse::<i64>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i64)
        })
        .unwrap_or(0)
}

/// First `lead` action if any, otherwise first `purchase` action, otherwise 0.
pub fn extract_conversions(actions: &[ActionValue]) -> i64 {
    CONVERSION_ACTION_TYPES
        .iter()
        .find_map(|action_type| actions.iter().find(|a| a.action_type == *action_type))
        .map(|action| parse_i64(action.value.as_deref()))
        .unwrap_or(0)
}

pub fn metrics_from_insight(
    insight: &InsightData,
    effective_status: Option<&str>,
    revenue: &dyn RevenueEstimator,
) -> CampaignMetrics {
    let spend = parse_f64(insight.spend.as_deref());
    let conversions = extract_conversions(&insight.actions);

    CampaignMetrics {
        external_id: insight.campaign_id.clone(),
        spend,
        clicks: parse_i64(insight.clicks.as_deref()),
        impressions: parse_i64(insight.impressions.as_deref()),
        conversions,
        revenue: revenue.estimate(conversions, spend),
        cpc: parse_f64(insight.cpc.as_deref()),
        ctr: parse_f64(insight.ctr.as_deref()),
        effective_status: effective_status
            .unwrap_or(UNKNOWN_EFFECTIVE_STATUS)
            .to_string(),
    }
}

impl CampaignMetrics {
    /// Metrics for a campaign with no recorded activity.
    pub fn zeroed(external_id: &str, effective_status: Option<&str>) -> Self {
        Self {
            external_id: external_id.to_string(),
            effective_status: effective_status
                .unwrap_or(UNKNOWN_EFFECTIVE_STATUS)
                .to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(action_type: &str, value: &str) -> ActionValue {
        ActionValue {
            action_type: action_type.to_string(),
            value: Some(value.to_string()),
        }
    }

    fn insight(id: &str, spend: &str, clicks: &str, impressions: &str, actions: Vec<ActionValue>) -> InsightData {
        InsightData {
            campaign_id: id.to_string(),
            campaign_name: Some(format!("Campaign {}", id)),
            spend: Some(spend.to_string()),
            clicks: Some(clicks.to_string()),
            impressions: Some(impressions.to_string()),
            cpc: None,
            ctr: None,
            actions,
        }
    }

    #[test]
    fn effective_status_mapping_is_total() {
        assert_eq!(map_effective_status(Some("ACTIVE")), CampaignStatus::Active);
        assert_eq!(map_effective_status(Some("PAUSED")), CampaignStatus::Paused);
        assert_eq!(map_effective_status(Some("ARCHIVED")), CampaignStatus::Inactive);
        assert_eq!(map_effective_status(Some("CAMPAIGN_PAUSED")), CampaignStatus::Inactive);
        assert_eq!(map_effective_status(Some("active")), CampaignStatus::Inactive);
        assert_eq!(map_effective_status(None), CampaignStatus::Inactive);
    }

    #[test]
    fn purchase_counts_when_no_lead_is_present() {
        let insight = insight("c1", "120.50", "40", "2000", vec![action("purchase", "3")]);
        let metrics = metrics_from_insight(&insight, Some("ACTIVE"), &PlaceholderRevenue::default());

        assert_eq!(metrics.external_id, "c1");
        assert_eq!(metrics.conversions, 3);
        assert_eq!(metrics.revenue, 150.0);
        assert_eq!(metrics.spend, 120.5);
        assert_eq!(metrics.clicks, 40);
        assert_eq!(metrics.impressions, 2000);
        assert_eq!(metrics.cpc, 0.0);
        assert_eq!(metrics.effective_status, "ACTIVE");
    }

    #[test]
    fn lead_takes_priority_over_purchase() {
        let actions = vec![action("purchase", "9"), action("link_click", "100"), action("lead", "2")];
        assert_eq!(extract_conversions(&actions), 2);
    }

    #[test]
    fn first_matching_action_wins() {
        let actions = vec![action("lead", "4"), action("lead", "7")];
        assert_eq!(extract_conversions(&actions), 4);
        assert_eq!(extract_conversions(&[action("link_click", "5")]), 0);
        assert_eq!(extract_conversions(&[]), 0);
    }

    #[test]
    fn revenue_falls_back_to_spend_multiplier() {
        let insight = insight("c1", "120.50", "40", "2000", vec![]);
        let metrics = metrics_from_insight(&insight, None, &PlaceholderRevenue::default());

        assert_eq!(metrics.conversions, 0);
        assert!((metrics.revenue - 144.6).abs() < 1e-9);
        assert_eq!(metrics.effective_status, "UNKNOWN");
    }

    #[test]
    fn unparsable_values_default_to_zero() {
        let mut insight = insight("c1", "n/a", "", "12.0", vec![action("lead", "many")]);
        insight.ctr = Some("1.75".to_string());
        let metrics = metrics_from_insight(&insight, Some("PAUSED"), &PlaceholderRevenue::default());

        assert_eq!(metrics.spend, 0.0);
        assert_eq!(metrics.clicks, 0);
        assert_eq!(metrics.impressions, 12);
        assert_eq!(metrics.conversions, 0);
        assert_eq!(metrics.revenue, 0.0);
        assert_eq!(metrics.ctr, 1.75);
    }

    #[test]
    fn revenue_policy_is_overridable() {
        let payout = PlaceholderRevenue {
            payout_per_conversion: 80.0,
            spend_multiplier: 1.0,
        };
        let insight = insight("c1", "10", "1", "1", vec![action("lead", "2")]);
        assert_eq!(metrics_from_insight(&insight, None, &payout).revenue, 160.0);
    }

    #[test]
    fn zeroed_metrics_carry_id_and_status() {
        let metrics = CampaignMetrics::zeroed("c2", Some("PAUSED"));
        assert_eq!(metrics.external_id, "c2");
        assert_eq!(metrics.effective_status, "PAUSED");
        assert_eq!(metrics.spend, 0.0);
        assert_eq!(metrics.clicks, 0);
        assert_eq!(metrics.impressions, 0);
        assert_eq!(metrics.conversions, 0);
        assert_eq!(metrics.revenue, 0.0);
        assert_eq!(metrics.cpc, 0.0);
        assert_eq!(metrics.ctr, 0.0);
    }
}
