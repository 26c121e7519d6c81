use serde::Serialize;

use crate::models::{Campaign, CampaignStatus};

// ROI (percent) at or above which a campaign is worth scaling.
const SCALE_ROI_THRESHOLD: f64 = 20.0;
const MAX_RISK_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recommendation {
    Scale,
    Monitor,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

pub fn net_profit(spend: f64, revenue: f64) -> f64 {
    revenue - spend
}

/// Return on ad spend as a percentage; 0 when nothing was spent.
pub fn roi(spend: f64, revenue: f64) -> f64 {
    if spend > 0.0 {
        (revenue - spend) / spend * 100.0
    } else {
        0.0
    }
}

/// Probability-of-loss score in percent: the size of a negative ROI.
pub fn risk_score(roi: f64) -> f64 {
    if roi < 0.0 {
        roi.abs().min(MAX_RISK_SCORE)
    } else {
        0.0
    }
}

pub fn recommendation(roi: f64) -> Recommendation {
    if roi >= SCALE_ROI_THRESHOLD {
        Recommendation::Scale
    } else if roi >= 0.0 {
        Recommendation::Monitor
    } else {
        Recommendation::Pause
    }
}

pub fn confidence(roi: f64) -> Confidence {
    match recommendation(roi) {
        Recommendation::Scale => Confidence::High,
        Recommendation::Monitor => Confidence::Medium,
        Recommendation::Pause => Confidence::Low,
    }
}

pub fn cost_per_click(spend: f64, clicks: i64) -> Option<f64> {
    (clicks > 0).then(|| spend / clicks as f64)
}

pub fn click_through_rate(clicks: i64, impressions: i64) -> Option<f64> {
    (impressions > 0).then(|| clicks as f64 / impressions as f64 * 100.0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    pub id: i64,
    pub name: String,
    pub status: CampaignStatus,
    pub spend: f64,
    pub revenue: f64,
    pub net_profit: f64,
    pub roi: f64,
    pub risk_score: f64,
    pub cpc: f64,
    pub ctr: f64,
    pub recommendation: Recommendation,
    pub confidence: Confidence,
}

impl CampaignSummary {
    pub fn from_campaign(campaign: &Campaign) -> Self {
        let m = &campaign.metrics;
        let roi = roi(m.spend, m.revenue);

        Self {
            id: campaign.id,
            name: campaign.name.clone(),
            status: campaign.status,
            spend: m.spend,
            revenue: m.revenue,
            net_profit: net_profit(m.spend, m.revenue),
            roi,
            risk_score: risk_score(roi),
            cpc: cost_per_click(m.spend, m.clicks).unwrap_or(m.cpc),
            ctr: click_through_rate(m.clicks, m.impressions).unwrap_or(m.ctr),
            recommendation: recommendation(roi),
            confidence: confidence(roi),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioStats {
    pub total_spend: f64,
    pub total_revenue: f64,
    pub net_profit: f64,
    pub roi: f64,
    pub campaign_count: usize,
    pub active_campaigns: usize,
    pub campaigns_at_risk: usize,
}

impl PortfolioStats {
    pub fn from_campaigns(campaigns: &[Campaign]) -> Self {
        let total_spend: f64 = campaigns.iter().map(|c| c.metrics.spend).sum();
        let total_revenue: f64 = campaigns.iter().map(|c| c.metrics.revenue).sum();

        Self {
            total_spend,
            total_revenue,
            net_profit: net_profit(total_spend, total_revenue),
            roi: roi(total_spend, total_revenue),
            campaign_count: campaigns.len(),
            active_campaigns: campaigns
                .iter()
                .filter(|c| c.status == CampaignStatus::Active)
                .count(),
            campaigns_at_risk: campaigns
                .iter()
                .filter(|c| risk_score(roi(c.metrics.spend, c.metrics.revenue)) > 0.0)
                .count(),
        }
    }
}
