use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::activities::repo_types::{Activity, ActivityType};

/// Headline figures. `*Change` fields are month-over-month percentages,
/// `null` when last month's figure was zero.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub revenue: Decimal,
    pub revenue_change: Option<f64>,
    pub customers: i64,
    pub customers_change: Option<f64>,
    pub active_deals: i64,
    pub deals_change: Option<f64>,
    pub conversion_rate: f64,
    pub conversion_change: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenuePoint {
    /// `YYYY-MM`
    pub month: String,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSlice {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub description: String,
    pub user_id: Uuid,
    pub deal_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Activity> for RecentActivity {
    fn from(a: Activity) -> Self {
        Self {
            id: a.id,
            kind: a.kind,
            description: a.subject,
            user_id: a.user_id,
            deal_id: a.deal_id,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub kpis: Kpis,
    pub revenue_chart: Vec<RevenuePoint>,
    pub pipeline_chart: Vec<PipelineSlice>,
    pub recent_activities: Vec<RecentActivity>,
}
