use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::pagination::PageRequest;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "deal_stage", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealStage {
    #[default]
    Lead,
    Qualified,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl DealStage {
    pub const ALL: [DealStage; 6] = [
        DealStage::Lead,
        DealStage::Qualified,
        DealStage::Proposal,
        DealStage::Negotiation,
        DealStage::ClosedWon,
        DealStage::ClosedLost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DealStage::Lead => "LEAD",
            DealStage::Qualified => "QUALIFIED",
            DealStage::Proposal => "PROPOSAL",
            DealStage::Negotiation => "NEGOTIATION",
            DealStage::ClosedWon => "CLOSED_WON",
            DealStage::ClosedLost => "CLOSED_LOST",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, DealStage::ClosedWon | DealStage::ClosedLost)
    }

    /// Human label, e.g. `CLOSED WON`.
    pub fn label(self) -> String {
        self.as_str().replace('_', " ")
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,
    pub title: String,
    pub value: Decimal,
    pub currency: String,
    pub stage: DealStage,
    pub probability: i32,
    pub customer_id: Uuid,
    pub assigned_to: Uuid,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expected_close_date: Option<OffsetDateTime>,
    /// When the deal last entered a closed stage; `None` while open.
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewDeal {
    pub title: String,
    pub value: Decimal,
    pub currency: String,
    pub stage: DealStage,
    pub probability: i32,
    pub customer_id: Uuid,
    pub assigned_to: Uuid,
    pub expected_close_date: Option<OffsetDateTime>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct DealChanges {
    pub title: Option<String>,
    pub value: Option<Decimal>,
    pub currency: Option<String>,
    pub stage: Option<DealStage>,
    pub probability: Option<i32>,
    pub assigned_to: Option<Uuid>,
    pub expected_close_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct DealFilter {
    pub stage: Option<DealStage>,
    pub assigned_to: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub min_value: Option<Decimal>,
    pub max_value: Option<Decimal>,
    pub page: PageRequest,
}

/// Count and summed value of the deals in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSummary {
    pub stage: DealStage,
    pub count: i64,
    pub value: Decimal,
}

/// Closed-won revenue for the calendar month starting on `month`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyRevenue {
    pub month: Date,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealStats {
    pub total: i64,
    pub total_value: Decimal,
    pub by_stage: BTreeMap<DealStage, i64>,
    pub average_value: Decimal,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewNote {
    pub deal_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
}
