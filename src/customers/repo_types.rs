use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::pagination::{PageRequest, SortOrder};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub tags: Vec<String>,
    pub score: i32,
    pub lifetime_value: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub(crate) struct CustomerRow {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Json<Address>>,
    pub tags: Vec<String>,
    pub score: i32,
    pub lifetime_value: Decimal,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<CustomerRow> for Customer {
    fn from(r: CustomerRow) -> Self {
        Self {
            id: r.id,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            company: r.company,
            phone: r.phone,
            address: r.address.map(|Json(a)| a),
            tags: r.tags,
            score: r.score,
            lifetime_value: r.lifetime_value,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub tags: Vec<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct CustomerChanges {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub tags: Option<Vec<String>>,
    pub score: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomerSortBy {
    #[default]
    CreatedAt,
    Score,
    LifetimeValue,
}

impl CustomerSortBy {
    pub fn column(self) -> &'static str {
        match self {
            CustomerSortBy::CreatedAt => "created_at",
            CustomerSortBy::Score => "score",
            CustomerSortBy::LifetimeValue => "lifetime_value",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CustomerFilter {
    pub search: Option<String>,
    pub tags: Vec<String>,
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
    pub company: Option<String>,
    pub sort_by: CustomerSortBy,
    pub sort_order: SortOrder,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerStats {
    pub total: i64,
    pub new_this_month: i64,
    pub average_score: f64,
    pub total_lifetime_value: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "interaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    Call,
    Email,
    Meeting,
    Chat,
    Social,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "interaction_channel", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Phone,
    Email,
    Website,
    SocialMedia,
    InPerson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "sentiment", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub channel: Channel,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub sentiment: Option<Sentiment>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewInteraction {
    pub customer_id: Uuid,
    pub user_id: Uuid,
    pub kind: InteractionType,
    pub channel: Channel,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub sentiment: Option<Sentiment>,
}
