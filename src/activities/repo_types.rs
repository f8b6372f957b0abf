use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::pagination::PageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "activity_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Call,
    Email,
    Meeting,
    Task,
    Note,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub subject: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub completed: bool,
    pub deal_id: Option<Uuid>,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub kind: ActivityType,
    pub subject: String,
    pub description: Option<String>,
    pub due_date: Option<OffsetDateTime>,
    pub deal_id: Option<Uuid>,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityChanges {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<OffsetDateTime>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub user_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub completed: Option<bool>,
    pub page: PageRequest,
}
