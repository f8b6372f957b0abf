use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::activities::repo_types::Activity;
use crate::deals::repo_types::{Deal, DealStage, Note};

/// Largest value that fits NUMERIC(15, 2).
const MAX_DEAL_VALUE: i64 = 9_999_999_999_999;

fn validate_currency(code: &str) -> Result<(), ValidationError> {
    lazy_static! {
        static ref CURRENCY_RE: Regex = Regex::new(r"^[A-Z]{3}$").unwrap();
    }
    if CURRENCY_RE.is_match(code) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("currency must be a 3-letter ISO code".into());
        Err(err)
    }
}

fn validate_value(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() || *value > Decimal::from(MAX_DEAL_VALUE) {
        let mut err = ValidationError::new("value");
        err.message = Some("value must be between 0 and 9999999999999".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateDealRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(custom(function = "validate_value"))]
    pub value: Decimal,
    #[validate(custom(function = "validate_currency"))]
    pub currency: Option<String>,
    pub stage: Option<DealStage>,
    #[validate(range(min = 0, max = 100))]
    pub probability: Option<i32>,
    pub customer_id: Uuid,
    pub assigned_to: Uuid,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expected_close_date: Option<OffsetDateTime>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateDealRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(custom(function = "validate_value"))]
    pub value: Option<Decimal>,
    #[validate(custom(function = "validate_currency"))]
    pub currency: Option<String>,
    pub stage: Option<DealStage>,
    #[validate(range(min = 0, max = 100))]
    pub probability: Option<i32>,
    pub assigned_to: Option<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expected_close_date: Option<OffsetDateTime>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[validate(schema(function = "validate_value_bounds"))]
pub struct ListDealsQuery {
    pub stage: Option<DealStage>,
    pub assigned_to: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub min_value: Option<Decimal>,
    pub max_value: Option<Decimal>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
}

fn validate_value_bounds(q: &ListDealsQuery) -> Result<(), ValidationError> {
    match (q.min_value, q.max_value) {
        (Some(min), Some(max)) if min > max => {
            let mut err = ValidationError::new("value_bounds");
            err.message = Some("minValue must not exceed maxValue".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateNoteRequest {
    #[validate(length(min = 1, max = 10_000))]
    pub content: String,
}

/// A deal together with its notes and activities.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealDetails {
    #[serde(flatten)]
    pub deal: Deal,
    pub notes: Vec<Note>,
    pub activities: Vec<Activity>,
}
