use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::customers::repo_types::{
    Address, Channel, Customer, CustomerSortBy, Interaction, InteractionType, Sentiment,
};
use crate::deals::repo_types::Deal;
use crate::pagination::SortOrder;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCustomerRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(max = 200))]
    pub company: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    pub address: Option<Address>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Every field optional; absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateCustomerRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    #[validate(length(max = 200))]
    pub company: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub tags: Option<Vec<String>>,
    #[validate(range(min = 0, max = 100))]
    pub score: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateScoreRequest {
    #[validate(range(min = 0, max = 100))]
    pub score: i32,
}

/// Query string of `GET /customers`. `tags` is comma-separated.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[validate(schema(function = "validate_score_bounds"))]
pub struct ListCustomersQuery {
    pub search: Option<String>,
    pub tags: Option<String>,
    #[validate(range(min = 0, max = 100))]
    pub min_score: Option<i32>,
    #[validate(range(min = 0, max = 100))]
    pub max_score: Option<i32>,
    pub company: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
    pub sort_by: Option<CustomerSortBy>,
    pub sort_order: Option<SortOrder>,
}

fn validate_score_bounds(q: &ListCustomersQuery) -> Result<(), ValidationError> {
    match (q.min_score, q.max_score) {
        (Some(min), Some(max)) if min > max => {
            let mut err = ValidationError::new("score_bounds");
            err.message = Some("minScore must not exceed maxScore".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

/// Splits `a, b,,c` into `["a", "b", "c"]`.
pub fn split_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

/// A customer together with its deals and interactions.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    #[serde(flatten)]
    pub customer: Customer,
    pub deals: Vec<Deal>,
    pub interactions: Vec<Interaction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeValueResponse {
    pub lifetime_value: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateInteractionRequest {
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub channel: Channel,
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    #[validate(length(max = 10_000))]
    pub content: Option<String>,
    pub sentiment: Option<Sentiment>,
}
