use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    customers::{
        dto::{
            CreateCustomerRequest, CreateInteractionRequest, CustomerDetails,
            LifetimeValueResponse, ListCustomersQuery, UpdateCustomerRequest, UpdateScoreRequest,
        },
        repo_types::{Customer, CustomerStats, Interaction},
        services,
    },
    error::AppResult,
    extract::{ValidatedJson, ValidatedPath, ValidatedQuery},
    pagination::Paginated,
    state::AppState,
};

pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/customers", post(create_customer).get(list_customers))
        .route("/customers/stats", get(customer_stats))
        .route(
            "/customers/:id",
            get(get_customer)
                .patch(update_customer)
                .delete(delete_customer),
        )
        .route("/customers/:id/score", patch(update_score))
        .route("/customers/:id/calculate-ltv", post(calculate_ltv))
        .route(
            "/customers/:id/interactions",
            post(create_interaction).get(list_interactions),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_customer(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateCustomerRequest>,
) -> AppResult<(StatusCode, Json<Customer>)> {
    let customer = services::create(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

#[instrument(skip(state))]
pub async fn list_customers(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedQuery(query): ValidatedQuery<ListCustomersQuery>,
) -> AppResult<Json<Paginated<Customer>>> {
    Ok(Json(services::list(&state, query).await?))
}

#[instrument(skip(state))]
pub async fn customer_stats(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<CustomerStats>> {
    Ok(Json(services::stats(&state, OffsetDateTime::now_utc()).await?))
}

#[instrument(skip(state))]
pub async fn get_customer(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> AppResult<Json<CustomerDetails>> {
    Ok(Json(services::find_one(&state, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_customer(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateCustomerRequest>,
) -> AppResult<Json<Customer>> {
    Ok(Json(services::update(&state, id, payload).await?))
}

#[instrument(skip(state))]
pub async fn delete_customer(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> AppResult<StatusCode> {
    services::remove(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn update_score(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateScoreRequest>,
) -> AppResult<Json<Customer>> {
    Ok(Json(services::update_score(&state, id, payload.score).await?))
}

#[instrument(skip(state))]
pub async fn calculate_ltv(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> AppResult<Json<LifetimeValueResponse>> {
    let lifetime_value = services::calculate_lifetime_value(&state, id).await?;
    Ok(Json(LifetimeValueResponse { lifetime_value }))
}

#[instrument(skip(state, payload))]
pub async fn create_interaction(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<CreateInteractionRequest>,
) -> AppResult<(StatusCode, Json<Interaction>)> {
    let interaction = services::record_interaction(&state, id, user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(interaction)))
}

#[instrument(skip(state))]
pub async fn list_interactions(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> AppResult<Json<Vec<Interaction>>> {
    Ok(Json(services::interactions(&state, id).await?))
}
