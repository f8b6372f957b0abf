use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    deals::{
        dto::{CreateDealRequest, CreateNoteRequest, DealDetails, ListDealsQuery, UpdateDealRequest},
        repo_types::{Deal, DealStats, Note},
        services,
    },
    error::AppResult,
    extract::{ValidatedJson, ValidatedPath, ValidatedQuery},
    pagination::Paginated,
    state::AppState,
};

pub fn deal_routes() -> Router<AppState> {
    Router::new()
        .route("/deals", post(create_deal).get(list_deals))
        .route("/deals/stats", get(deal_stats))
        .route(
            "/deals/:id",
            get(get_deal).patch(update_deal).delete(delete_deal),
        )
        .route("/deals/:id/notes", post(create_note).get(list_notes))
}

#[instrument(skip(state, payload))]
pub async fn create_deal(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateDealRequest>,
) -> AppResult<(StatusCode, Json<Deal>)> {
    let deal = services::create(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

#[instrument(skip(state))]
pub async fn list_deals(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedQuery(query): ValidatedQuery<ListDealsQuery>,
) -> AppResult<Json<Paginated<Deal>>> {
    Ok(Json(services::list(&state, query).await?))
}

#[instrument(skip(state))]
pub async fn deal_stats(State(state): State<AppState>, _user: AuthUser) -> AppResult<Json<DealStats>> {
    Ok(Json(services::stats(&state).await?))
}

#[instrument(skip(state))]
pub async fn get_deal(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> AppResult<Json<DealDetails>> {
    Ok(Json(services::find_one(&state, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_deal(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateDealRequest>,
) -> AppResult<Json<Deal>> {
    Ok(Json(services::update(&state, id, payload).await?))
}

#[instrument(skip(state))]
pub async fn delete_deal(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> AppResult<StatusCode> {
    services::remove(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn create_note(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<CreateNoteRequest>,
) -> AppResult<(StatusCode, Json<Note>)> {
    let note = services::add_note(&state, id, user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

#[instrument(skip(state))]
pub async fn list_notes(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> AppResult<Json<Vec<Note>>> {
    Ok(Json(services::notes(&state, id).await?))
}
