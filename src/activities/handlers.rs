use axum::{
    extract::State,
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    activities::{
        dto::{CreateActivityRequest, ListActivitiesQuery, UpdateActivityRequest},
        repo_types::Activity,
        services,
    },
    auth::jwt::AuthUser,
    error::AppResult,
    extract::{ValidatedJson, ValidatedPath, ValidatedQuery},
    pagination::Paginated,
    state::AppState,
};

pub fn activity_routes() -> Router<AppState> {
    Router::new()
        .route("/activities", post(create_activity).get(list_activities))
        .route("/activities/:id", patch(update_activity))
}

#[instrument(skip(state, payload))]
pub async fn create_activity(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateActivityRequest>,
) -> AppResult<(StatusCode, Json<Activity>)> {
    let activity = services::create(&state, user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

#[instrument(skip(state))]
pub async fn list_activities(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedQuery(query): ValidatedQuery<ListActivitiesQuery>,
) -> AppResult<Json<Paginated<Activity>>> {
    Ok(Json(services::list(&state, user.id, query).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_activity(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateActivityRequest>,
) -> AppResult<Json<Activity>> {
    Ok(Json(services::update(&state, user.id, id, payload).await?))
}
