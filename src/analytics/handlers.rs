use axum::{extract::State, routing::get, Json, Router};
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    analytics::{dto::Dashboard, services},
    auth::jwt::AuthUser,
    error::AppResult,
    state::AppState,
};

pub fn analytics_routes() -> Router<AppState> {
    Router::new().route("/analytics/dashboard", get(dashboard))
}

#[instrument(skip(state))]
pub async fn dashboard(State(state): State<AppState>, _user: AuthUser) -> AppResult<Json<Dashboard>> {
    Ok(Json(services::dashboard(&state, OffsetDateTime::now_utc()).await?))
}
