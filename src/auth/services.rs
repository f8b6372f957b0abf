use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{normalize_email, AuthResponse, LoginRequest, RegisterRequest},
        password::{hash_password, verify_dummy, verify_password},
        repo_types::{NewUser, User},
    },
    error::{AppError, AppResult},
    state::AppState,
};

fn issue_tokens(state: &AppState, user: User) -> AppResult<AuthResponse> {
    let access_token = state.jwt.sign_access(&user).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        AppError::Internal(e.to_string())
    })?;
    let refresh_token = state.jwt.sign_refresh(&user).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        AppError::Internal(e.to_string())
    })?;
    Ok(AuthResponse {
        user,
        access_token,
        refresh_token,
        expires_in: state.jwt.access_ttl_secs(),
    })
}

pub async fn register(state: &AppState, payload: RegisterRequest) -> AppResult<AuthResponse> {
    let email = normalize_email(&payload.email);

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::conflict("Email already registered"));
    }

    let password_hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        AppError::Internal(e.to_string())
    })?;

    let user = state
        .users
        .create(NewUser {
            email,
            password_hash,
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            role: payload.role.unwrap_or_default(),
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    issue_tokens(state, user)
}

pub async fn login(state: &AppState, payload: LoginRequest) -> AppResult<AuthResponse> {
    let email = normalize_email(&payload.email);

    let Some(mut user) = state.users.find_by_email(&email).await? else {
        verify_dummy(&payload.password);
        warn!(%email, "login unknown email");
        return Err(AppError::unauthorized("Invalid credentials"));
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        error!(error = %e, user_id = %user.id, "verify_password failed");
        AppError::Internal(e.to_string())
    })?;
    if !ok {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    if !user.is_active {
        warn!(user_id = %user.id, "login on disabled account");
        return Err(AppError::unauthorized("Account is disabled"));
    }

    let now = OffsetDateTime::now_utc();
    state.users.record_login(user.id, now).await?;
    user.last_login = Some(now);

    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue_tokens(state, user)
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<AuthResponse> {
    let claims = state.jwt.verify_refresh(refresh_token).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        AppError::unauthorized("Invalid refresh token")
    })?;

    let user = active_user(state, claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid refresh token"))?;

    info!(user_id = %user.id, "tokens refreshed");
    issue_tokens(state, user)
}

pub async fn profile(state: &AppState, user_id: Uuid) -> AppResult<User> {
    active_user(state, user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))
}

async fn active_user(state: &AppState, id: Uuid) -> AppResult<Option<User>> {
    let user = state.users.find_by_id(id).await?;
    Ok(user.filter(|u| u.is_active))
}
