//! Authentication handlers.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use super::AppState;
use crate::auth::CredentialStore;
use crate::db::User;
use crate::web::dto::{
    ApiResponse, AuthResponse, LoginRequest, MeResponse, RegisterRequest, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

fn auth_response(state: &AppState, user: User) -> Result<AuthResponse, ApiError> {
    let token = state.tokens.issue(&user)?;
    Ok(AuthResponse {
        token,
        token_type: "Bearer",
        expires_in: state.tokens.lifetime_secs(),
        user: user.into(),
    })
}

/// POST /api/auth/register - Create an account and sign in.
pub async fn register(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), ApiError> {
    let user = CredentialStore::new(state.db.pool())
        .create(&req.email, &req.password)
        .await?;

    let response = auth_response(&state, user)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(response))))
}

/// POST /api/auth/login - Exchange credentials for a token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let user = CredentialStore::new(state.db.pool())
        .authenticate(&req.email, &req.password)
        .await?;

    tracing::info!(user_id = user.id, "User logged in");
    let response = auth_response(&state, user)?;
    Ok(Json(ApiResponse::new(response)))
}

/// GET /api/auth/me and /api/users/me - Current caller.
pub async fn me(AuthUser(identity): AuthUser) -> Json<ApiResponse<MeResponse>> {
    Json(ApiResponse::new(identity.into()))
}
