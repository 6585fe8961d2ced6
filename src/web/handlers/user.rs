//! User administration handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::AppState;
use crate::auth::{guard, CredentialStore};
use crate::db::Role;
use crate::web::dto::{ApiResponse, UpdateRoleRequest, UserInfo, ValidatedJson};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

/// PUT /api/users/:id/role - Change a user's role (admin only).
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(user_id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    guard::require_role_modification(caller.role)?;
    let role: Role = req
        .role
        .parse()
        .map_err(|e: crate::db::UnknownRole| ApiError::bad_request(e.to_string()))?;

    let user = CredentialStore::new(state.db.pool())
        .update_role(caller.role, user_id, role)
        .await?;

    tracing::info!(
        actor_id = caller.user_id,
        user_id = user.id,
        role = %user.role,
        "Role updated via API"
    );
    Ok(Json(ApiResponse::new(user.into())))
}
