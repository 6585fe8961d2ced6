//! Bearer token authentication.
//!
//! `jwt_auth` puts the shared [`JwtState`] into the request extensions; the
//! [`AuthUser`] extractor reads it back and runs full validation, including
//! the live role re-check against the database.

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::{bearer_token, Identity, TokenService};
use crate::web::error::ApiError;
use crate::Database;

/// Token validation state shared by every request.
#[derive(Clone)]
pub struct JwtState {
    /// Token issuer/validator.
    pub tokens: Arc<TokenService>,
    /// Database used for the role re-check.
    pub db: Database,
}

impl JwtState {
    pub fn new(tokens: Arc<TokenService>, db: Database) -> Self {
        Self { tokens, db }
    }
}

/// Extractor for authenticated callers.
///
/// Rejects with 401 unless the bearer token is valid and its role still
/// matches the stored user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let header = parts
                .headers
                .get(AUTHORIZATION)
                .map(|value| value.to_str().unwrap_or_default());
            let token = bearer_token(header).map_err(|e| ApiError::unauthorized(e.to_string()))?;

            let jwt_state = parts
                .extensions
                .get::<Arc<JwtState>>()
                .ok_or_else(|| ApiError::internal("JWT state not configured"))?;

            let identity = jwt_state
                .tokens
                .validate(jwt_state.db.pool(), token)
                .await
                .map_err(|e| {
                    tracing::debug!("Token rejected: {}", e);
                    ApiError::from(e)
                })?;

            Ok(AuthUser(identity))
        })
    }
}

/// Middleware function to inject JWT state into request extensions.
pub async fn jwt_auth(
    jwt_state: Arc<JwtState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(jwt_state);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, Role, UserRepository};
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::util::ServiceExt;

    async fn whoami(AuthUser(identity): AuthUser) -> String {
        format!("{}:{}", identity.user_id, identity.role)
    }

    async fn app() -> (Router, Arc<JwtState>, String) {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserRepository::new(db.pool())
            .create(&NewUser::new("a@x.com", "hash").with_role(Role::Moderator))
            .await
            .unwrap();
        let tokens = Arc::new(TokenService::new("test-secret", 3600));
        let token = tokens.issue(&user).unwrap();
        let state = Arc::new(JwtState::new(tokens, db));

        let for_layer = state.clone();
        let router = Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn(move |req, next| {
                jwt_auth(for_layer.clone(), req, next)
            }));
        (router, state, token)
    }

    fn request(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_extracts_identity() {
        let (router, _, token) = app().await;
        let response = router
            .oneshot(request(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header_is_unauthorized() {
        let (router, _, token) = app().await;
        for auth in [None, Some("Basic abc"), Some(token.as_str()), Some("Bearer ")] {
            let response = router.clone().oneshot(request(auth)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_role_change_invalidates_token() {
        let (router, state, token) = app().await;
        UserRepository::new(state.db.pool())
            .update_role(1, Role::User)
            .await
            .unwrap();

        let response = router
            .oneshot(request(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
