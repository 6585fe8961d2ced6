//! Router configuration.

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    cleanup_expired, get_message, list_inbox, list_sent, list_spam, list_trash, login, me,
    register, send_message, update_label, update_role, AppState,
};
use super::middleware::{
    api_rate_limit, create_cors_layer, jwt_auth, login_rate_limit, security_headers, JwtState,
    RateLimitState,
};

/// Build the `/api` router with all middleware applied.
pub fn create_router(
    app_state: Arc<AppState>,
    rate_limits: Arc<RateLimitState>,
    cors_origins: &[String],
) -> Router {
    let jwt_state = Arc::new(JwtState::new(
        app_state.tokens.clone(),
        app_state.db.clone(),
    ));

    let login_limits = rate_limits.clone();
    let auth_routes = Router::new()
        .route(
            "/login",
            post(login).layer(middleware::from_fn(move |req, next| {
                login_rate_limit(login_limits.clone(), req, next)
            })),
        )
        .route("/register", post(register))
        .route("/me", get(me));

    let user_routes = Router::new()
        .route("/me", get(me))
        .route("/:id/role", put(update_role));

    let message_routes = Router::new()
        .route("/", post(send_message))
        .route("/inbox", get(list_inbox))
        .route("/sent", get(list_sent))
        .route("/spam", get(list_spam))
        .route("/trash", get(list_trash))
        .route("/cleanup", post(cleanup_expired))
        .route("/:id", get(get_message))
        .route("/:id/label", put(update_label));

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/messages", message_routes);

    let api_limits = rate_limits;
    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(middleware::from_fn(security_headers))
                .layer(middleware::from_fn(move |req, next| {
                    api_rate_limit(api_limits.clone(), req, next)
                }))
                .layer(middleware::from_fn(move |req, next| {
                    jwt_auth(jwt_state.clone(), req, next)
                })),
        )
        .with_state(app_state)
}

/// Health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "OK"
}

/// Full application: API, health check and response compression.
pub fn create_app(
    app_state: Arc<AppState>,
    rate_limits: Arc<RateLimitState>,
    cors_origins: &[String],
) -> Router {
    create_router(app_state, rate_limits, cors_origins)
        .merge(create_health_router())
        .layer(CompressionLayer::new())
}
