//! API 路由

use crate::middleware::{AuthClaims, auth_middleware};
use axum::{Json, Router, middleware, routing::get};
use redmark_auth_core::TokenService;
use serde::Serialize;

pub fn api_routes(token_service: TokenService) -> Router {
    let protected = Router::new()
        .route("/api/user/me", get(current_user))
        .layer(middleware::from_fn_with_state(token_service, auth_middleware));

    Router::new()
        .route("/api/health", get(health_check))
        .merge(protected)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub service: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        service: "redmark".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub user_id: String,
    pub email: Option<String>,
}

async fn current_user(AuthClaims(claims): AuthClaims) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        user_id: claims.sub,
        email: claims.email,
    })
}
