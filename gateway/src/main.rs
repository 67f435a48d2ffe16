//! Redmark API Gateway
//!
//! 站在 `/api/` 命名空间前的请求准入层：按订阅等级做固定窗口限流，
//! 放行的请求转发给下游处理器并附带限流头。

mod config;
mod middleware;
mod rate_limit;
mod routing;

use axum::{Router, routing::get};
use rate_limit::{RateLimitMiddleware, RateLimitStore, RateLimiter, Sweeper};
use redmark_auth_core::TokenService;
use redmark_telemetry::{PrometheusHandle, init_metrics, init_tracing};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // 初始化 tracing
    init_tracing("info");

    // 加载配置
    let config = config::GatewayConfig::from_env();
    let rate_config = rate_limit::RateLimitConfig::from_env();

    // 初始化 metrics
    let metrics_handle = init_metrics();

    let token_service = TokenService::new(&config.jwt_secret, config.jwt_expires_in_secs);

    // 限流存储与后台清理任务（显式注入，进程内状态）
    let store = Arc::new(RateLimitStore::new());
    let sweeper = Sweeper::start(
        Arc::clone(&store),
        Duration::from_millis(rate_config.sweep_interval_ms),
    );

    let limiter = RateLimiter::new(store, rate_config);
    let admission = Arc::new(RateLimitMiddleware::new(limiter, token_service.clone()));

    let app = build_app(token_service, admission, metrics_handle);

    // 启动服务器
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid address");

    info!(%addr, "Starting gateway");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 关停时回收后台任务
    sweeper.stop().await;
    info!("Gateway stopped");

    Ok(())
}

/// 组装完整的路由栈：限流中间件包在所有路由外层，
/// 非 /api/ 路径（如 /metrics）由中间件自己放过
fn build_app(
    token_service: TokenService,
    admission: Arc<RateLimitMiddleware>,
    metrics_handle: PrometheusHandle,
) -> Router {
    routing::api_routes(token_service)
        .route("/metrics", get(move || async move { metrics_handle.render() }))
        .layer(axum::middleware::from_fn_with_state(
            admission,
            rate_limit::rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
