//! 限流中间件
//!
//! 请求拦截：路由检查 → 等级/标识解析 → 准入检查 → 放行或 429。
//! 准入结果是三值的：内部故障既不是允许也不是拒绝，而是
//! `Indeterminate`——此时放行请求（失败放行），可用性优先于严格限流。

use crate::rate_limit::headers;
use crate::rate_limit::limiter::RateLimiter;
use crate::rate_limit::types::{PlanTier, RateLimitResult};
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use redmark_auth_core::TokenService;
use std::sync::Arc;
use tracing::{debug, warn};

/// 受限流约束的路径前缀
pub const API_PREFIX: &str = "/api/";

/// 存活检查路径，永不限流
pub const HEALTH_PATH: &str = "/api/health";

/// 准入结果
#[derive(Debug)]
pub enum Admission {
    /// 在配额内，放行并附带限流头
    Allowed(RateLimitResult),
    /// 超出配额，返回 429
    Denied(RateLimitResult),
    /// 限流器内部故障，放行且不附加任何限流头
    Indeterminate,
}

/// 限流中间件状态
#[derive(Clone)]
pub struct RateLimitMiddleware {
    limiter: RateLimiter,
    tokens: TokenService,
}

impl RateLimitMiddleware {
    pub fn new(limiter: RateLimiter, tokens: TokenService) -> Self {
        Self { limiter, tokens }
    }

    /// 执行准入检查
    pub fn admit(&self, identifier: &str, tier: PlanTier) -> Admission {
        match self.limiter.check(identifier, tier) {
            Ok(result) if result.allowed => Admission::Allowed(result),
            Ok(result) => Admission::Denied(result),
            Err(e) => {
                warn!(error = %e, identifier, tier = tier.as_str(),
                    "Rate limit check failed, failing open");
                Admission::Indeterminate
            }
        }
    }

    /// 提取调用者标识符
    ///
    /// # 优先级
    /// 1. 已认证：`user:{sub}`（会话令牌可解码时）
    /// 2. 未认证：`ip:{x-forwarded-for 的第一项}`
    /// 3. 兜底：`ip:unknown`
    ///
    /// 令牌解码失败静默落入 IP 分支，此路径永不报错。
    pub fn extract_identifier(&self, req: &Request) -> String {
        let bearer = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));

        if let Some(token) = bearer {
            if let Some(sub) = self.tokens.subject_of(token) {
                return format!("user:{}", sub);
            }
        }

        let ip = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown");

        format!("ip:{}", ip)
    }
}

/// 路径是否受限流约束
fn is_limited_path(path: &str) -> bool {
    path.starts_with(API_PREFIX) && path != HEALTH_PATH
}

/// Axum 中间件函数
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimitMiddleware>>,
    request: Request,
    next: Next,
) -> Response {
    if !is_limited_path(request.uri().path()) {
        return next.run(request).await;
    }

    let tier = PlanTier::from_headers(request.headers());
    let identifier = state.extract_identifier(&request);

    match state.admit(&identifier, tier) {
        Admission::Allowed(result) => {
            debug!(
                identifier = %identifier,
                tier = tier.as_str(),
                endpoint = %request.uri().path(),
                count = result.count,
                remaining = result.remaining,
                "Request allowed"
            );
            counter!("gateway_requests_allowed_total", "tier" => tier.as_str()).increment(1);

            let mut response = next.run(request).await;
            headers::project(result.remaining, result.reset_at_ms, result.limit)
                .apply(response.headers_mut());
            response
        }
        Admission::Denied(result) => {
            warn!(
                identifier = %identifier,
                tier = tier.as_str(),
                endpoint = %request.uri().path(),
                "Rate limit exceeded"
            );
            counter!("gateway_requests_denied_total", "tier" => tier.as_str()).increment(1);

            deny_response(&result)
        }
        Admission::Indeterminate => {
            // 失败放行：不附加限流头，请求如同未限流一样通过
            counter!("gateway_requests_indeterminate_total", "tier" => tier.as_str()).increment(1);
            next.run(request).await
        }
    }
}

/// 构造 429 响应
fn deny_response(result: &RateLimitResult) -> Response {
    let body = Json(serde_json::json!({
        "error": "Too many requests",
        "message": "Rate limit exceeded. Please try again later.",
    }));

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();

    headers::project(result.remaining, result.reset_at_ms, result.limit)
        .apply(response.headers_mut());

    if let Some(retry_after) = result.retry_after {
        if let Ok(val) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, val);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::config::RateLimitConfig;
    use crate::rate_limit::store::RateLimitStore;
    use axum::{
        Router,
        body::Body,
        http::Request as HttpRequest,
        middleware,
        routing::get,
    };
    use tower::ServiceExt;

    const TEST_SECRET: &str = "test_secret_at_least_32_characters_long";

    fn test_tokens() -> TokenService {
        TokenService::new(TEST_SECRET, 3600)
    }

    fn app_with_store(store: Arc<RateLimitStore>, config: RateLimitConfig) -> Router {
        let limiter = RateLimiter::new(store, config);
        let state = Arc::new(RateLimitMiddleware::new(limiter, test_tokens()));

        Router::new()
            .route("/api/health", get(|| async { "healthy" }))
            .route("/api/echo", get(|| async { "OK" }))
            .route("/", get(|| async { "root" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
    }

    fn test_app(config: RateLimitConfig) -> Router {
        app_with_store(Arc::new(RateLimitStore::new()), config)
    }

    fn free_config(free_max: u64) -> RateLimitConfig {
        RateLimitConfig {
            free_max,
            ..RateLimitConfig::default()
        }
    }

    fn get_req(path: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_allowed_response_carries_rate_headers() {
        let app = test_app(free_config(2));

        let response = app.oneshot(get_req("/api/echo")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(headers::HEADER_LIMIT).unwrap(), "2");
        assert_eq!(response.headers().get(headers::HEADER_REMAINING).unwrap(), "1");
        assert!(response.headers().contains_key(headers::HEADER_RESET));
        assert!(!response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_denies_with_429_after_quota() {
        let app = test_app(free_config(1));

        let first = app.clone().oneshot(get_req("/api/echo")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(get_req("/api/echo")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get(headers::HEADER_REMAINING).unwrap(), "0");
        assert!(second.headers().contains_key(headers::HEADER_RESET));
        assert!(second.headers().contains_key(header::RETRY_AFTER));

        let body = body_json(second).await;
        assert_eq!(body["error"], "Too many requests");
        assert_eq!(body["message"], "Rate limit exceeded. Please try again later.");
    }

    #[tokio::test]
    async fn test_health_path_is_never_limited() {
        let app = test_app(free_config(1));

        for _ in 0..5 {
            let response = app.clone().oneshot(get_req("/api/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key(headers::HEADER_LIMIT));
        }
    }

    #[tokio::test]
    async fn test_non_api_path_passes_through_unaltered() {
        let app = test_app(free_config(1));

        for _ in 0..5 {
            let response = app.clone().oneshot(get_req("/")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key(headers::HEADER_LIMIT));
        }
    }

    #[tokio::test]
    async fn test_tier_header_selects_quota() {
        let config = RateLimitConfig {
            free_max: 1,
            starter_max: 5,
            ..RateLimitConfig::default()
        };
        let app = test_app(config);

        for _ in 0..3 {
            let req = HttpRequest::builder()
                .uri("/api/echo")
                .header("x-user-tier", "starter")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers().get(headers::HEADER_LIMIT).unwrap(), "5");
        }
    }

    #[tokio::test]
    async fn test_unrecognized_tier_defaults_to_free() {
        let app = test_app(free_config(1));

        let req = |tier: &str| {
            HttpRequest::builder()
                .uri("/api/echo")
                .header("x-user-tier", tier)
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(req("gold")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers().get(headers::HEADER_LIMIT).unwrap(), "1");

        let second = app.oneshot(req("gold")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_authenticated_users_have_independent_quotas() {
        let app = test_app(free_config(1));
        let tokens = test_tokens();
        let token_a = tokens.generate_session_token("user-a", None).unwrap();
        let token_b = tokens.generate_session_token("user-b", None).unwrap();

        let req = |token: &str| {
            HttpRequest::builder()
                .uri("/api/echo")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(
            app.clone().oneshot(req(&token_a)).await.unwrap().status(),
            StatusCode::OK
        );
        // B 的配额独立于 A
        assert_eq!(
            app.clone().oneshot(req(&token_b)).await.unwrap().status(),
            StatusCode::OK
        );
        // A 的第二次请求超额
        assert_eq!(
            app.oneshot(req(&token_a)).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_undecodable_token_falls_back_to_ip() {
        let app = test_app(free_config(1));

        let req = |ip: &str| {
            HttpRequest::builder()
                .uri("/api/echo")
                .header(header::AUTHORIZATION, "Bearer not-a-valid-token")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(
            app.clone().oneshot(req("1.2.3.4")).await.unwrap().status(),
            StatusCode::OK
        );
        // 同一 IP 第二次超额
        assert_eq!(
            app.clone().oneshot(req("1.2.3.4, 10.0.0.1")).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        // 不同 IP 不受影响
        assert_eq!(
            app.oneshot(req("5.6.7.8")).await.unwrap().status(),
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_missing_forwarded_header_shares_unknown_bucket() {
        let app = test_app(free_config(1));

        assert_eq!(
            app.clone().oneshot(get_req("/api/echo")).await.unwrap().status(),
            StatusCode::OK
        );
        // 两个无法识别的调用者落入同一个 ip:unknown 桶
        assert_eq!(
            app.oneshot(get_req("/api/echo")).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_internal_fault_fails_open() {
        let store = Arc::new(RateLimitStore::new());
        store.poison();
        let app = app_with_store(store, free_config(1));

        // 限流器故障时请求照常通过，且不带限流头
        for _ in 0..3 {
            let response = app.clone().oneshot(get_req("/api/echo")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key(headers::HEADER_LIMIT));
        }
    }
}
