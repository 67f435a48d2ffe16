//! 分级限流中间件
//!
//! 按订阅等级（plan tier）对 `/api/` 命名空间做固定窗口限流

pub mod config;
pub mod headers;
pub mod limiter;
pub mod middleware;
pub mod store;
pub mod tier;
pub mod types;

pub use config::RateLimitConfig;
pub use limiter::RateLimiter;
pub use middleware::{Admission, RateLimitMiddleware, rate_limit_middleware};
pub use store::{RateLimitStore, Sweeper};
pub use types::{PlanTier, RateLimitResult, TierLimit};
