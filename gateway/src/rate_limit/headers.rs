//! 限流响应头投影
//!
//! 把检查结果格式化为标准的 X-RateLimit-* 响应头。纯函数，无副作用。

use axum::http::{HeaderMap, HeaderValue};

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// 投影后的限流头（全部为已格式化的字符串值）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: String,
    pub remaining: String,
    /// 窗口重置时间，Unix 秒（毫秒向上取整）
    pub reset: String,
}

/// 由检查结果的三个字段生成响应头值
pub fn project(remaining: u64, reset_at_ms: u64, limit: u64) -> RateLimitHeaders {
    RateLimitHeaders {
        limit: limit.to_string(),
        remaining: remaining.to_string(),
        reset: reset_at_ms.div_ceil(1_000).to_string(),
    }
}

impl RateLimitHeaders {
    /// 写入响应头集合
    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Ok(val) = HeaderValue::from_str(&self.limit) {
            headers.insert(HEADER_LIMIT, val);
        }
        if let Ok(val) = HeaderValue::from_str(&self.remaining) {
            headers.insert(HEADER_REMAINING, val);
        }
        if let Ok(val) = HeaderValue::from_str(&self.reset) {
            headers.insert(HEADER_RESET, val);
        }
    }
}
