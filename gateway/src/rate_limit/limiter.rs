//! 限流器
//!
//! 固定窗口算法：对 `{identifier}:{tier}` 组合键计数，
//! 窗口到期后从零重建。

use crate::rate_limit::config::RateLimitConfig;
use crate::rate_limit::store::{RateLimitStore, now_epoch_ms};
use crate::rate_limit::types::{PlanTier, RateLimitResult};
use redmark_errors::AppResult;
use std::sync::Arc;

/// 限流器
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<RateLimitStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<RateLimitStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// 检查是否允许请求
    ///
    /// # 参数
    /// - `identifier`: 调用者标识（`user:{id}` 或 `ip:{ip}`）
    /// - `tier`: 订阅等级
    ///
    /// 本次调用本身计入配额。恰好达到 `max_requests` 的请求仍被允许，
    /// 第 `max_requests + 1` 次才是第一次拒绝——这个边界是刻意保留的，
    /// 改动它会改变对外可见的配额语义。
    pub fn check(&self, identifier: &str, tier: PlanTier) -> AppResult<RateLimitResult> {
        self.check_at(identifier, tier, now_epoch_ms())
    }

    fn check_at(&self, identifier: &str, tier: PlanTier, now_ms: u64) -> AppResult<RateLimitResult> {
        let limit = self.config.limit_for(tier);
        let key = format!("{}:{}", identifier, tier.as_str());

        let (count, reset_at_ms) = self.store.hit_at(&key, limit.window_ms, now_ms)?;

        let allowed = count <= limit.max_requests;
        let remaining = limit.max_requests.saturating_sub(count);
        let retry_after = if allowed {
            None
        } else {
            Some(reset_at_ms.saturating_sub(now_ms).div_ceil(1_000))
        };

        Ok(RateLimitResult {
            allowed,
            count,
            remaining,
            limit: limit.max_requests,
            reset_at_ms,
            retry_after,
        })
    }
}
