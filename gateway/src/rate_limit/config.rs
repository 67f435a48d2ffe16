//! 限流配置
//!
//! 从环境变量加载各等级的配额。缺失或非法的值静默回退到默认值，
//! 绝不让限流配置阻止服务启动。

use crate::rate_limit::types::{PlanTier, TierLimit};
use std::env;

/// 共享窗口时长默认值（毫秒）
const DEFAULT_WINDOW_MS: u64 = 60_000;

/// 各等级默认配额
const DEFAULT_FREE_MAX: u64 = 10;
const DEFAULT_STARTER_MAX: u64 = 60;
const DEFAULT_PRO_MAX: u64 = 300;
const DEFAULT_ENTERPRISE_MAX: u64 = 1_000;

/// 过期窗口清理间隔默认值（毫秒）
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 300_000;

/// 限流配置
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 所有等级共享的时间窗口（毫秒）
    pub window_ms: u64,
    pub free_max: u64,
    pub starter_max: u64,
    pub pro_max: u64,
    pub enterprise_max: u64,
    /// 后台清理间隔（毫秒）
    pub sweep_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            free_max: DEFAULT_FREE_MAX,
            starter_max: DEFAULT_STARTER_MAX,
            pro_max: DEFAULT_PRO_MAX,
            enterprise_max: DEFAULT_ENTERPRISE_MAX,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            window_ms: env_positive("RATE_LIMIT_WINDOW_MS", DEFAULT_WINDOW_MS),
            free_max: env_positive("RATE_LIMIT_FREE_MAX", DEFAULT_FREE_MAX),
            starter_max: env_positive("RATE_LIMIT_STARTER_MAX", DEFAULT_STARTER_MAX),
            pro_max: env_positive("RATE_LIMIT_PRO_MAX", DEFAULT_PRO_MAX),
            enterprise_max: env_positive("RATE_LIMIT_ENTERPRISE_MAX", DEFAULT_ENTERPRISE_MAX),
            sweep_interval_ms: env_positive("RATE_LIMIT_SWEEP_INTERVAL_MS", DEFAULT_SWEEP_INTERVAL_MS),
        }
    }

    /// 指定等级的限流规则
    pub fn limit_for(&self, tier: PlanTier) -> TierLimit {
        let max_requests = match tier {
            PlanTier::Free => self.free_max,
            PlanTier::Starter => self.starter_max,
            PlanTier::Pro => self.pro_max,
            PlanTier::Enterprise => self.enterprise_max,
        };

        TierLimit {
            window_ms: self.window_ms,
            max_requests,
        }
    }
}

fn env_positive(name: &str, default: u64) -> u64 {
    parse_positive(env::var(name).ok(), default)
}

/// 解析为正整数，失败回退默认值
fn parse_positive(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
