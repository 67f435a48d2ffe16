//! 数据结构定义

use serde::{Deserialize, Serialize};

/// 订阅等级
///
/// 顺序即配额顺序：free 的配额最小，enterprise 最大。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// 免费版
    Free,
    /// 入门版
    Starter,
    /// 专业版
    Pro,
    /// 企业版
    Enterprise,
}

impl PlanTier {
    /// 按配额升序排列的全部等级
    pub const ALL: [PlanTier; 4] = [Self::Free, Self::Starter, Self::Pro, Self::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// 解析等级名，未识别返回 None
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Self::Free),
            "starter" => Some(Self::Starter),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

/// 单个等级的限流规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimit {
    /// 时间窗口（毫秒）
    pub window_ms: u64,
    /// 窗口内最大请求数
    pub max_requests: u64,
}

/// 限流检查结果
///
/// 每次检查现场计算，不持久化。
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// 是否允许请求
    pub allowed: bool,
    /// 当前窗口内的请求计数（含本次）
    pub count: u64,
    /// 剩余可用请求数
    pub remaining: u64,
    /// 限制的最大请求数
    pub limit: u64,
    /// 窗口重置时间（Unix 毫秒）
    pub reset_at_ms: u64,
    /// 建议重试等待时间（秒，仅在拒绝时有效）
    pub retry_after: Option<u64>,
}
