//! 订阅等级检测
//!
//! 从请求头中提取订阅等级

use crate::rate_limit::types::PlanTier;
use axum::http::HeaderMap;

/// 上游认证逻辑写入的等级头（受信任）
pub const TIER_HEADER: &str = "x-user-tier";

impl PlanTier {
    /// 从请求头检测订阅等级
    ///
    /// 头缺失或值未识别时一律按 free 处理：宁可把未知调用者
    /// 限得更紧，也不给出超出其订阅的配额。
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(TIER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(PlanTier::parse)
            .unwrap_or(PlanTier::Free)
    }
}
