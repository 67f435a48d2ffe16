//! Gateway 配置

use std::env;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expires_in_secs: i64,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        // 安全关键配置必须从环境变量读取，不提供默认值
        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET environment variable must be set. Generate a secure random key (at least 32 bytes).");

        // 验证 JWT 密钥强度
        if jwt_secret.len() < 32 {
            panic!("JWT_SECRET must be at least 32 characters long for security.");
        }

        Self {
            host: env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("GATEWAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            jwt_secret,
            jwt_expires_in_secs: env::var("JWT_EXPIRES_IN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        }
    }
}
