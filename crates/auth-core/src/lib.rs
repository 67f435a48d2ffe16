//! redmark-auth-core - 会话令牌核心库
//!
//! JWT 会话令牌的签发与验证。网关用它做两件事：
//! 保护 API 路由（认证中间件），以及为限流提取调用者标识。

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use redmark_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT Claims
///
/// `sub` 保持为字符串：上游用户 ID 是 cuid 格式，不是 UUID。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Email
    #[serde(default)]
    pub email: Option<String>,
    /// Expiration time
    pub exp: i64,
    /// Issued at
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

impl Claims {
    pub fn new(subject: &str, email: Option<String>, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: subject.to_string(),
            email,
            exp: (now + Duration::seconds(expires_in_secs)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::now_v7().to_string(),
        }
    }
}

/// Token 服务
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in_secs: i64,
}

impl TokenService {
    pub fn new(secret: &str, expires_in_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expires_in_secs,
        }
    }

    /// 签发会话令牌
    pub fn generate_session_token(
        &self,
        subject: &str,
        email: Option<String>,
    ) -> AppResult<String> {
        let claims = Claims::new(subject, email, self.expires_in_secs);

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to generate token: {}", e)))
    }

    /// 验证令牌
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::unauthenticated(format!("Invalid token: {}", e)))?;

        let claims = token_data.claims;

        if claims.jti.is_empty() {
            return Err(AppError::unauthenticated("Token ID (jti) missing"));
        }

        Ok(claims)
    }

    /// 尝试提取令牌主体，失败时返回 None
    ///
    /// 限流标识解析用：解码失败必须静默回退到 IP 标识，不得报错。
    pub fn subject_of(&self, token: &str) -> Option<String> {
        self.validate_token(token).ok().map(|claims| claims.sub)
    }
}
