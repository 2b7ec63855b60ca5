//! Access Token（JWT）编解码
//!
//! Access Token 是紧凑序列化的 JWS，使用 HMAC 签名（默认 HS256），
//! 载荷包含 `{sub, iss, aud, iat, nbf, exp}`，全部为必需字段。
//!
//! 时间相关的检查不交给 `jsonwebtoken`，而是在签名验证通过后使用注入的
//! [`Clock`] 取一次当前时间统一判断，过期边界因此可以精确测试：
//! `now >= exp` 即视为过期。
//!
//! ## 示例
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use commerce_auth::token::AccessTokenCodec;
//!
//! let secret = "thisisaverylongsecretkeythatexceedslimit";
//! let codec = AccessTokenCodec::new("commerce-api", "commerce-web");
//!
//! let token = codec
//!     .issue("user-42", secret, Utc::now() + Duration::minutes(15))
//!     .unwrap();
//! let claims = codec.validate(&token, secret).unwrap();
//! assert_eq!(claims.sub, "user-42");
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SecretPolicy;
use crate::error::{ConfigError, Error, Result, TokenError};

/// JWT 签名算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JwtAlgorithm {
    /// HMAC-SHA256（默认）
    #[default]
    HS256,
    /// HMAC-SHA384
    HS384,
    /// HMAC-SHA512
    HS512,
}

impl From<JwtAlgorithm> for Algorithm {
    fn from(alg: JwtAlgorithm) -> Self {
        match alg {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
        }
    }
}

/// Access Token 载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// 主题（用户 ID）
    pub sub: String,

    /// 签发者
    pub iss: String,

    /// 接收者
    pub aud: String,

    /// 签发时间（Unix 时间戳）
    pub iat: i64,

    /// 生效时间（Unix 时间戳）
    pub nbf: i64,

    /// 过期时间（Unix 时间戳）
    pub exp: i64,
}

impl Claims {
    /// 过期时间
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Access Token 编解码器
///
/// 只持有不可变配置，可以在线程间共享。
#[derive(Debug, Clone)]
pub struct AccessTokenCodec {
    issuer: String,
    audience: String,
    algorithm: JwtAlgorithm,
    policy: SecretPolicy,
    clock: Arc<dyn Clock>,
}

impl AccessTokenCodec {
    /// 创建新的编解码器，使用系统时钟和默认密钥策略
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            algorithm: JwtAlgorithm::default(),
            policy: SecretPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// 设置签名算法
    pub fn with_algorithm(mut self, algorithm: JwtAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// 设置密钥策略
    pub fn with_secret_policy(mut self, policy: SecretPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 设置时钟
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 签发者
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// 接收者
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// 签发 Access Token
    ///
    /// `iat` 与 `nbf` 均为当前时间，`exp` 为 `expires_at`。
    /// 密钥不满足策略或 `expires_at` 不晚于当前时间时返回 [`ConfigError`]。
    pub fn issue(&self, subject: &str, secret: &str, expires_at: DateTime<Utc>) -> Result<String> {
        self.policy.check("access_token_secret", secret)?;

        let now = self.clock.now().timestamp();
        let exp = expires_at.timestamp();
        if exp <= now {
            return Err(Error::Config(ConfigError::InvalidValue {
                key: "expires_at".to_string(),
                message: "must be in the future".to_string(),
            }));
        }

        let claims = Claims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            nbf: now,
            exp,
        };

        let header = Header::new(self.algorithm.into());
        let key = EncodingKey::from_secret(secret.as_bytes());
        let token = encode(&header, &claims, &key).map_err(|e| {
            Error::Token(TokenError::EncodingFailed(format!(
                "failed to encode JWT: {}",
                e
            )))
        })?;

        debug!(subject = %subject, exp, "access token issued");
        Ok(token)
    }

    /// 验证 Access Token 并返回载荷
    ///
    /// 检查顺序：签名与结构、签发者、接收者、时间窗口。
    pub fn validate(&self, token: &str, secret: &str) -> Result<Claims> {
        self.policy.check("access_token_secret", secret)?;

        let validation = self.build_validation();
        let key = DecodingKey::from_secret(secret.as_bytes());

        let claims = decode::<Claims>(token, &key, &validation)
            .map_err(|e| {
                if matches!(e.kind(), ErrorKind::InvalidSignature) {
                    warn!(target: "security", "access token signature verification failed");
                }
                Error::Token(TokenError::Malformed(e.to_string()))
            })?
            .claims;

        if claims.iss != self.issuer {
            return Err(Error::Token(TokenError::InvalidIssuer));
        }
        if claims.aud != self.audience {
            return Err(Error::Token(TokenError::InvalidAudience));
        }
        if claims.nbf > claims.exp {
            return Err(Error::Token(TokenError::Malformed(
                "nbf is later than exp".to_string(),
            )));
        }

        let now = self.clock.now().timestamp();
        if now >= claims.exp {
            return Err(Error::Token(TokenError::Expired));
        }
        if now < claims.nbf {
            return Err(Error::Token(TokenError::NotYetValid));
        }

        Ok(claims)
    }

    fn build_validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm.into());
        // 时间、签发者、接收者在解码后统一检查
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;
        validation
    }
}
