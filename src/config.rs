//! 配置模块
//!
//! [`AuthConfig`] 是一个在构造时传入的不可变配置值，携带两种 Token 的密钥、
//! 签发者/接收者以及密码与密钥的长度策略。启动时调用
//! [`AuthConfig::validate`]，配置错误会阻止服务开始处理流量。

use std::env;
use std::fmt;

use chrono::Duration;

use crate::error::{ConfigError, Result};

/// 密钥最小长度（字符数）
pub const MIN_SECRET_LENGTH: usize = 32;

/// 默认的密码最小长度（字符数）
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// Token 有效期上限（天）
///
/// 当前时间加上不超过此上限的有效期不会溢出 `DateTime<Utc>`。
pub const MAX_TOKEN_LIFETIME_DAYS: i64 = 3650;

/// 密钥长度策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretPolicy {
    /// 最小长度（字符数）
    pub min_length: usize,
}

impl Default for SecretPolicy {
    fn default() -> Self {
        Self {
            min_length: MIN_SECRET_LENGTH,
        }
    }
}

impl SecretPolicy {
    /// 创建指定最小长度的策略
    ///
    /// 低于 [`MIN_SECRET_LENGTH`] 的值会被提升到下限。
    pub fn new(min_length: usize) -> Self {
        Self {
            min_length: min_length.max(MIN_SECRET_LENGTH),
        }
    }

    /// 检查密钥是否满足策略
    ///
    /// # Example
    ///
    /// ```rust
    /// use commerce_auth::config::SecretPolicy;
    ///
    /// let policy = SecretPolicy::default();
    /// assert!(policy.check("access_token_secret", "thisisaverylongsecretkeythatexceedslimit").is_ok());
    ///
    /// let err = policy.check("access_token_secret", "shortsecret").unwrap_err();
    /// assert!(err.to_string().contains("too short"));
    /// ```
    pub fn check(&self, key: &str, secret: &str) -> Result<()> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired(key.to_string()).into());
        }

        let actual = secret.chars().count();
        if actual < self.min_length {
            return Err(ConfigError::SecretTooShort {
                key: key.to_string(),
                min_length: self.min_length,
                actual,
            }
            .into());
        }

        Ok(())
    }
}

/// 认证子系统配置
#[derive(Clone)]
pub struct AuthConfig {
    /// Access Token 签名密钥
    pub access_token_secret: String,

    /// Refresh Token 签名密钥
    pub refresh_token_secret: String,

    /// 签发者
    pub issuer: String,

    /// 接收者
    pub audience: String,

    /// 密钥长度策略
    pub secret_policy: SecretPolicy,

    /// 密码最小长度
    pub min_password_length: usize,

    /// Access Token 有效期
    pub access_token_lifetime: Duration,

    /// Refresh Token（以及 Session 记录）有效期
    pub refresh_token_lifetime: Duration,
}

impl AuthConfig {
    /// 创建新的配置，其余字段使用默认值
    pub fn new(
        access_token_secret: impl Into<String>,
        refresh_token_secret: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            access_token_secret: access_token_secret.into(),
            refresh_token_secret: refresh_token_secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            secret_policy: SecretPolicy::default(),
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            access_token_lifetime: Duration::minutes(15),
            refresh_token_lifetime: Duration::days(7),
        }
    }

    /// 从环境变量读取配置
    ///
    /// 必需：`AUTH_ACCESS_TOKEN_SECRET`、`AUTH_REFRESH_TOKEN_SECRET`、
    /// `AUTH_ISSUER`、`AUTH_AUDIENCE`。
    ///
    /// 可选：`AUTH_MIN_PASSWORD_LENGTH`、`AUTH_ACCESS_TOKEN_TTL_SECS`、
    /// `AUTH_REFRESH_TOKEN_TTL_SECS`。
    ///
    /// 只负责读取，不做策略检查；调用方随后应调用 [`AuthConfig::validate`]。
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(
            required_env("AUTH_ACCESS_TOKEN_SECRET")?,
            required_env("AUTH_REFRESH_TOKEN_SECRET")?,
            required_env("AUTH_ISSUER")?,
            required_env("AUTH_AUDIENCE")?,
        );

        if let Some(raw) = optional_env("AUTH_MIN_PASSWORD_LENGTH") {
            config.min_password_length = parse_length("AUTH_MIN_PASSWORD_LENGTH", &raw)?;
        }
        if let Some(raw) = optional_env("AUTH_ACCESS_TOKEN_TTL_SECS") {
            config.access_token_lifetime = parse_seconds("AUTH_ACCESS_TOKEN_TTL_SECS", &raw)?;
        }
        if let Some(raw) = optional_env("AUTH_REFRESH_TOKEN_TTL_SECS") {
            config.refresh_token_lifetime = parse_seconds("AUTH_REFRESH_TOKEN_TTL_SECS", &raw)?;
        }

        Ok(config)
    }

    /// 设置密钥策略
    pub fn with_secret_policy(mut self, policy: SecretPolicy) -> Self {
        self.secret_policy = policy;
        self
    }

    /// 设置密码最小长度
    pub fn with_min_password_length(mut self, length: usize) -> Self {
        self.min_password_length = length;
        self
    }

    /// 设置 Access Token 有效期
    pub fn with_access_token_lifetime(mut self, duration: Duration) -> Self {
        self.access_token_lifetime = duration;
        self
    }

    /// 设置 Refresh Token 有效期
    pub fn with_refresh_token_lifetime(mut self, duration: Duration) -> Self {
        self.refresh_token_lifetime = duration;
        self
    }

    /// 启动时检查配置
    pub fn validate(&self) -> Result<()> {
        self.secret_policy
            .check("access_token_secret", &self.access_token_secret)?;
        self.secret_policy
            .check("refresh_token_secret", &self.refresh_token_secret)?;

        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("issuer".into()).into());
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::MissingRequired("audience".into()).into());
        }
        if self.min_password_length == 0 {
            return Err(invalid("min_password_length", "must be at least 1"));
        }
        check_lifetime("access_token_lifetime", self.access_token_lifetime)?;
        check_lifetime("refresh_token_lifetime", self.refresh_token_lifetime)?;

        Ok(())
    }
}

fn check_lifetime(key: &str, lifetime: Duration) -> Result<()> {
    if lifetime <= Duration::zero() {
        return Err(invalid(key, "must be positive"));
    }
    if lifetime.num_days() >= MAX_TOKEN_LIFETIME_DAYS {
        return Err(invalid(
            key,
            &format!("must be shorter than {} days", MAX_TOKEN_LIFETIME_DAYS),
        ));
    }
    Ok(())
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_secret", &"<redacted>")
            .field("refresh_token_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("secret_policy", &self.secret_policy)
            .field("min_password_length", &self.min_password_length)
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("refresh_token_lifetime", &self.refresh_token_lifetime)
            .finish()
    }
}

fn invalid(key: &str, message: &str) -> crate::Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn required_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| ConfigError::MissingRequired(key.to_string()).into())
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_length(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| invalid(key, &e.to_string()))
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration> {
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| invalid(key, &e.to_string()))?;
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| invalid(key, "duration out of range"))
}
