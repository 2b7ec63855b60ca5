//! 统一错误类型模块
//!
//! 提供 commerce-auth 中所有操作的错误类型定义。
//!
//! 本模块只负责把失败以类型化的值返回给调用方，HTTP 状态码与面向用户的
//! 提示文案由上层 handler 决定。

use thiserror::Error;

/// commerce-auth 的统一结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// commerce-auth 的错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 密码哈希错误
    #[error("Password hash error: {0}")]
    PasswordHash(#[from] PasswordHashError),

    /// Token 相关错误
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// 验证错误
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Session 状态错误
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// 存储后端错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 加密错误
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl Error {
    /// 创建一个自定义验证错误
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(ValidationError::Custom(msg.into()))
    }

    /// 创建一个存储操作失败错误
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(StorageError::OperationFailed(msg.into()))
    }

    /// 是否为可重试的瞬时错误
    ///
    /// 只有存储后端的 I/O 失败属于瞬时错误，重试策略由调用方决定。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage(
                StorageError::ConnectionFailed(_)
                    | StorageError::OperationFailed(_)
                    | StorageError::DeadlineExceeded
            )
        )
    }

    /// 是否属于需要安全监控的事件（篡改、伪造、重放）
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Error::Token(TokenError::InvalidSignature) | Error::Session(SessionError::Mismatch)
        )
    }
}

/// 密码哈希相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordHashError {
    /// 哈希生成失败
    #[error("hash generation failed: {0}")]
    HashFailed(String),
    /// 密码与哈希不匹配
    #[error("password does not match")]
    Mismatch,
    /// 存储的哈希格式无效（通常意味着数据损坏）
    #[error("invalid hash format: {0}")]
    InvalidFormat(String),
}

/// Token 相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token 已过期
    #[error("token has expired")]
    Expired,
    /// Token 尚未生效
    #[error("token is not yet valid")]
    NotYetValid,
    /// Token 结构不符合 `{userID}:{nonce}:{signature}` 格式
    #[error("invalid token format: {0}")]
    InvalidFormat(String),
    /// Token 无法解析或签名无法通过验证
    #[error("malformed token: {0}")]
    Malformed(String),
    /// Token 签名不匹配
    #[error("invalid token signature")]
    InvalidSignature,
    /// 签发者不匹配
    #[error("invalid issuer")]
    InvalidIssuer,
    /// 接收者不匹配
    #[error("invalid audience")]
    InvalidAudience,
    /// Token 编码失败
    #[error("token encoding failed: {0}")]
    EncodingFailed(String),
}

/// 验证相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 密码太短
    #[error("password too short: minimum {min_length} characters, got {actual}")]
    PasswordTooShort { min_length: usize, actual: usize },
    /// 字段为空
    #[error("field '{0}' cannot be empty")]
    EmptyField(String),
    /// TTL 不是正数
    #[error("ttl must be positive, got {0} seconds")]
    NonPositiveTtl(i64),
    /// 自定义验证错误
    #[error("{0}")]
    Custom(String),
}

/// 配置相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 缺少必需的配置
    #[error("missing required configuration: {0}")]
    MissingRequired(String),
    /// 密钥长度不足
    #[error("secret '{key}' is too short: minimum {min_length} characters, got {actual}")]
    SecretTooShort {
        key: String,
        min_length: usize,
        actual: usize,
    },
    /// 不支持的登录提供方
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    /// 无效的配置值
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Session 状态相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Session 不存在（已撤销或已过期）
    #[error("session not found: {0}")]
    NotFound(String),
    /// 出示的 Token 与存储的 Token 不一致（已轮换或被重放）
    #[error("session token mismatch")]
    Mismatch,
    /// 存储的 Session 记录无法解码
    #[error("failed to decode session record: {0}")]
    Decode(String),
}

/// 存储后端相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// 连接失败
    #[error("storage connection failed: {0}")]
    ConnectionFailed(String),
    /// 操作失败
    #[error("storage operation failed: {0}")]
    OperationFailed(String),
    /// 请求上下文已取消
    #[error("operation cancelled: {0}")]
    Cancelled(String),
    /// 超过请求截止时间
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// 加密相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// 随机数生成失败
    #[error("random number generation failed: {0}")]
    RngFailed(String),
    /// 密钥无效
    #[error("invalid key: {0}")]
    InvalidKey(String),
}
