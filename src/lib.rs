//! # commerce-auth
//!
//! 电商后端的认证与 Session 子系统。
//!
//! ## 功能特性
//!
//! - **密码哈希**: 使用 Argon2id（默认）或 bcrypt 进行加盐慢哈希
//! - **Access Token**: HMAC 签名的 JWT，签发与验证
//! - **Refresh Token**: `{userID}:{nonce}:{signature}` 格式的不透明 Token
//! - **Session 存储**: 基于键值存储的 Session 记录与反向索引，支持撤销与轮换
//! - **Cookie 传输**: Token Cookie 的生成与解析
//!
//! 随机源、时钟和键值存储都通过 trait 注入，配置在构造时显式传入。
//!
//! ## Features
//!
//! - `argon2` - 启用 Argon2id 密码哈希支持（默认启用）
//! - `bcrypt` - 启用 bcrypt 密码哈希支持
//! - `redis` - 启用 Redis 键值存储后端
//! - `full` - 启用所有功能
//!
//! ## 登录流程示例
//!
//! ```rust
//! use std::sync::Arc;
//! use commerce_auth::{
//!     AuthConfig, Authenticator, CookieHeader, InMemoryKeyValueStore, OsRandomSource,
//!     RequestContext, SessionStore, SystemClock, UserId,
//! };
//!
//! # tokio_test_block(async {
//! let secret = "thisisaverylongsecretkeythatexceedslimit";
//! let config = AuthConfig::new(secret, secret, "commerce-api", "commerce-web");
//! let auth = Authenticator::new(
//!     config,
//!     SessionStore::new(Arc::new(InMemoryKeyValueStore::new())),
//!     Arc::new(OsRandomSource),
//!     Arc::new(SystemClock),
//! )
//! .unwrap();
//!
//! let ctx = RequestContext::background();
//! let user_id = UserId::new();
//!
//! // 注册
//! let hash = auth.sign_up("longenoughpassword").unwrap();
//!
//! // 登录
//! let pair = auth
//!     .sign_in(&ctx, &user_id, "longenoughpassword", &hash, "local")
//!     .await
//!     .unwrap();
//! let claims = auth.authenticate(&pair.access_token).unwrap();
//! assert_eq!(claims.sub, user_id.to_string());
//!
//! // 刷新
//! let jar = CookieHeader::parse(&format!("refresh_token={}", pair.refresh_token));
//! let rotated = auth.refresh(&ctx, &jar).await.unwrap();
//! assert_ne!(rotated.refresh_token, pair.refresh_token);
//!
//! // 登出
//! auth.sign_out(&ctx, &user_id).await.unwrap();
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod password;
pub mod random;
pub mod security;
pub mod service;
pub mod session;
pub mod token;
pub mod types;

pub use error::{Error, Result};

// ============================================================================
// 基础设施导出
// ============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, MIN_SECRET_LENGTH, SecretPolicy};
pub use context::RequestContext;
pub use random::{
    OsRandomSource, RandomSource, SeededRandomSource, constant_time_compare,
    constant_time_compare_str,
};
pub use types::{Provider, UserId};

// ============================================================================
// 密码相关导出
// ============================================================================

#[cfg(feature = "argon2")]
pub use password::Argon2Params;
pub use password::{Algorithm, CredentialHasher};

// ============================================================================
// Token 相关导出
// ============================================================================

pub use token::{AccessTokenCodec, Claims, JwtAlgorithm, RefreshTokenCodec};

// ============================================================================
// Session 相关导出
// ============================================================================

#[cfg(feature = "redis")]
pub use session::RedisKeyValueStore;
pub use session::{
    CookieSessionResolver, InMemoryKeyValueStore, KeyValueStore, SessionRecord, SessionStore,
    SessionStoreConfig,
};

// ============================================================================
// 传输与服务导出
// ============================================================================

pub use security::cookie::{CookieHeader, SecureCookie, TokenCookies, TokenSource};
pub use service::{Authenticator, TokenPair};
