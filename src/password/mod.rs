//! 密码哈希模块
//!
//! 提供安全的密码哈希和验证功能，支持多种哈希算法。
//!
//! ## 支持的算法
//!
//! - **Argon2id** (推荐): 内存硬哈希算法，抵抗 GPU/ASIC 攻击（需启用 `argon2` feature）
//! - **bcrypt**: 经典的密码哈希算法，广泛使用（需启用 `bcrypt` feature）
//!
//! ## 示例
//!
//! ```rust
//! use commerce_auth::password::CredentialHasher;
//! use commerce_auth::error::{Error, PasswordHashError};
//!
//! let hasher = CredentialHasher::default();
//!
//! // 低于最小长度的密码直接拒绝
//! assert!(hasher.hash("short").is_err());
//!
//! let hash = hasher.hash("longenoughpassword").unwrap();
//! assert!(hasher.verify("longenoughpassword", &hash).is_ok());
//! assert!(matches!(
//!     hasher.verify("wrongpassword", &hash),
//!     Err(Error::PasswordHash(PasswordHashError::Mismatch))
//! ));
//! ```
//!
//! ### 使用指定算法
//!
#![cfg_attr(feature = "bcrypt", doc = "```rust")]
#![cfg_attr(not(feature = "bcrypt"), doc = "```rust,ignore")]
//! use commerce_auth::password::{Algorithm, CredentialHasher};
//!
//! let hasher = CredentialHasher::default()
//!     .with_algorithm(Algorithm::Bcrypt)
//!     .with_bcrypt_cost(4);
//! let hash = hasher.hash("my_password").unwrap();
//! assert!(hasher.verify("my_password", &hash).is_ok());
//! ```

mod hasher;

#[cfg(feature = "argon2")]
pub use hasher::Argon2Params;
pub use hasher::{Algorithm, CredentialHasher};
