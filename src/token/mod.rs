//! Token 模块
//!
//! 提供两种 Token 的签发与验证。
//!
//! ## 子模块
//!
//! - **access**: 短期有效的 Access Token（JWT，HMAC 签名）
//! - **refresh**: 长期有效的不透明 Refresh Token（`{userID}:{nonce}:{signature}`）
//!
//! 两者都只持有不可变配置，可以通过 `Arc` 在请求之间共享。

pub mod access;
pub mod refresh;

pub use access::{AccessTokenCodec, Claims, JwtAlgorithm};
pub use refresh::RefreshTokenCodec;
