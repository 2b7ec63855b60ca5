//! 传输层安全模块
//!
//! ## 子模块
//!
//! - **cookie**: Token Cookie 的生成与 `Cookie` 请求头解析

pub mod cookie;

pub use cookie::{
    ACCESS_TOKEN_COOKIE, CookieHeader, REFRESH_TOKEN_COOKIE, SameSite, SecureCookie, TokenCookies,
    TokenSource,
};
