//! Cookie Session 解析
//!
//! 从请求携带的 `refresh_token` Cookie 解析出当前用户及其 Session 记录。
//!
//! Refresh Token 的生命周期：
//!
//! ```text
//! Issued -> Active -> Rotated -> Revoked
//! ```
//!
//! 轮换后的旧 Token 签名依然有效，但与存储的 Token 不一致，解析时返回
//! [`SessionError::Mismatch`]；被删除或过期的 Session 返回
//! [`SessionError::NotFound`]。

use std::sync::Arc;

use tracing::warn;

use crate::context::RequestContext;
use crate::error::{Error, Result, SessionError};
use crate::random::constant_time_compare_str;
use crate::security::cookie::{REFRESH_TOKEN_COOKIE, TokenSource};
use crate::session::store::{SessionRecord, SessionStore};
use crate::token::RefreshTokenCodec;
use crate::types::UserId;

/// Cookie Session 解析器
#[derive(Debug, Clone)]
pub struct CookieSessionResolver {
    codec: Arc<RefreshTokenCodec>,
    store: Arc<SessionStore>,
}

impl CookieSessionResolver {
    /// 创建解析器
    pub fn new(codec: Arc<RefreshTokenCodec>, store: Arc<SessionStore>) -> Self {
        Self { codec, store }
    }

    /// 解析当前请求的 Session
    ///
    /// 依次执行：读取 Cookie、验证 Token 格式与签名、读取 Session 记录、
    /// 比较存储的 Token 与出示的 Token。存储读取失败原样返回。
    pub async fn resolve<S>(&self, ctx: &RequestContext, source: &S) -> Result<(UserId, SessionRecord)>
    where
        S: TokenSource + ?Sized,
    {
        let token = source.refresh_token().ok_or_else(|| {
            Error::Session(SessionError::NotFound(format!(
                "missing {} cookie",
                REFRESH_TOKEN_COOKIE
            )))
        })?;

        let user_id = self.codec.validate(token)?;
        let record = self.store.get(ctx, &user_id).await?;

        if !constant_time_compare_str(&record.token, token) {
            warn!(target: "security", user_id = %user_id, "presented refresh token does not match stored session");
            return Err(Error::Session(SessionError::Mismatch));
        }

        Ok((user_id, record))
    }
}
