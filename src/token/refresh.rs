//! Refresh Token 实现模块
//!
//! Refresh Token 是不透明的 HMAC 签名字符串：
//!
//! ```text
//! {userID}:{nonce}:{hex(HMAC-SHA256(secret, "{userID}:{nonce}"))}
//! ```
//!
//! Token 本身是无状态的，撤销和轮换依赖 [`SessionStore`](crate::session::SessionStore)。
//! 验证只检查结构与签名，不访问存储。
//!
//! ## 示例
//!
//! ```rust
//! use std::sync::Arc;
//! use commerce_auth::config::SecretPolicy;
//! use commerce_auth::random::OsRandomSource;
//! use commerce_auth::token::RefreshTokenCodec;
//! use commerce_auth::types::UserId;
//!
//! let codec = RefreshTokenCodec::new(
//!     "thisisaverylongsecretkeythatexceedslimit",
//!     SecretPolicy::default(),
//!     Arc::new(OsRandomSource),
//! );
//!
//! let user_id = UserId::new();
//! let token = codec.issue(&user_id).unwrap();
//! assert_eq!(codec.validate(&token).unwrap(), user_id);
//! ```

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::config::SecretPolicy;
use crate::error::{CryptoError, Error, Result, TokenError};
use crate::random::{RandomSource, constant_time_compare, generate_nonce};
use crate::types::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Token 段分隔符
const SEPARATOR: char = ':';

/// Refresh Token 编解码器
#[derive(Clone)]
pub struct RefreshTokenCodec {
    secret: String,
    policy: SecretPolicy,
    random: Arc<dyn RandomSource>,
}

impl fmt::Debug for RefreshTokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshTokenCodec")
            .field("secret", &"<redacted>")
            .field("policy", &self.policy)
            .field("random", &self.random)
            .finish()
    }
}

impl RefreshTokenCodec {
    /// 创建编解码器
    ///
    /// 密钥策略在每次签发和验证时检查，而不是在构造时。
    pub fn new(
        secret: impl Into<String>,
        policy: SecretPolicy,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            secret: secret.into(),
            policy,
            random,
        }
    }

    /// 签发新的 Refresh Token
    pub fn issue(&self, user_id: &UserId) -> Result<String> {
        self.policy.check("refresh_token_secret", &self.secret)?;

        let uid = user_id.to_string();
        let nonce = generate_nonce(self.random.as_ref())?;
        let signature = hex::encode(self.sign(&uid, &nonce)?);

        debug!(user_id = %uid, "refresh token issued");
        Ok(format!("{uid}{SEPARATOR}{nonce}{SEPARATOR}{signature}"))
    }

    /// 验证 Refresh Token 并返回其中的用户 ID
    ///
    /// 结构不合法返回 [`TokenError::InvalidFormat`]，签名不匹配返回
    /// [`TokenError::InvalidSignature`]。签名比较是常量时间的。
    pub fn validate(&self, token: &str) -> Result<UserId> {
        self.policy.check("refresh_token_secret", &self.secret)?;

        let parts: Vec<&str> = token.split(SEPARATOR).collect();
        let [uid, nonce, signature] = parts.as_slice() else {
            return Err(invalid_format(format!(
                "expected 3 segments, got {}",
                parts.len()
            )));
        };
        if nonce.is_empty() || signature.is_empty() {
            return Err(invalid_format("empty segment".to_string()));
        }
        let user_id = UserId::parse(uid)?;
        // 只接受签发时的小写连字符形式
        if user_id.to_string() != *uid {
            return Err(invalid_format("non-canonical user id".to_string()));
        }

        let expected = self.sign(uid, nonce)?;
        // 非十六进制的签名按不匹配处理，与长度不符的签名一样走常量时间比较
        let presented = hex::decode(signature).unwrap_or_default();
        if !constant_time_compare(&expected, &presented) {
            warn!(target: "security", user_id = %user_id, "refresh token signature mismatch");
            return Err(Error::Token(TokenError::InvalidSignature));
        }

        Ok(user_id)
    }

    fn sign(&self, uid: &str, nonce: &str) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Crypto(CryptoError::InvalidKey(e.to_string())))?;
        mac.update(uid.as_bytes());
        mac.update(&[SEPARATOR as u8]);
        mac.update(nonce.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn invalid_format(reason: String) -> Error {
    Error::Token(TokenError::InvalidFormat(reason))
}
