//! 认证服务
//!
//! [`Authenticator`] 把各个组件串成完整的登录流程：
//!
//! - 注册：哈希密码
//! - 登录：验证密码，签发 Token 对，保存 Session
//! - 刷新：从 Cookie 解析 Session，轮换 Token 对
//! - 鉴权：验证 Bearer Access Token
//! - 登出：删除 Session
//!
//! 用户数据的持久化不在本模块范围内，调用方负责提供用户 ID 和存储的密码哈希。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::context::RequestContext;
use crate::error::{ConfigError, Error, Result, SessionError};
use crate::password::CredentialHasher;
use crate::random::RandomSource;
use crate::security::cookie::{TokenCookies, TokenSource};
use crate::session::{CookieSessionResolver, SessionStore};
use crate::token::{AccessTokenCodec, Claims, RefreshTokenCodec};
use crate::types::UserId;

/// Access Token 和 Refresh Token 对
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access Token（短期有效）
    pub access_token: String,
    /// Refresh Token（长期有效）
    pub refresh_token: String,
    /// Access Token 过期时间
    pub access_expires_at: DateTime<Utc>,
    /// Refresh Token 过期时间
    pub refresh_expires_at: DateTime<Utc>,
    /// Token 类型（"Bearer"）
    pub token_type: String,
}

impl TokenPair {
    /// 生成对应的 Cookie
    pub fn cookies(&self) -> TokenCookies {
        TokenCookies::new(
            self.access_token.clone(),
            self.access_expires_at,
            self.refresh_token.clone(),
            self.refresh_expires_at,
        )
    }
}

/// 认证服务
#[derive(Debug, Clone)]
pub struct Authenticator {
    config: AuthConfig,
    hasher: CredentialHasher,
    access: AccessTokenCodec,
    refresh: Arc<RefreshTokenCodec>,
    store: Arc<SessionStore>,
    resolver: CookieSessionResolver,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    /// 创建认证服务
    ///
    /// 构造时调用 [`AuthConfig::validate`]，配置错误直接返回。
    pub fn new(
        config: AuthConfig,
        store: SessionStore,
        random: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let hasher = CredentialHasher::new(config.min_password_length, random.clone());
        let access = AccessTokenCodec::new(config.issuer.clone(), config.audience.clone())
            .with_secret_policy(config.secret_policy)
            .with_clock(clock.clone());
        let refresh = Arc::new(RefreshTokenCodec::new(
            config.refresh_token_secret.clone(),
            config.secret_policy,
            random,
        ));
        let store = Arc::new(store);
        let resolver = CookieSessionResolver::new(refresh.clone(), store.clone());

        Ok(Self {
            config,
            hasher,
            access,
            refresh,
            store,
            resolver,
            clock,
        })
    }

    /// 替换密码哈希器（例如调整 Argon2 参数）
    pub fn with_hasher(mut self, hasher: CredentialHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// 密码哈希器
    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// Session 存储
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// 注册：返回待持久化的密码哈希
    pub fn sign_up(&self, password: &str) -> Result<String> {
        self.hasher.hash(password)
    }

    /// 登录：验证密码后签发 Token 对并保存 Session
    pub async fn sign_in(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
        password: &str,
        stored_hash: &str,
        provider: &str,
    ) -> Result<TokenPair> {
        self.hasher.verify(password, stored_hash)?;

        let pair = self.issue_session(ctx, user_id, provider).await?;
        info!(user_id = %user_id, provider = %provider, "user signed in");
        Ok(pair)
    }

    /// 为已经通过其他方式认证的用户（例如 OAuth 回调）签发 Token 对
    pub async fn issue_session(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
        provider: &str,
    ) -> Result<TokenPair> {
        let now = self.clock.now();
        let access_expires_at =
            expires_after(now, "access_token_lifetime", self.config.access_token_lifetime)?;
        let refresh_expires_at =
            expires_after(now, "refresh_token_lifetime", self.config.refresh_token_lifetime)?;

        let access_token = self.access.issue(
            &user_id.to_string(),
            &self.config.access_token_secret,
            access_expires_at,
        )?;
        let refresh_token = self.refresh.issue(user_id)?;

        self.store
            .put(
                ctx,
                user_id,
                &refresh_token,
                provider,
                self.config.refresh_token_lifetime,
            )
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
            token_type: "Bearer".to_string(),
        })
    }

    /// 刷新：解析 Cookie 中的 Refresh Token 并轮换
    ///
    /// 旧 Token 随即失效，再次使用会得到 [`SessionError::Mismatch`]。
    pub async fn refresh<S>(&self, ctx: &RequestContext, source: &S) -> Result<TokenPair>
    where
        S: TokenSource + ?Sized,
    {
        let (user_id, record) = self.resolver.resolve(ctx, source).await?;
        let pair = self
            .issue_session(ctx, &user_id, record.provider.as_str())
            .await?;
        debug!(user_id = %user_id, "session rotated");
        Ok(pair)
    }

    /// 鉴权：验证 Access Token，接受裸 Token 或 `Bearer <token>`
    pub fn authenticate(&self, bearer: &str) -> Result<Claims> {
        let token = bearer
            .strip_prefix("Bearer ")
            .unwrap_or(bearer)
            .trim();
        self.access
            .validate(token, &self.config.access_token_secret)
    }

    /// 从 Cookie 中读取 Access Token 并验证
    pub fn authenticate_cookies<S>(&self, source: &S) -> Result<Claims>
    where
        S: TokenSource + ?Sized,
    {
        let token = source.access_token().ok_or_else(|| {
            Error::Session(SessionError::NotFound("missing access_token cookie".into()))
        })?;
        self.authenticate(token)
    }

    /// 登出：删除 Session。已签发的 Access Token 在过期前仍然有效。
    pub async fn sign_out(&self, ctx: &RequestContext, user_id: &UserId) -> Result<()> {
        self.store.delete(ctx, user_id).await?;
        info!(user_id = %user_id, "user signed out");
        Ok(())
    }
}

fn expires_after(now: DateTime<Utc>, key: &str, lifetime: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(lifetime).ok_or_else(|| {
        Error::Config(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "expiry overflows the supported time range".to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::PasswordHashError;
    use crate::random::OsRandomSource;
    use crate::security::cookie::CookieHeader;
    use crate::session::InMemoryKeyValueStore;

    const SECRET: &str = "thisisaverylongsecretkeythatexceedslimit";

    fn authenticator() -> (Authenticator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let kv = Arc::new(InMemoryKeyValueStore::with_clock(clock.clone()));
        let config = AuthConfig::new(SECRET, SECRET.repeat(2), "commerce-api", "commerce-web");
        let auth = Authenticator::new(
            config,
            SessionStore::new(kv),
            Arc::new(OsRandomSource),
            clock.clone(),
        )
        .unwrap();
        (auth, clock)
    }

    #[test]
    fn test_new_validates_config() {
        let config = AuthConfig::new("shortsecret", SECRET, "iss", "aud");
        let result = Authenticator::new(
            config,
            SessionStore::new(Arc::new(InMemoryKeyValueStore::new())),
            Arc::new(OsRandomSource),
            Arc::new(ManualClock::starting_now()),
        );
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::SecretTooShort { .. }))
        ));
    }

    #[test]
    fn test_new_rejects_overflowing_lifetime() {
        let config = AuthConfig::new(SECRET, SECRET, "iss", "aud")
            .with_refresh_token_lifetime(Duration::seconds(1_000_000_000_000_000));
        let result = Authenticator::new(
            config,
            SessionStore::new(Arc::new(InMemoryKeyValueStore::new())),
            Arc::new(OsRandomSource),
            Arc::new(ManualClock::starting_now()),
        );
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_expiry_overflow_is_error() {
        let result = expires_after(
            DateTime::<Utc>::MAX_UTC,
            "refresh_token_lifetime",
            Duration::days(1),
        );
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidValue { .. }))
        ));

        let now = Utc::now();
        assert_eq!(
            expires_after(now, "access_token_lifetime", Duration::minutes(15)).unwrap(),
            now + Duration::minutes(15)
        );
    }

    #[tokio::test]
    async fn test_sign_in_flow() {
        let (auth, _) = authenticator();
        let ctx = RequestContext::background();
        let user_id = UserId::new();

        let hash = auth.sign_up("longenoughpassword").unwrap();
        let pair = auth
            .sign_in(&ctx, &user_id, "longenoughpassword", &hash, "local")
            .await
            .unwrap();

        assert_eq!(pair.token_type, "Bearer");
        let claims = auth
            .authenticate(&format!("Bearer {}", pair.access_token))
            .unwrap();
        assert_eq!(claims.sub, user_id.to_string());

        assert!(matches!(
            auth.sign_in(&ctx, &user_id, "wrongpassword", &hash, "local")
                .await,
            Err(Error::PasswordHash(PasswordHashError::Mismatch))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates() {
        let (auth, _) = authenticator();
        let ctx = RequestContext::background();
        let user_id = UserId::new();

        let first = auth.issue_session(&ctx, &user_id, "google").await.unwrap();
        let jar = CookieHeader::parse(&format!("refresh_token={}", first.refresh_token));

        let second = auth.refresh(&ctx, &jar).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_eq!(
            auth.store().get(&ctx, &user_id).await.unwrap().provider,
            crate::types::Provider::Google
        );

        assert!(matches!(
            auth.refresh(&ctx, &jar).await,
            Err(Error::Session(SessionError::Mismatch))
        ));
    }

    #[tokio::test]
    async fn test_sign_out() {
        let (auth, _) = authenticator();
        let ctx = RequestContext::background();
        let user_id = UserId::new();

        let pair = auth.issue_session(&ctx, &user_id, "local").await.unwrap();
        auth.sign_out(&ctx, &user_id).await.unwrap();

        let jar = CookieHeader::parse(&format!("refresh_token={}", pair.refresh_token));
        assert!(matches!(
            auth.refresh(&ctx, &jar).await,
            Err(Error::Session(SessionError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_access_token_cookie_expiry() {
        let (auth, clock) = authenticator();
        let ctx = RequestContext::background();
        let pair = auth
            .issue_session(&ctx, &UserId::new(), "local")
            .await
            .unwrap();

        let jar = CookieHeader::parse(&format!("access_token={}", pair.access_token));
        assert!(auth.authenticate_cookies(&jar).is_ok());

        clock.set(pair.access_expires_at);
        assert!(matches!(
            auth.authenticate_cookies(&jar),
            Err(Error::Token(crate::error::TokenError::Expired))
        ));
    }
}
