//! Session 存储
//!
//! 每个用户最多一个活跃 Session，在键值存储中对应两条记录：
//!
//! | 键 | 值 |
//! |---|---|
//! | `refresh_token:{userID}` | JSON `{"token": ..., "provider": ...}` |
//! | `refresh_token_lookup:{token}` | `{userID}` |
//!
//! 两条记录通过 [`KeyValueStore::set_many`] 以相同 TTL 写入。覆盖写入时删除旧
//! Token 的反向索引，删除 Session 时两条记录一并删除。
//!
//! 反向索引出现之前写入的旧记录没有 lookup 键，
//! [`SessionStore::get_user_id_by_token`] 在 `legacy_scan_fallback` 开启时会退化为
//! 全量扫描。运维可以先执行一次 [`SessionStore::migrate_reverse_index`] 补齐索引，
//! 然后关闭该开关。

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::error::{Error, Result, SessionError, ValidationError};
use crate::random::constant_time_compare_str;
use crate::session::kv::KeyValueStore;
use crate::types::{Provider, UserId};

/// 主记录键前缀
pub const SESSION_KEY_PREFIX: &str = "refresh_token:";

/// 反向索引键前缀
pub const LOOKUP_KEY_PREFIX: &str = "refresh_token_lookup:";

/// 存储的 Session 记录
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// 最近一次签发的 Refresh Token
    pub token: String,
    /// 登录提供方
    pub provider: Provider,
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("token", &"<redacted>")
            .field("provider", &self.provider)
            .finish()
    }
}

/// Session 存储配置
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// 主记录键前缀
    pub session_prefix: String,

    /// 反向索引键前缀
    pub lookup_prefix: String,

    /// 反向索引缺失时是否退化为全量扫描
    pub legacy_scan_fallback: bool,

    /// 迁移时后端无法报告剩余 TTL 所使用的默认 TTL
    pub default_migration_ttl: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            session_prefix: SESSION_KEY_PREFIX.to_string(),
            lookup_prefix: LOOKUP_KEY_PREFIX.to_string(),
            legacy_scan_fallback: true,
            default_migration_ttl: Duration::days(7),
        }
    }
}

impl SessionStoreConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置是否启用全量扫描回退
    pub fn with_legacy_scan_fallback(mut self, enabled: bool) -> Self {
        self.legacy_scan_fallback = enabled;
        self
    }

    /// 设置迁移默认 TTL
    pub fn with_default_migration_ttl(mut self, ttl: Duration) -> Self {
        self.default_migration_ttl = ttl;
        self
    }

    /// 设置键前缀
    pub fn with_prefixes(
        mut self,
        session_prefix: impl Into<String>,
        lookup_prefix: impl Into<String>,
    ) -> Self {
        self.session_prefix = session_prefix.into();
        self.lookup_prefix = lookup_prefix.into();
        self
    }
}

/// Session 存储
///
/// 不持有客户端锁，并发一致性依赖后端对单个键（以及 `set_many`）的原子性。
#[derive(Debug, Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    config: SessionStoreConfig,
}

impl SessionStore {
    /// 使用默认配置创建
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(kv, SessionStoreConfig::default())
    }

    /// 使用指定配置创建
    pub fn with_config(kv: Arc<dyn KeyValueStore>, config: SessionStoreConfig) -> Self {
        Self { kv, config }
    }

    /// 当前配置
    pub fn config(&self) -> &SessionStoreConfig {
        &self.config
    }

    fn session_key(&self, user_id: &UserId) -> String {
        format!("{}{}", self.config.session_prefix, user_id)
    }

    fn lookup_key(&self, token: &str) -> String {
        format!("{}{}", self.config.lookup_prefix, token)
    }

    /// 保存用户的 Session
    ///
    /// 不支持的 `provider` 返回 [`ConfigError::UnsupportedProvider`](crate::error::ConfigError::UnsupportedProvider)；
    /// `ttl` 不是正数或 `token` 为空返回 [`ValidationError`]。
    pub async fn put(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
        token: &str,
        provider: &str,
        ttl: Duration,
    ) -> Result<()> {
        let provider: Provider = provider.parse()?;
        if ttl <= Duration::zero() {
            return Err(Error::Validation(ValidationError::NonPositiveTtl(
                ttl.num_seconds(),
            )));
        }
        if token.is_empty() {
            return Err(Error::Validation(ValidationError::EmptyField(
                "token".to_string(),
            )));
        }
        let ttl = ttl
            .to_std()
            .map_err(|e| Error::validation(format!("ttl out of range: {}", e)))?;

        let record = SessionRecord {
            token: token.to_string(),
            provider,
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| Error::Session(SessionError::Decode(e.to_string())))?;

        ctx.run("session.put", async {
            let session_key = self.session_key(user_id);
            let previous = match self.read_record(&session_key).await {
                Ok(previous) => previous,
                // 损坏的旧记录直接覆盖
                Err(Error::Session(SessionError::Decode(_))) => None,
                Err(e) => return Err(e),
            };

            let entries = vec![
                (session_key, payload),
                (self.lookup_key(token), user_id.to_string()),
            ];
            self.kv.set_many(&entries, ttl).await?;

            if let Some(previous) = previous
                && previous.token != token
            {
                self.kv.delete(&self.lookup_key(&previous.token)).await?;
            }

            debug!(user_id = %user_id, provider = %provider, "session stored");
            Ok(())
        })
        .await
    }

    /// 读取用户的 Session 记录
    pub async fn get(&self, ctx: &RequestContext, user_id: &UserId) -> Result<SessionRecord> {
        ctx.run("session.get", async {
            self.read_record(&self.session_key(user_id))
                .await?
                .ok_or_else(|| Error::Session(SessionError::NotFound(user_id.to_string())))
        })
        .await
    }

    /// 通过 Refresh Token 查找用户 ID
    pub async fn get_user_id_by_token(
        &self,
        ctx: &RequestContext,
        token: &str,
    ) -> Result<UserId> {
        ctx.run("session.lookup", async {
            if let Some(raw) = self.kv.get(&self.lookup_key(token)).await? {
                return UserId::parse(&raw).map_err(|_| {
                    Error::Session(SessionError::Decode(format!(
                        "invalid user id in reverse index: {}",
                        raw
                    )))
                });
            }

            if self.config.legacy_scan_fallback {
                return self.scan_for_token(token).await;
            }

            Err(Error::Session(SessionError::NotFound(
                "refresh token".to_string(),
            )))
        })
        .await
    }

    /// 删除用户的 Session，同时删除反向索引。重复删除不是错误。
    pub async fn delete(&self, ctx: &RequestContext, user_id: &UserId) -> Result<()> {
        ctx.run("session.delete", async {
            let session_key = self.session_key(user_id);
            let mut keys = Vec::with_capacity(2);
            match self.read_record(&session_key).await {
                Ok(Some(record)) => keys.push(self.lookup_key(&record.token)),
                Ok(None) => {}
                // 记录损坏时仍然删除主记录
                Err(Error::Session(SessionError::Decode(_))) => {}
                Err(e) => return Err(e),
            }
            keys.push(session_key);

            self.kv.delete_many(&keys).await?;
            debug!(user_id = %user_id, "session deleted");
            Ok(())
        })
        .await
    }

    /// 用户是否有 Session
    pub async fn exists(&self, ctx: &RequestContext, user_id: &UserId) -> Result<bool> {
        let key = self.session_key(user_id);
        ctx.run("session.exists", self.kv.exists(&key)).await
    }

    /// 为缺少反向索引的旧记录补齐 lookup 键
    ///
    /// 新索引的 TTL 取主记录的剩余 TTL；后端无法报告时使用
    /// `default_migration_ttl`。无法解码的记录被跳过。返回新建的索引数。
    pub async fn migrate_reverse_index(&self, ctx: &RequestContext) -> Result<usize> {
        ctx.run("session.migrate", async {
            let default_ttl = self
                .config
                .default_migration_ttl
                .to_std()
                .map_err(|e| Error::validation(format!("ttl out of range: {}", e)))?;

            let keys = self.kv.keys(&self.config.session_prefix).await?;
            let mut created = 0;

            for key in keys {
                let Some(raw_user_id) = key.strip_prefix(self.config.session_prefix.as_str())
                else {
                    continue;
                };
                let Ok(user_id) = UserId::parse(raw_user_id) else {
                    warn!(key = %key, "skipping session key with invalid user id");
                    continue;
                };
                let record = match self.read_record(&key).await {
                    Ok(Some(record)) => record,
                    // 扫描期间过期
                    Ok(None) => continue,
                    Err(Error::Session(SessionError::Decode(reason))) => {
                        warn!(user_id = %user_id, reason = %reason, "skipping undecodable session");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let lookup_key = self.lookup_key(&record.token);
                if self.kv.exists(&lookup_key).await? {
                    continue;
                }

                let ttl = match self.kv.ttl(&key).await? {
                    Some(ttl) if !ttl.is_zero() => ttl,
                    _ => default_ttl,
                };
                self.kv.set(&lookup_key, &user_id.to_string(), ttl).await?;
                created += 1;
            }

            debug!(created, "reverse index migration finished");
            Ok(created)
        })
        .await
    }

    async fn read_record(&self, session_key: &str) -> Result<Option<SessionRecord>> {
        match self.kv.get(session_key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::Session(SessionError::Decode(e.to_string()))),
            None => Ok(None),
        }
    }

    /// 已废弃的 O(n) 回退：逐个解码主记录并比较 Token
    async fn scan_for_token(&self, token: &str) -> Result<UserId> {
        let keys = self.kv.keys(&self.config.session_prefix).await?;
        warn!(
            keys = keys.len(),
            "reverse index miss, falling back to full session scan"
        );

        for key in keys {
            let record = match self.read_record(&key).await {
                Ok(Some(record)) => record,
                Ok(None) | Err(Error::Session(SessionError::Decode(_))) => continue,
                Err(e) => return Err(e),
            };
            if !constant_time_compare_str(&record.token, token) {
                continue;
            }
            if let Some(raw) = key.strip_prefix(self.config.session_prefix.as_str())
                && let Ok(user_id) = UserId::parse(raw)
            {
                return Ok(user_id);
            }
        }

        Err(Error::Session(SessionError::NotFound(
            "refresh token".to_string(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use crate::clock::ManualClock;
    use crate::error::{ConfigError, StorageError};
    use crate::session::kv::InMemoryKeyValueStore;

    fn setup() -> (SessionStore, Arc<InMemoryKeyValueStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let kv = Arc::new(InMemoryKeyValueStore::with_clock(clock.clone()));
        (SessionStore::new(kv.clone()), kv, clock)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (store, kv, _) = setup();
        let ctx = RequestContext::background();
        let user_id = UserId::new();

        store
            .put(&ctx, &user_id, "token-a", "google", Duration::hours(1))
            .await
            .unwrap();

        let record = store.get(&ctx, &user_id).await.unwrap();
        assert_eq!(record.token, "token-a");
        assert_eq!(record.provider, Provider::Google);
        assert_eq!(
            store.get_user_id_by_token(&ctx, "token-a").await.unwrap(),
            user_id
        );

        let raw = kv
            .get(&format!("refresh_token:{}", user_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw, r#"{"token":"token-a","provider":"google"}"#);
    }

    #[tokio::test]
    async fn test_put_validation() {
        let (store, kv, _) = setup();
        let ctx = RequestContext::background();
        let user_id = UserId::new();

        assert!(matches!(
            store.put(&ctx, &user_id, "t", "myspace", Duration::hours(1)).await,
            Err(Error::Config(ConfigError::UnsupportedProvider(_)))
        ));
        assert!(matches!(
            store.put(&ctx, &user_id, "t", "local", Duration::seconds(-5)).await,
            Err(Error::Validation(ValidationError::NonPositiveTtl(-5)))
        ));
        assert!(matches!(
            store.put(&ctx, &user_id, "t", "local", Duration::zero()).await,
            Err(Error::Validation(ValidationError::NonPositiveTtl(0)))
        ));
        assert!(matches!(
            store.put(&ctx, &user_id, "", "local", Duration::hours(1)).await,
            Err(Error::Validation(ValidationError::EmptyField(_)))
        ));
        assert!(kv.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_removes_stale_lookup() {
        let (store, kv, _) = setup();
        let ctx = RequestContext::background();
        let user_id = UserId::new();

        store
            .put(&ctx, &user_id, "old", "local", Duration::hours(1))
            .await
            .unwrap();
        store
            .put(&ctx, &user_id, "new", "local", Duration::hours(1))
            .await
            .unwrap();

        assert!(!kv.exists("refresh_token_lookup:old").await.unwrap());
        assert_eq!(kv.len().unwrap(), 2);
        assert_eq!(store.get(&ctx, &user_id).await.unwrap().token, "new");
    }

    #[tokio::test]
    async fn test_delete_removes_both_keys() {
        let (store, kv, _) = setup();
        let ctx = RequestContext::background();
        let user_id = UserId::new();

        store
            .put(&ctx, &user_id, "tok", "github", Duration::hours(1))
            .await
            .unwrap();
        store.delete(&ctx, &user_id).await.unwrap();

        assert!(kv.is_empty().unwrap());
        assert!(!store.exists(&ctx, &user_id).await.unwrap());
        assert!(matches!(
            store.get(&ctx, &user_id).await,
            Err(Error::Session(SessionError::NotFound(_)))
        ));

        // 幂等
        store.delete(&ctx, &user_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let (store, _, clock) = setup();
        let ctx = RequestContext::background();
        let user_id = UserId::new();

        store
            .put(&ctx, &user_id, "tok", "local", Duration::minutes(10))
            .await
            .unwrap();
        clock.advance(Duration::minutes(10));

        assert!(matches!(
            store.get(&ctx, &user_id).await,
            Err(Error::Session(SessionError::NotFound(_)))
        ));
        let store = SessionStore::with_config(
            store.kv.clone(),
            SessionStoreConfig::default().with_legacy_scan_fallback(false),
        );
        assert!(matches!(
            store.get_user_id_by_token(&ctx, "tok").await,
            Err(Error::Session(SessionError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_decode_error() {
        let (store, kv, _) = setup();
        let ctx = RequestContext::background();
        let user_id = UserId::new();

        kv.set(
            &format!("refresh_token:{}", user_id),
            "not json",
            StdDuration::from_secs(60),
        )
        .await
        .unwrap();

        assert!(matches!(
            store.get(&ctx, &user_id).await,
            Err(Error::Session(SessionError::Decode(_)))
        ));
        // 损坏的记录仍然可以删除
        store.delete(&ctx, &user_id).await.unwrap();
        assert!(kv.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_legacy_scan_fallback() {
        let (store, kv, _) = setup();
        let ctx = RequestContext::background();
        let user_id = UserId::new();

        // 模拟反向索引出现之前写入的记录
        kv.set(
            &format!("refresh_token:{}", user_id),
            r#"{"token":"legacy","provider":"facebook"}"#,
            StdDuration::from_secs(600),
        )
        .await
        .unwrap();

        assert_eq!(
            store.get_user_id_by_token(&ctx, "legacy").await.unwrap(),
            user_id
        );

        let strict = SessionStore::with_config(
            kv.clone(),
            SessionStoreConfig::default().with_legacy_scan_fallback(false),
        );
        assert!(matches!(
            strict.get_user_id_by_token(&ctx, "legacy").await,
            Err(Error::Session(SessionError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_migrate_reverse_index() {
        let (store, kv, _) = setup();
        let ctx = RequestContext::background();
        let legacy_user = UserId::new();
        let current_user = UserId::new();

        kv.set(
            &format!("refresh_token:{}", legacy_user),
            r#"{"token":"legacy","provider":"local"}"#,
            StdDuration::from_secs(600),
        )
        .await
        .unwrap();
        kv.set(
            &format!("refresh_token:{}", UserId::new()),
            "garbage",
            StdDuration::from_secs(600),
        )
        .await
        .unwrap();
        store
            .put(&ctx, &current_user, "current", "local", Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(store.migrate_reverse_index(&ctx).await.unwrap(), 1);
        assert_eq!(
            kv.ttl("refresh_token_lookup:legacy").await.unwrap(),
            Some(StdDuration::from_secs(600))
        );

        let strict = SessionStore::with_config(
            kv.clone(),
            SessionStoreConfig::default().with_legacy_scan_fallback(false),
        );
        assert_eq!(
            strict.get_user_id_by_token(&ctx, "legacy").await.unwrap(),
            legacy_user
        );

        // 再次执行不会重复创建
        assert_eq!(store.migrate_reverse_index(&ctx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let (store, _, _) = setup();
        let ctx = RequestContext::background();
        ctx.cancel();

        assert!(matches!(
            store.get(&ctx, &UserId::new()).await,
            Err(Error::Storage(StorageError::Cancelled(_)))
        ));
    }
}
