//! 键值存储后端
//!
//! [`KeyValueStore`] 是 Session 存储所依赖的窄接口，语义对应 Redis 的
//! GET / SET（带 TTL）/ DEL / EXISTS。TTL 过期由后端负责。
//!
//! - [`InMemoryKeyValueStore`]：进程内实现，用于开发和测试
//! - [`RedisKeyValueStore`]：Redis 实现（需启用 `redis` feature）

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result, StorageError, ValidationError};

/// 键值存储 trait
///
/// 实现此 trait 可以自定义 Session 的存储后端
#[async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// 读取键值，不存在或已过期返回 `None`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入键值并设置 TTL
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// 以相同 TTL 写入多个键值
    ///
    /// 默认实现逐个写入，不保证原子性；支持事务的后端应当覆盖此方法。
    async fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value, ttl).await?;
        }
        Ok(())
    }

    /// 删除键，键不存在不算错误
    async fn delete(&self, key: &str) -> Result<()>;

    /// 删除多个键
    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// 键是否存在
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 列出指定前缀下的所有键
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// 键的剩余 TTL
    ///
    /// 键不存在或没有过期时间时返回 `None`。
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// 内存键值存储
///
/// 用于开发和测试，生产环境建议使用 Redis 等持久化存储。
/// 过期判断使用注入的时钟，过期条目在读取时视为不存在、在写入时清理。
#[derive(Debug)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKeyValueStore {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// 使用指定时钟创建内存存储
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// 未过期条目数
    pub fn len(&self) -> Result<usize> {
        let now = self.clock.now();
        let entries = self.entries.read().map_err(|_| lock_poisoned())?;
        Ok(entries.values().filter(|e| e.expires_at > now).count())
    }

    /// 是否没有未过期条目
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// 清理过期条目，返回清理数量
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(|_| lock_poisoned())?;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok(before - entries.len())
    }

    fn expiry(&self, ttl: Duration) -> Result<DateTime<Utc>> {
        if ttl.is_zero() {
            return Err(Error::Validation(ValidationError::NonPositiveTtl(0)));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| Error::validation(format!("ttl out of range: {}", e)))?;
        Ok(self.clock.now() + ttl)
    }

    fn live(&self, key: &str) -> Result<Option<Entry>> {
        let now = self.clock.now();
        let entries = self.entries.read().map_err(|_| lock_poisoned())?;
        Ok(entries.get(key).filter(|e| e.expires_at > now).cloned())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live(key)?.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = self.expiry(ttl)?;
        let mut entries = self.entries.write().map_err(|_| lock_poisoned())?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_many(&self, items: &[(String, String)], ttl: Duration) -> Result<()> {
        let expires_at = self.expiry(ttl)?;
        // 同一把写锁下完成所有写入
        let mut entries = self.entries.write().map_err(|_| lock_poisoned())?;
        for (key, value) in items {
            entries.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| lock_poisoned())?;
        entries.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| lock_poisoned())?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live(key)?.is_some())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        let entries = self.entries.read().map_err(|_| lock_poisoned())?;
        Ok(entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = self.clock.now();
        Ok(self
            .live(key)?
            .and_then(|e| (e.expires_at - now).to_std().ok()))
    }
}

fn lock_poisoned() -> Error {
    Error::Storage(StorageError::OperationFailed("lock poisoned".into()))
}

// ============================================================================
// Redis 实现
// ============================================================================

#[cfg(feature = "redis")]
pub use self::redis_store::RedisKeyValueStore;

#[cfg(feature = "redis")]
mod redis_store {
    use std::fmt;
    use std::time::Duration;

    use async_trait::async_trait;
    use redis::aio::MultiplexedConnection;

    use super::KeyValueStore;
    use crate::error::{Error, Result, StorageError, ValidationError};

    /// 每次 SCAN 建议返回的键数
    const SCAN_COUNT: usize = 200;

    /// Redis 键值存储
    ///
    /// 基于多路复用连接，克隆开销很小，可以在任务之间共享。
    #[derive(Clone)]
    pub struct RedisKeyValueStore {
        conn: MultiplexedConnection,
    }

    impl fmt::Debug for RedisKeyValueStore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("RedisKeyValueStore").finish_non_exhaustive()
        }
    }

    impl RedisKeyValueStore {
        /// 连接到指定的 Redis URL
        pub async fn connect(url: &str) -> Result<Self> {
            let client = redis::Client::open(url)
                .map_err(|e| Error::Storage(StorageError::ConnectionFailed(e.to_string())))?;
            let conn = client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| Error::Storage(StorageError::ConnectionFailed(e.to_string())))?;
            Ok(Self { conn })
        }

        /// 使用已建立的连接
        pub fn from_connection(conn: MultiplexedConnection) -> Self {
            Self { conn }
        }
    }

    fn map_err(e: redis::RedisError) -> Error {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
            Error::Storage(StorageError::ConnectionFailed(e.to_string()))
        } else {
            Error::Storage(StorageError::OperationFailed(e.to_string()))
        }
    }

    fn ttl_millis(ttl: Duration) -> Result<u64> {
        match u64::try_from(ttl.as_millis()) {
            Ok(0) => Err(Error::Validation(ValidationError::NonPositiveTtl(0))),
            Ok(ms) => Ok(ms),
            Err(_) => Err(Error::validation("ttl out of range")),
        }
    }

    #[async_trait]
    impl KeyValueStore for RedisKeyValueStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            let mut conn = self.conn.clone();
            redis::cmd("GET")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(map_err)
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            let ms = ttl_millis(ttl)?;
            let mut conn = self.conn.clone();
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(ms)
                .query_async(&mut conn)
                .await
                .map_err(map_err)?;
            Ok(())
        }

        async fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<()> {
            let ms = ttl_millis(ttl)?;
            let mut pipe = redis::pipe();
            // MULTI/EXEC
            pipe.atomic();
            for (key, value) in entries {
                pipe.cmd("SET").arg(key).arg(value).arg("PX").arg(ms).ignore();
            }
            let mut conn = self.conn.clone();
            let _: () = pipe.query_async(&mut conn).await.map_err(map_err)?;
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            let mut conn = self.conn.clone();
            let _: i64 = redis::cmd("DEL")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(map_err)?;
            Ok(())
        }

        async fn delete_many(&self, keys: &[String]) -> Result<()> {
            if keys.is_empty() {
                return Ok(());
            }
            let mut cmd = redis::cmd("DEL");
            for key in keys {
                cmd.arg(key);
            }
            let mut conn = self.conn.clone();
            let _: i64 = cmd
                .query_async(&mut conn)
                .await
                .map_err(map_err)?;
            Ok(())
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            let mut conn = self.conn.clone();
            let count: i64 = redis::cmd("EXISTS")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(map_err)?;
            Ok(count > 0)
        }

        async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
            let pattern = format!("{}*", prefix);
            let mut conn = self.conn.clone();
            let mut cursor: u64 = 0;
            let mut keys = Vec::new();
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_err)?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            // SCAN 可能重复返回同一个键
            keys.sort();
            keys.dedup();
            Ok(keys)
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
            let mut conn = self.conn.clone();
            let ms: i64 = redis::cmd("PTTL")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(map_err)?;
            // -2 表示键不存在，-1 表示没有过期时间
            Ok(u64::try_from(ms).ok().map(Duration::from_millis))
        }
    }
}
