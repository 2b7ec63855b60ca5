//! Session 模块
//!
//! Refresh Token 与用户的绑定关系保存在键值存储中，支持撤销和轮换。
//!
//! ## 子模块
//!
//! - **kv**: 键值存储后端接口与实现
//! - **store**: Session 记录与反向索引
//! - **resolver**: 从请求 Cookie 解析 Session
//!
//! ## 示例
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Duration;
//! use commerce_auth::context::RequestContext;
//! use commerce_auth::session::{InMemoryKeyValueStore, SessionStore};
//! use commerce_auth::types::UserId;
//!
//! # tokio_test_block(async {
//! let store = SessionStore::new(Arc::new(InMemoryKeyValueStore::new()));
//! let ctx = RequestContext::background();
//! let user_id = UserId::new();
//!
//! store.put(&ctx, &user_id, "refresh-token", "local", Duration::days(7)).await.unwrap();
//! assert_eq!(store.get(&ctx, &user_id).await.unwrap().token, "refresh-token");
//! assert_eq!(store.get_user_id_by_token(&ctx, "refresh-token").await.unwrap(), user_id);
//!
//! store.delete(&ctx, &user_id).await.unwrap();
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod kv;
pub mod resolver;
pub mod store;

#[cfg(feature = "redis")]
pub use kv::RedisKeyValueStore;
pub use kv::{InMemoryKeyValueStore, KeyValueStore};
pub use resolver::CookieSessionResolver;
pub use store::{
    LOOKUP_KEY_PREFIX, SESSION_KEY_PREFIX, SessionRecord, SessionStore, SessionStoreConfig,
};
