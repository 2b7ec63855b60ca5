//! 时钟抽象
//!
//! 所有时间比较都通过注入的 [`Clock`] 读取当前时间，测试中使用
//! [`ManualClock`] 精确控制过期边界。

use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

/// 当前时间来源
pub trait Clock: Send + Sync + fmt::Debug {
    /// 返回当前 UTC 时间
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动控制的时钟，用于测试
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// 创建停在指定时间的时钟
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// 创建停在当前系统时间（精确到秒）的时钟
    pub fn starting_now() -> Self {
        let now = Utc::now();
        let truncated = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self::new(truncated)
    }

    /// 设置当前时间
    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    /// 让时钟前进指定时长
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut guard) = self.now.write() {
            *guard += duration;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
