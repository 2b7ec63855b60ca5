//! 请求级执行上下文
//!
//! 上层 handler 为每个请求创建一个 [`RequestContext`]，携带取消信号和可选的
//! 截止时间。所有存储调用都经由 [`RequestContext::run`] 执行，取消或超时后
//! 立即放弃等待并返回 [`StorageError`]。

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, StorageError};

/// 可取消、带截止时间的请求上下文
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// 创建没有截止时间的上下文
    pub fn background() -> Self {
        Self::default()
    }

    /// 创建从现在起 `timeout` 后到期的上下文
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// 创建在指定时刻到期的上下文
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// 派生子上下文
    ///
    /// 父上下文取消时子上下文一同取消；子上下文的截止时间不会晚于父上下文。
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let child_deadline = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, child_deadline) {
            (Some(parent), Some(child)) => Some(parent.min(child)),
            (parent, child) => parent.or(child),
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline,
        }
    }

    /// 取消上下文
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 是否已取消
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 截止时间
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 取消信号
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// 在上下文约束下执行一个存储操作
    ///
    /// `op` 仅用于错误信息，标识被中断的操作。
    pub async fn run<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Storage(StorageError::Cancelled(op.to_string())));
        }

        match self.deadline {
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return Err(Error::Storage(StorageError::DeadlineExceeded));
                }
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        Err(Error::Storage(StorageError::Cancelled(op.to_string())))
                    }
                    res = tokio::time::timeout_at(deadline, fut) => match res {
                        Ok(inner) => inner,
                        Err(_) => Err(Error::Storage(StorageError::DeadlineExceeded)),
                    },
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        Err(Error::Storage(StorageError::Cancelled(op.to_string())))
                    }
                    res = fut => res,
                }
            }
        }
    }
}
