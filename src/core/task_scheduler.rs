//! 对外请求的并发上限
//!
//! 明细补全可能同时为整页的资料列触发，用 Semaphore 限制同时在途的远端请求数。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::core::QueryError;

/// 请求调度器：持有许可才可发出远端请求
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TaskScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// 获取一个许可；等待期间若令牌被取消则返回 Cancelled
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, QueryError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(QueryError::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| QueryError::Cancelled)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(4)
    }
}
