//! 会话监管：查询代次与取消
//!
//! 每次开始新查询时取消上一个查询的 CancellationToken 并递增代次（generation）。
//! 任何完成回调在写入共享状态前都必须比对代次，不一致即丢弃，
//! 即使底层 I/O 无法在传输层中止，过期结果也不会覆盖新结果。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// 会话级代次与当前查询的取消令牌
#[derive(Debug)]
pub struct SessionSupervisor {
    generation: AtomicU64,
    /// 当前在途查询的令牌
    current: Mutex<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            current: Mutex::new(CancellationToken::new()),
        }
    }

    /// 开始新查询：先取消上一个，再登记新令牌；返回新代次
    pub fn begin(&self, token: CancellationToken) -> u64 {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.cancel();
        *current = token;
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 用户取消：取消当前令牌并递增代次，使在途完成全部失效；
    /// 之后换上新令牌，取消后的明细载入不受影响
    pub fn cancel(&self) -> u64 {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.cancel();
        *current = CancellationToken::new();
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 当前查询的令牌；随查询取消而取消
    pub fn current_token(&self) -> CancellationToken {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// 完成回调据此判断结果是否仍然有效
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
