//! 状态定义：SessionPhase 与 SessionSnapshot 投影
//!
//! 展示层只持有轻量的 SessionSnapshot（阶段、检视状态、笔数、失败列、提示讯息）；
//! 完整资料由 QuerySession 维护，需要时再投影。

use serde::Serialize;

use crate::query::KeyFailure;
use crate::view::ViewState;

/// 会话阶段（展示层投影用）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    Querying,
    Ready,
    /// 凭证失效，等待重新登录
    AuthRequired,
    Error,
}

/// 展示层看到的「投影」状态
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub generation: u64,
    pub view: ViewState,
    pub total_count: usize,
    pub page_count: usize,
    pub failures: Vec<KeyFailure>,
    /// 需显示给使用者的单一讯息
    pub notice: Option<String>,
}

impl SessionSnapshot {
    pub fn is_busy(&self) -> bool {
        self.phase == SessionPhase::Querying
    }
}
