//! 核心层：错误与恢复、状态投影、会话监管、任务调度、组装

pub mod builder;
pub mod error;
pub mod recovery;
pub mod session_supervisor;
pub mod state;
pub mod task_scheduler;

pub use builder::{create_session_builder, SessionBuilder};
pub use error::{QueryError, RecoveryAction, RemoteError};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{SessionPhase, SessionSnapshot};
pub use task_scheduler::TaskScheduler;
