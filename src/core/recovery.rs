//! 错误恢复引擎
//!
//! 根据 QueryError 类型返回 RecoveryAction，供会话决定是静默、要求重新登录还是显示讯息。

use crate::core::{QueryError, RecoveryAction};

/// 将错误映射为展示层可执行的动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &QueryError) -> RecoveryAction {
        match err {
            QueryError::Cancelled => RecoveryAction::Ignore,
            QueryError::AuthExpired => RecoveryAction::PromptCredential,
            QueryError::Timeout { secs } => RecoveryAction::ShowMessage(format!(
                "查询逾时（{secs} 秒），请稍后重试。"
            )),
            e if e.is_retryable() => {
                RecoveryAction::ShowMessage(format!("查询失败：{e}，请稍后重试。"))
            }
            e => RecoveryAction::ShowMessage(format!("查询失败：{e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_cancelled_is_silent() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.handle(&QueryError::Cancelled), RecoveryAction::Ignore);
    }

    #[test]
    fn test_recovery_auth_expired() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&QueryError::AuthExpired),
            RecoveryAction::PromptCredential
        );
    }

    #[test]
    fn test_recovery_network_error() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&QueryError::Network("connection reset".to_string()));
        match action {
            RecoveryAction::ShowMessage(msg) => {
                assert!(msg.contains("connection reset"));
                assert!(msg.contains("重试"));
            }
            _ => panic!("Expected ShowMessage"),
        }
    }

    #[test]
    fn test_recovery_timeout() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&QueryError::Timeout { secs: 30 });
        assert!(matches!(action, RecoveryAction::ShowMessage(msg) if msg.contains("30")));
    }

    #[test]
    fn test_recovery_malformed() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&QueryError::Malformed("missing key".to_string()));
        assert!(matches!(action, RecoveryAction::ShowMessage(msg) if !msg.contains("重试")));
    }
}
