//! 查询错误类型与恢复动作
//!
//! RemoteError 描述单次远端调用的失败；QueryError 是引擎层的错误分类，
//! 与 RecoveryEngine 配合决定：静默 / 重新登录 / 显示讯息。

use thiserror::Error;

/// 单次远端调用失败（传输层）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    /// 401：凭证失效
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// 查询引擎对外的错误分类
///
/// 需要 Clone：同一 key 的明细请求去重后，结果要分发给所有等待者。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// 传输层失败，可重试
    #[error("Network error: {0}")]
    Network(String),

    /// 凭证被拒，需要重新输入，不自动重试
    #[error("Credential expired")]
    AuthExpired,

    /// 被更新的查询取代，不视为失败
    #[error("Cancelled")]
    Cancelled,

    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// 响应无法解析或缺少必要字段
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl QueryError {
    /// 网络、超时与 5xx 可重试；凭证失效与取消不可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// 将远端错误映射为引擎错误；timeout_secs 用于超时讯息
    pub fn from_remote(err: RemoteError, timeout_secs: u64) -> Self {
        match err {
            RemoteError::Network(msg) => Self::Network(msg),
            RemoteError::Unauthorized => Self::AuthExpired,
            RemoteError::Timeout => Self::Timeout { secs: timeout_secs },
            RemoteError::Http { status, body } => Self::Http {
                status,
                message: body,
            },
            RemoteError::Parse(msg) => Self::Malformed(msg),
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 预期内的结果（如被新查询取代），不提示
    Ignore,
    /// 凭证失效，请展示层重新索取凭证
    PromptCredential,
    /// 显示单条可读讯息，保留画面上原有结果
    ShowMessage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_maps_to_auth_expired() {
        assert_eq!(
            QueryError::from_remote(RemoteError::Unauthorized, 30),
            QueryError::AuthExpired
        );
    }

    #[test]
    fn test_timeout_carries_seconds() {
        let err = QueryError::from_remote(RemoteError::Timeout, 12);
        assert_eq!(err, QueryError::Timeout { secs: 12 });
        assert!(err.to_string().contains("12"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(QueryError::Network("reset".into()).is_retryable());
        assert!(QueryError::Http { status: 503, message: String::new() }.is_retryable());
        assert!(!QueryError::Http { status: 404, message: String::new() }.is_retryable());
        assert!(!QueryError::AuthExpired.is_retryable());
        assert!(!QueryError::Cancelled.is_retryable());
    }
}
