//! 凭证存放：持有不透明的 Bearer token
//!
//! 远端返回 401 时由编排器调用 invalidate，之后所有请求直接得到 AuthExpired，
//! 直到展示层重新登录。

use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct CredentialStore {
    token: RwLock<Option<String>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// 当前凭证；未登录或已失效时为 None
    pub fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *slot = if token.trim().is_empty() { None } else { Some(token) };
    }

    pub fn invalidate(&self) {
        if self
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            tracing::info!("credential invalidated");
        }
    }

    pub fn is_present(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
