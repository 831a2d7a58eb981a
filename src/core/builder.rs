//! 会话构建器：统一的 QuerySession 初始化逻辑
//!
//! CLI 与测试共用同一套组装：目录服务、凭证、编排器、明细载入器与并发上限都从配置来。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::core::{QueryError, TaskScheduler};
use crate::query::{DetailLoader, QueryEvent, QueryOrchestrator};
use crate::remote::{CatalogService, CredentialStore, HttpCatalogService};
use crate::session::QuerySession;

/// 会话构建器
pub struct SessionBuilder {
    config: AppConfig,
    service: Option<Arc<dyn CatalogService>>,
    credentials: Option<Arc<CredentialStore>>,
    reference_date: Option<NaiveDate>,
    events: Option<mpsc::UnboundedSender<QueryEvent>>,
}

impl SessionBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            service: None,
            credentials: None,
            reference_date: None,
            events: None,
        }
    }

    /// 指定目录服务；未指定时依 [remote] 建立 HTTP 服务
    pub fn with_service(mut self, service: Arc<dyn CatalogService>) -> Self {
        self.service = Some(service);
        self
    }

    /// 共用外部的凭证存放；未指定时以 [credential].token 初始化
    pub fn with_credentials(mut self, credentials: Arc<CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// 覆盖参考日（优先于 [app].reference_date）
    pub fn with_reference_date(mut self, reference: NaiveDate) -> Self {
        self.reference_date = Some(reference);
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<QueryEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build_service(&self) -> Result<Arc<dyn CatalogService>, QueryError> {
        match &self.service {
            Some(service) => Ok(Arc::clone(service)),
            None => {
                let service = HttpCatalogService::new(&self.config.remote)
                    .map_err(|e| QueryError::Config(e.to_string()))?;
                Ok(Arc::new(service))
            }
        }
    }

    pub fn build_credentials(&self) -> Arc<CredentialStore> {
        match &self.credentials {
            Some(credentials) => Arc::clone(credentials),
            None => match self.config.credential.token.as_deref() {
                Some(token) => Arc::new(CredentialStore::with_token(token)),
                None => Arc::new(CredentialStore::new()),
            },
        }
    }

    pub fn build(self) -> Result<QuerySession, QueryError> {
        let service = self.build_service()?;
        let credentials = self.build_credentials();
        let remote = &self.config.remote;
        let timeout = Duration::from_secs(remote.request_timeout_secs.max(1));

        let orchestrator = QueryOrchestrator::new(
            Arc::clone(&service),
            Arc::clone(&credentials),
            timeout,
            remote.max_master_pages,
        );
        let details = DetailLoader::new(
            service,
            Arc::clone(&credentials),
            TaskScheduler::new(self.config.query.max_concurrent_details),
            timeout,
        );

        let reference = self
            .reference_date
            .or_else(|| self.config.app.reference_date());
        let mut session =
            QuerySession::new(orchestrator, details, credentials, self.config.query.page_size)
                .with_reference_date(reference);
        if let Some(events) = self.events {
            session = session.with_events(events);
        }
        Ok(session)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// 便捷函数：加载配置并创建 SessionBuilder；配置读取失败时退回默认值
pub fn create_session_builder(config_path: Option<PathBuf>) -> SessionBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    SessionBuilder::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockCatalogService;

    #[test]
    fn test_credentials_from_config() {
        let mut config = AppConfig::default();
        config.credential.token = Some("tok".to_string());
        let builder = SessionBuilder::new(config);
        assert_eq!(builder.build_credentials().get().as_deref(), Some("tok"));
    }

    #[test]
    fn test_reference_date_override() {
        let mut config = AppConfig::default();
        config.app.reference_date = Some("2024-02-29".to_string());
        let session = SessionBuilder::new(config)
            .with_service(Arc::new(MockCatalogService::new()))
            .build()
            .unwrap();
        assert_eq!(
            session.reference_date(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }
}
