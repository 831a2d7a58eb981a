//! 查询会话：展示层唯一的入口
//!
//! 一个会话拥有自己的资料存放（主档 / 通路原始列）、检视状态与明细快取，
//! 不使用全域单例，多个会话可以并存。
//!
//! 写入共享状态只发生在完成回调里，并与「开始新查询」互斥：
//! 代次在写锁内递增，完成时在写锁内比对代次，不一致就丢弃。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use futures_util::future::join_all;
use tokio::sync::{mpsc, RwLock};

use crate::catalog::{normalize_key, reconcile, RawChannelRow, RawMasterRow, ReconciledItem};
use crate::core::{
    QueryError, RecoveryAction, RecoveryEngine, SessionPhase, SessionSnapshot, SessionSupervisor,
};
use crate::query::{
    DetailLoader, FailureScope, FetchedRecords, KeyFailure, QueryEvent, QueryMode, QueryOrchestrator,
    QueryOutcome, QueryRequest,
};
use crate::remote::CredentialStore;
use crate::view::{render_tsv, SortKey, StatusSummary, ViewModel};

const AUTH_EXPIRED_NOTICE: &str = "凭证已失效，请重新登录。";

/// 当前结果的原始资料
#[derive(Debug, Default)]
pub struct CatalogStore {
    masters: Vec<RawMasterRow>,
    channels: Vec<RawChannelRow>,
}

impl CatalogStore {
    pub fn replace(&mut self, records: FetchedRecords) {
        self.masters = records.masters;
        self.channels = records.channels;
    }

    /// 以新资料取代相同 key 的旧列
    pub fn merge(&mut self, records: FetchedRecords) {
        let keys: HashSet<String> = records
            .masters
            .iter()
            .map(|m| normalize_key(&m.key))
            .collect();
        self.masters.retain(|m| !keys.contains(&normalize_key(&m.key)));
        self.channels.retain(|c| !keys.contains(&normalize_key(&c.key)));
        self.masters.extend(records.masters);
        self.channels.extend(records.channels);
    }

    /// 以目前持有的全部原始列重新对账
    pub fn reconcile(&self, reference: NaiveDate) -> Vec<ReconciledItem> {
        reconcile(&self.masters, &self.channels, reference)
    }

    pub fn master_count(&self) -> usize {
        self.masters.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

struct SessionState {
    store: CatalogStore,
    view: ViewModel,
    last_mode: Option<QueryMode>,
    phase: SessionPhase,
    notice: Option<String>,
}

pub struct QuerySession {
    orchestrator: QueryOrchestrator,
    details: DetailLoader,
    credentials: Arc<CredentialStore>,
    supervisor: SessionSupervisor,
    recovery: RecoveryEngine,
    /// None 表示以执行当天为参考日
    reference_date: Option<NaiveDate>,
    state: RwLock<SessionState>,
    events: Option<mpsc::UnboundedSender<QueryEvent>>,
}

impl QuerySession {
    pub fn new(
        orchestrator: QueryOrchestrator,
        details: DetailLoader,
        credentials: Arc<CredentialStore>,
        page_size: usize,
    ) -> Self {
        Self {
            orchestrator,
            details,
            credentials,
            supervisor: SessionSupervisor::new(),
            recovery: RecoveryEngine::new(),
            reference_date: None,
            state: RwLock::new(SessionState {
                store: CatalogStore::default(),
                view: ViewModel::new(page_size),
                last_mode: None,
                phase: SessionPhase::Idle,
                notice: None,
            }),
            events: None,
        }
    }

    pub fn with_reference_date(mut self, reference: Option<NaiveDate>) -> Self {
        self.reference_date = reference;
        self
    }

    /// 进度事件接收端（显示进度与逐笔错误）
    pub fn with_events(mut self, events: mpsc::UnboundedSender<QueryEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// 开始新查询：先取消在途查询，完成后若仍是当前代次才写入结果
    pub async fn start_query(&self, mode: QueryMode) -> QueryOutcome {
        let request = QueryRequest::new(mode.clone());
        let generation = {
            let mut state = self.state.write().await;
            state.last_mode = Some(mode);
            self.begin(&mut state, &request)
        };
        self.execute(generation, request, false).await
    }

    /// 取消在途查询；之后到达的完成一律丢弃，画面保留原结果
    pub async fn cancel_query(&self) {
        let mut state = self.state.write().await;
        let generation = self.supervisor.cancel();
        tracing::info!("query cancelled by user (generation {})", generation);
        if state.phase == SessionPhase::Querying {
            state.phase = idle_or_ready(&state.view);
        }
    }

    /// 清空明细快取后重跑上一次查询；尚未查询过则返回 None
    pub async fn refresh(&self) -> Option<QueryOutcome> {
        let mode = self.state.read().await.last_mode.clone()?;
        self.details.reset().await;
        Some(self.start_query(mode).await)
    }

    /// 只重查上次失败的 key，结果合并进现有清单；
    /// 有整个通路失败时无法只补部分 key，改为重跑上一次查询
    pub async fn retry_failed(&self) -> Option<QueryOutcome> {
        let (request, generation, merge) = {
            let mut state = self.state.write().await;
            let failures = state.view.failures();
            if failures.is_empty() {
                return None;
            }
            let channel_failed = failures.iter().any(|f| f.scope == FailureScope::Channel);
            let (request, merge) = match state.last_mode.clone() {
                Some(mode) if channel_failed => {
                    tracing::info!("retrying last query after channel failure");
                    (QueryRequest::new(mode), false)
                }
                _ => {
                    let keys: Vec<String> = failures
                        .iter()
                        .filter(|f| f.scope == FailureScope::Key)
                        .map(|f| f.key.clone())
                        .collect();
                    tracing::info!("retrying {} failed key(s)", keys.len());
                    (QueryRequest::new(QueryMode::by_keys(keys)), true)
                }
            };
            let generation = self.begin(&mut state, &request);
            (request, generation, merge)
        };
        Some(self.execute(generation, request, merge).await)
    }

    /// 验证凭证，通过才存入
    pub async fn login(&self, token: &str) -> Result<bool, QueryError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(false);
        }
        if !self.orchestrator.verify_credential(token).await? {
            tracing::warn!("credential rejected");
            return Ok(false);
        }
        self.credentials.set(token);
        let mut state = self.state.write().await;
        if state.phase == SessionPhase::AuthRequired {
            state.phase = idle_or_ready(&state.view);
            state.notice = None;
        }
        Ok(true)
    }

    pub async fn set_search(&self, keyword: &str) {
        self.state.write().await.view.set_search(keyword);
    }

    pub async fn set_sort(&self, key: SortKey) {
        self.state.write().await.view.set_sort(key);
    }

    pub async fn set_filter(&self, anomaly_only: bool) {
        self.state.write().await.view.set_anomaly_only(anomaly_only);
    }

    pub async fn set_page(&self, page_index: usize) {
        self.state.write().await.view.set_page(page_index);
    }

    pub async fn set_page_size(&self, page_size: usize) {
        self.state.write().await.view.set_page_size(page_size);
    }

    pub async fn visible_page(&self) -> Vec<ReconciledItem> {
        self.state
            .read()
            .await
            .view
            .visible_page()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn total_count(&self) -> usize {
        self.state.read().await.view.total_count()
    }

    pub async fn page_count(&self) -> usize {
        self.state.read().await.view.page_count()
    }

    pub async fn status_summary(&self) -> StatusSummary {
        self.state.read().await.view.status_summary()
    }

    pub async fn failures(&self) -> Vec<KeyFailure> {
        self.state.read().await.view.failures().to_vec()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            phase: state.phase,
            generation: self.supervisor.generation(),
            view: state.view.state().clone(),
            total_count: state.view.total_count(),
            page_count: state.view.page_count(),
            failures: state.view.failures().to_vec(),
            notice: state.notice.clone(),
        }
    }

    /// 筛选且排序后的完整集合（非仅当前页），tab 分隔
    pub async fn copy_all_visible(&self) -> String {
        render_tsv(self.state.read().await.view.filtered())
    }

    /// 为当前页尚无明细的资料列补抓明细；返回写入笔数
    pub async fn load_visible_details(&self) -> usize {
        let (keys, generation) = {
            let state = self.state.read().await;
            let keys: Vec<String> = state
                .view
                .visible_page()
                .into_iter()
                .filter(|item| item.master.detail.is_none())
                .map(|item| item.key().to_string())
                .collect();
            (keys, self.supervisor.generation())
        };
        if keys.is_empty() {
            return 0;
        }

        let cancel = self.supervisor.current_token();
        let results = join_all(keys.iter().map(|key| {
            let cancel = &cancel;
            async move { (key, self.details.load(key, cancel).await) }
        }))
        .await;

        let mut state = self.state.write().await;
        if !self.supervisor.is_current(generation) {
            tracing::debug!("discarding details for stale generation {}", generation);
            return 0;
        }
        let mut loaded = 0;
        for (key, result) in results {
            match result {
                Ok(detail) => {
                    if state.view.set_detail(key, &detail) {
                        loaded += 1;
                    }
                }
                Err(QueryError::Cancelled) => {}
                Err(QueryError::AuthExpired) => {
                    state.phase = SessionPhase::AuthRequired;
                    state.notice = Some(AUTH_EXPIRED_NOTICE.to_string());
                }
                Err(e) => tracing::debug!("detail for {} failed: {}", key, e),
            }
        }
        loaded
    }

    /// 单一 key 的明细（不要求在当前页）
    pub async fn load_detail(&self, key: &str) -> Result<Arc<String>, QueryError> {
        let generation = self.supervisor.generation();
        let detail = self
            .details
            .load(key, &self.supervisor.current_token())
            .await?;
        let mut state = self.state.write().await;
        if self.supervisor.is_current(generation) {
            state.view.set_detail(&normalize_key(key), &detail);
        }
        Ok(detail)
    }

    fn begin(&self, state: &mut SessionState, request: &QueryRequest) -> u64 {
        let generation = self.supervisor.begin(request.cancel.clone());
        state.phase = SessionPhase::Querying;
        state.notice = None;
        tracing::debug!("query {} is generation {}", request.id, generation);
        generation
    }

    async fn execute(&self, generation: u64, request: QueryRequest, merge: bool) -> QueryOutcome {
        let reference = self.reference_date();
        let outcome = self
            .orchestrator
            .run(&request, reference, self.events.as_ref())
            .await;

        let mut state = self.state.write().await;
        if !self.supervisor.is_current(generation) {
            if !outcome.is_cancelled() {
                tracing::warn!("discarding stale completion of query {}", request.id);
            }
            return QueryOutcome::Cancelled;
        }

        match &outcome {
            QueryOutcome::Completed(records) | QueryOutcome::Partial { records, .. } => {
                let failures = outcome.failures().to_vec();
                if merge {
                    state.store.merge(records.clone());
                } else {
                    state.store.replace(records.clone());
                }
                // 合并时以原查询的条件筛选整个存放
                let mode = match (&state.last_mode, merge) {
                    (Some(last), true) => last.clone(),
                    _ => request.mode.clone(),
                };
                let mut items: Vec<ReconciledItem> = state
                    .store
                    .reconcile(reference)
                    .into_iter()
                    .filter(|item| mode.retains(item))
                    .collect();
                self.attach_cached_details(&mut items);

                state.notice = (!failures.is_empty())
                    .then(|| format!("{} 笔查询失败，可重试。", failures.len()));
                if merge {
                    state.view.replace_items(items, failures);
                } else {
                    state.view.set_items(items, failures);
                }
                state.phase = SessionPhase::Ready;
                tracing::info!(
                    "{} item(s) ready, {} master row(s) held",
                    state.view.total_count(),
                    state.store.master_count()
                );
            }
            QueryOutcome::Cancelled => {
                state.phase = idle_or_ready(&state.view);
            }
            QueryOutcome::AuthExpired => {
                state.phase = SessionPhase::AuthRequired;
                state.notice = self.notice_for(&QueryError::AuthExpired);
            }
            QueryOutcome::Failed(e) => {
                // 保留先前结果
                state.phase = SessionPhase::Error;
                state.notice = self.notice_for(e);
            }
        }
        outcome
    }

    fn notice_for(&self, err: &QueryError) -> Option<String> {
        match self.recovery.handle(err) {
            RecoveryAction::Ignore => None,
            RecoveryAction::PromptCredential => Some(AUTH_EXPIRED_NOTICE.to_string()),
            RecoveryAction::ShowMessage(message) => Some(message),
        }
    }

    fn attach_cached_details(&self, items: &mut [ReconciledItem]) {
        for item in items.iter_mut() {
            if let Some(detail) = self.details.cache().get(item.key()) {
                item.master.detail = Some(detail.as_ref().clone());
            }
        }
    }
}

fn idle_or_ready(view: &ViewModel) -> SessionPhase {
    if view.items().is_empty() {
        SessionPhase::Idle
    } else {
        SessionPhase::Ready
    }
}
