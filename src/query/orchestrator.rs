//! 查询编排：执行一次 QueryRequest
//!
//! 依查询模式发出主档 / 通路请求（可并行），支援协作式取消与逐 key 部分失败；
//! 只返回原始资料，合并与判定交给对账层。
//!
//! 每个远端调用都与取消令牌赛跑并套用逾时；401 会清除凭证并以 AuthExpired 结束，
//! 取消则以 Cancelled 结束（与空结果、失败皆可区分），不会把半途资料交给下游。

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::catalog::codes::canonical_channel;
use crate::catalog::{normalize_key, ChannelRecord, RawChannelRow, RawMasterRow, SaleStatus};
use crate::core::{QueryError, RemoteError};
use crate::query::{QueryMode, QueryRequest};
use crate::remote::{CatalogService, ChannelFilter, CredentialStore, MasterFilter};

/// 失败列针对的对象
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FailureScope {
    /// 单一主档 key
    #[default]
    Key,
    /// 整个通路的查询（key 栏位为通路代码）
    Channel,
}

/// 失败记录（错误列）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub reason: String,
    pub scope: FailureScope,
}

impl KeyFailure {
    pub fn new(key: &str, reason: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            reason: reason.into(),
            scope: FailureScope::Key,
        }
    }

    pub fn channel(channel: &str, reason: impl Into<String>) -> Self {
        Self {
            key: channel.to_string(),
            reason: reason.into(),
            scope: FailureScope::Channel,
        }
    }
}

/// 一次查询抓回的原始资料
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchedRecords {
    pub masters: Vec<RawMasterRow>,
    pub channels: Vec<RawChannelRow>,
}

/// 查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Completed(FetchedRecords),
    /// 部分 key 失败；成功的部分仍可使用
    Partial {
        records: FetchedRecords,
        failures: Vec<KeyFailure>,
    },
    /// 被新查询取代或用户取消
    Cancelled,
    /// 凭证被拒，需要重新登录
    AuthExpired,
    Failed(QueryError),
}

impl QueryOutcome {
    pub fn records(&self) -> Option<&FetchedRecords> {
        match self {
            Self::Completed(records) | Self::Partial { records, .. } => Some(records),
            _ => None,
        }
    }

    pub fn failures(&self) -> &[KeyFailure] {
        match self {
            Self::Partial { failures, .. } => failures,
            _ => &[],
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// 查询进度事件（供展示层显示进度与逐笔错误）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    MasterPage { page: u32, total_pages: u32, rows: usize },
    KeyProgress { done: usize, total: usize, key: String },
    KeyFailed(KeyFailure),
    ChannelsFetched { rows: usize },
}

type Events<'a> = Option<&'a mpsc::UnboundedSender<QueryEvent>>;

fn emit(events: Events<'_>, event: QueryEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// 查询编排器
pub struct QueryOrchestrator {
    service: Arc<dyn CatalogService>,
    credentials: Arc<CredentialStore>,
    timeout: Duration,
    max_master_pages: u32,
}

impl QueryOrchestrator {
    pub fn new(
        service: Arc<dyn CatalogService>,
        credentials: Arc<CredentialStore>,
        timeout: Duration,
        max_master_pages: u32,
    ) -> Self {
        Self {
            service,
            credentials,
            timeout,
            max_master_pages: max_master_pages.max(1),
        }
    }

    /// 执行查询；reference 用于按通路状态挑选 key
    pub async fn run(
        &self,
        request: &QueryRequest,
        reference: NaiveDate,
        events: Events<'_>,
    ) -> QueryOutcome {
        let span = tracing::info_span!("query", id = %request.id, mode = request.mode.label());
        async move {
            tracing::info!("query started");
            let result = self.dispatch(request, reference, events).await;
            let outcome = match result {
                // 完成时已被取消：结果一律不交给下游
                Ok(_) if request.is_cancelled() => QueryOutcome::Cancelled,
                Ok((records, failures)) if failures.is_empty() => QueryOutcome::Completed(records),
                Ok((records, failures)) => QueryOutcome::Partial { records, failures },
                Err(QueryError::Cancelled) => QueryOutcome::Cancelled,
                Err(QueryError::AuthExpired) => QueryOutcome::AuthExpired,
                Err(e) => QueryOutcome::Failed(e),
            };
            match &outcome {
                QueryOutcome::Completed(r) => tracing::info!(
                    "query completed: {} master row(s), {} channel row(s)",
                    r.masters.len(),
                    r.channels.len()
                ),
                QueryOutcome::Partial { records, failures } => tracing::warn!(
                    "query partially failed: {} master row(s), {} failed key(s)",
                    records.masters.len(),
                    failures.len()
                ),
                QueryOutcome::Cancelled => tracing::info!("query cancelled"),
                QueryOutcome::AuthExpired => tracing::warn!("query stopped: credential expired"),
                QueryOutcome::Failed(e) => tracing::warn!("query failed: {}", e),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// 轻量探测凭证
    pub async fn verify_credential(&self, token: &str) -> Result<bool, QueryError> {
        let secs = self.timeout.as_secs();
        match tokio::time::timeout(self.timeout, self.service.verify_credential(token)).await {
            Err(_) => Err(QueryError::Timeout { secs }),
            Ok(result) => result.map_err(|e| QueryError::from_remote(e, secs)),
        }
    }

    async fn dispatch(
        &self,
        request: &QueryRequest,
        reference: NaiveDate,
        events: Events<'_>,
    ) -> Result<(FetchedRecords, Vec<KeyFailure>), QueryError> {
        let token = self.credentials.get().ok_or(QueryError::AuthExpired)?;
        let cancel = &request.cancel;

        match &request.mode {
            QueryMode::ByKey { keys } => self.by_keys(&token, keys, cancel, events).await,
            QueryMode::ByNameKeyword { keyword } => {
                let filter = MasterFilter::NameKeyword(keyword.trim().to_string());
                let masters = self.fetch_all_pages(&token, &filter, cancel, events).await?;
                let keys = distinct_keys(masters.iter().map(|m| m.key.as_str()));
                let mut failures = Vec::new();
                let channels = if keys.is_empty() {
                    Vec::new()
                } else {
                    let filter = ChannelFilter::Keys(keys.clone());
                    let result = self.fetch_channels(&token, &filter, cancel, events).await;
                    record_channel_failure(result, &keys, &mut failures, events)?
                };
                Ok((FetchedRecords { masters, channels }, failures))
            }
            QueryMode::ByMasterStatus { .. } => {
                let (masters, channels) = tokio::join!(
                    self.fetch_all_pages(&token, &MasterFilter::All, cancel, events),
                    self.fetch_channels(&token, &ChannelFilter::All, cancel, events),
                );
                let masters = masters?;
                let keys = distinct_keys(masters.iter().map(|m| m.key.as_str()));
                let mut failures = Vec::new();
                let channels = record_channel_failure(channels, &keys, &mut failures, events)?;
                Ok((FetchedRecords { masters, channels }, failures))
            }
            QueryMode::ByChannelStatus { channels, statuses } => {
                let (rows, channel_failures) =
                    self.fetch_channel_sets(&token, channels, cancel, events).await?;
                let keys = select_keys_by_channel_status(&rows, statuses, reference);
                tracing::debug!("{} key(s) match the channel status filter", keys.len());
                let (records, mut failures) = self.by_keys(&token, &keys, cancel, events).await?;
                failures.extend(channel_failures);
                Ok((records, failures))
            }
        }
    }

    /// 按 key 查询：主档与通路并行抓取；通路端失败不会丢掉已取得的主档
    async fn by_keys(
        &self,
        token: &str,
        keys: &[String],
        cancel: &CancellationToken,
        events: Events<'_>,
    ) -> Result<(FetchedRecords, Vec<KeyFailure>), QueryError> {
        let keys = distinct_keys(keys.iter().map(String::as_str));
        if keys.is_empty() {
            return Ok((FetchedRecords::default(), Vec::new()));
        }

        let channel_filter = ChannelFilter::Keys(keys.clone());
        let (masters, channels) = tokio::join!(
            self.fetch_masters_by_key(token, &keys, cancel, events),
            self.fetch_channels(token, &channel_filter, cancel, events),
        );
        let (masters, mut failures) = masters?;
        let channels = record_channel_failure(channels, &keys, &mut failures, events)?;
        Ok((FetchedRecords { masters, channels }, failures))
    }

    /// 依端点能力选择批次或逐 key；逐 key 时单一 key 失败只记为错误列
    async fn fetch_masters_by_key(
        &self,
        token: &str,
        keys: &[String],
        cancel: &CancellationToken,
        events: Events<'_>,
    ) -> Result<(Vec<RawMasterRow>, Vec<KeyFailure>), QueryError> {
        let mut failures = Vec::new();

        if self.service.supports_batch_lookup() {
            let filter = MasterFilter::Keys(keys.to_vec());
            let masters = self.fetch_all_pages(token, &filter, cancel, events).await?;
            let found: HashSet<String> = masters.iter().map(|m| normalize_key(&m.key)).collect();
            for key in keys.iter().filter(|k| !found.contains(*k)) {
                let failure = KeyFailure::new(key, "not found");
                emit(events, QueryEvent::KeyFailed(failure.clone()));
                failures.push(failure);
            }
            return Ok((masters, failures));
        }

        let total = keys.len();
        let mut masters = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            let filter = MasterFilter::Keys(vec![key.clone()]);
            match self.fetch_all_pages(token, &filter, cancel, None).await {
                Ok(rows) if rows.is_empty() => failures.push(KeyFailure::new(key, "not found")),
                Ok(rows) => masters.extend(rows),
                Err(e @ (QueryError::Cancelled | QueryError::AuthExpired)) => return Err(e),
                Err(e) => {
                    tracing::debug!("key {} failed: {}", key, e);
                    failures.push(KeyFailure::new(key, e.to_string()));
                }
            }
            if let Some(failure) = failures.last().filter(|f| &f.key == key) {
                emit(events, QueryEvent::KeyFailed(failure.clone()));
            }
            emit(
                events,
                QueryEvent::KeyProgress {
                    done: i + 1,
                    total,
                    key: key.clone(),
                },
            );
        }
        Ok((masters, failures))
    }

    /// 逐页抓取直到空页、最后一页或页数上限；未回报总页数时抓到空页为止
    async fn fetch_all_pages(
        &self,
        token: &str,
        filter: &MasterFilter,
        cancel: &CancellationToken,
        events: Events<'_>,
    ) -> Result<Vec<RawMasterRow>, QueryError> {
        let mut rows = Vec::new();
        let mut page = 1;
        loop {
            let result = self
                .guarded(cancel, self.service.fetch_master_page(token, filter, page))
                .await?;
            tracing::debug!(
                "master page {}/{}: {} row(s)",
                page,
                result.total_pages,
                result.rows.len()
            );
            emit(
                events,
                QueryEvent::MasterPage {
                    page,
                    total_pages: result.total_pages,
                    rows: result.rows.len(),
                },
            );

            let empty = result.rows.is_empty();
            rows.extend(result.rows);
            if empty || (result.total_pages > 0 && page >= result.total_pages) {
                break;
            }
            if page >= self.max_master_pages {
                tracing::warn!(
                    "stopped after {} page(s); {} page(s) reported",
                    page,
                    result.total_pages
                );
                break;
            }
            page += 1;
        }
        Ok(rows)
    }

    async fn fetch_channels(
        &self,
        token: &str,
        filter: &ChannelFilter,
        cancel: &CancellationToken,
        events: Events<'_>,
    ) -> Result<Vec<RawChannelRow>, QueryError> {
        let rows = self
            .guarded(cancel, self.service.fetch_channel_records(token, filter))
            .await?;
        emit(events, QueryEvent::ChannelsFetched { rows: rows.len() });
        Ok(rows)
    }

    /// 多个通路并行抓取；空清单表示全部通路
    ///
    /// 单一通路失败只记为该通路的失败列，其余通路的结果照常使用；
    /// 取消与凭证失效仍整体中止。
    async fn fetch_channel_sets(
        &self,
        token: &str,
        channels: &[String],
        cancel: &CancellationToken,
        events: Events<'_>,
    ) -> Result<(Vec<RawChannelRow>, Vec<KeyFailure>), QueryError> {
        if channels.is_empty() {
            let rows = self.fetch_channels(token, &ChannelFilter::All, cancel, events).await?;
            return Ok((rows, Vec::new()));
        }
        let mut ids: Vec<String> = channels.iter().map(|c| canonical_channel(c)).collect();
        let mut seen = HashSet::new();
        ids.retain(|c| seen.insert(c.clone()));
        let filters: Vec<ChannelFilter> = ids.iter().cloned().map(ChannelFilter::Channel).collect();
        let results = join_all(
            filters
                .iter()
                .map(|filter| self.fetch_channels(token, filter, cancel, events)),
        )
        .await;

        let mut rows = Vec::new();
        let mut failures = Vec::new();
        for (channel, result) in ids.iter().zip(results) {
            match result {
                Ok(found) => rows.extend(found),
                Err(e @ (QueryError::Cancelled | QueryError::AuthExpired)) => return Err(e),
                Err(e) => {
                    tracing::warn!("channel {} lookup failed: {}", channel, e);
                    let failure = KeyFailure::channel(channel, e.to_string());
                    emit(events, QueryEvent::KeyFailed(failure.clone()));
                    failures.push(failure);
                }
            }
        }
        Ok((rows, failures))
    }

    /// 远端调用与取消赛跑并套用逾时；401 清除凭证
    async fn guarded<T, F>(&self, cancel: &CancellationToken, call: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let secs = self.timeout.as_secs();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QueryError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Err(_) => Err(QueryError::Timeout { secs }),
                Ok(Err(RemoteError::Unauthorized)) => {
                    self.credentials.invalidate();
                    Err(QueryError::AuthExpired)
                }
                Ok(Err(e)) => Err(QueryError::from_remote(e, secs)),
                Ok(Ok(value)) => Ok(value),
            },
        }
    }
}

/// 通路端的失败不丢弃主档：取消与凭证失效照常中止，
/// 其余错误记到每个尚未失败的 key 上，通路资料视为空
fn record_channel_failure(
    result: Result<Vec<RawChannelRow>, QueryError>,
    keys: &[String],
    failures: &mut Vec<KeyFailure>,
    events: Events<'_>,
) -> Result<Vec<RawChannelRow>, QueryError> {
    let err = match result {
        Ok(rows) => return Ok(rows),
        Err(e @ (QueryError::Cancelled | QueryError::AuthExpired)) => return Err(e),
        Err(e) => e,
    };
    tracing::warn!("channel lookup failed for {} key(s): {}", keys.len(), err);
    let reason = format!("channel lookup failed: {err}");
    for key in keys {
        if failures.iter().any(|f| &f.key == key) {
            continue;
        }
        let failure = KeyFailure::new(key, reason.clone());
        emit(events, QueryEvent::KeyFailed(failure.clone()));
        failures.push(failure);
    }
    Ok(Vec::new())
}

/// 正规化后去重，保留首次出现顺序
fn distinct_keys<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.map(normalize_key)
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect()
}

fn select_keys_by_channel_status(
    rows: &[RawChannelRow],
    statuses: &[SaleStatus],
    reference: NaiveDate,
) -> Vec<String> {
    let matching: Vec<ChannelRecord> = rows
        .iter()
        .map(|row| ChannelRecord::from_raw(row, reference))
        .filter(|record| statuses.contains(&record.status))
        .collect();
    distinct_keys(matching.iter().map(|r| r.key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockCatalogService;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn catalog() -> MockCatalogService {
        MockCatalogService::new()
            .with_masters(vec![
                RawMasterRow::new("A1", "Alpha Life", "2024-01-01", "9999-12-31"),
                RawMasterRow::new("A2", "Alpha Health", "2023-01-01", "2024-12-31"),
                RawMasterRow::new("B1", "Beta Annuity", "2025-01-01", "9999-12-31"),
            ])
            .with_channels(vec![
                RawChannelRow::new("A1", "AG", "2024-01-01", "9999-12-31"),
                RawChannelRow::new("A2", "AG", "2025-01-01", "2025-12-31"),
                RawChannelRow::new("B1", "BR", "2025-01-01", "2025-03-31"),
            ])
    }

    fn orchestrator(mock: Arc<MockCatalogService>) -> QueryOrchestrator {
        QueryOrchestrator::new(
            mock,
            Arc::new(CredentialStore::with_token("tok")),
            Duration::from_secs(5),
            50,
        )
    }

    #[tokio::test]
    async fn test_by_key_batched_reports_missing_keys() {
        let mock = Arc::new(catalog().with_failing_key("BAD"));
        let orch = orchestrator(Arc::clone(&mock));
        let request = QueryRequest::new(QueryMode::by_keys(["A1", "A2", "BAD"]));

        let outcome = orch.run(&request, reference(), None).await;
        match outcome {
            QueryOutcome::Partial { records, failures } => {
                assert_eq!(records.masters.len(), 2);
                assert_eq!(failures, vec![KeyFailure::new("BAD", "not found")]);
            }
            other => panic!("expected partial, got {:?}", other),
        }
        assert_eq!(mock.master_calls(), 1);
    }

    #[tokio::test]
    async fn test_by_key_sequential_records_per_key_errors() {
        let mock = Arc::new(catalog().with_batch(false).with_failing_key("BAD"));
        let orch = orchestrator(Arc::clone(&mock));
        let request = QueryRequest::new(QueryMode::by_keys(["A1", "BAD", "A2"]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = orch.run(&request, reference(), Some(&tx)).await;
        let failures = outcome.failures().to_vec();
        assert_eq!(outcome.records().unwrap().masters.len(), 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].key, "BAD");
        assert!(failures[0].reason.contains("simulated failure"));
        assert_eq!(mock.master_calls(), 3);

        drop(tx);
        let mut progress = Vec::new();
        while let Some(event) = rx.recv().await {
            if let QueryEvent::KeyProgress { done, total, .. } = event {
                progress.push((done, total));
            }
        }
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_empty_key_list_is_empty_success() {
        let mock = Arc::new(catalog());
        let orch = orchestrator(Arc::clone(&mock));
        let request = QueryRequest::new(QueryMode::by_keys(Vec::<String>::new()));
        let outcome = orch.run(&request, reference(), None).await;
        assert_eq!(outcome, QueryOutcome::Completed(FetchedRecords::default()));
        assert_eq!(mock.master_calls(), 0);
    }

    #[tokio::test]
    async fn test_name_keyword_pages_through_results() {
        let mock = Arc::new(catalog().with_page_size(1));
        let orch = orchestrator(Arc::clone(&mock));
        let request = QueryRequest::new(QueryMode::ByNameKeyword {
            keyword: "alpha".to_string(),
        });
        let outcome = orch.run(&request, reference(), None).await;
        let records = outcome.records().unwrap();
        assert_eq!(records.masters.len(), 2);
        assert_eq!(records.channels.len(), 2);
        assert_eq!(mock.master_calls(), 2);
    }

    #[tokio::test]
    async fn test_by_channel_status_selects_matching_keys() {
        let mock = Arc::new(catalog());
        let orch = orchestrator(Arc::clone(&mock));
        let request = QueryRequest::new(QueryMode::ByChannelStatus {
            channels: vec!["AG".to_string(), "BR".to_string()],
            statuses: vec![SaleStatus::Current],
        });
        let outcome = orch.run(&request, reference(), None).await;
        let records = outcome.records().unwrap();
        let mut keys: Vec<&str> = records.masters.iter().map(|m| m.key.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["A1", "A2"]);
    }

    #[tokio::test]
    async fn test_channel_outage_keeps_masters_as_partial() {
        let mock = Arc::new(catalog().with_channel_outage());
        let orch = orchestrator(Arc::clone(&mock));
        let request = QueryRequest::new(QueryMode::by_keys(["A1", "A2"]));

        let outcome = orch.run(&request, reference(), None).await;
        match outcome {
            QueryOutcome::Partial { records, failures } => {
                assert_eq!(records.masters.len(), 2);
                assert!(records.channels.is_empty());
                let keys: Vec<&str> = failures.iter().map(|f| f.key.as_str()).collect();
                assert_eq!(keys, vec!["A1", "A2"]);
                assert!(failures
                    .iter()
                    .all(|f| f.scope == FailureScope::Key && f.reason.contains("channel lookup failed")));
            }
            other => panic!("expected partial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_channel_outage_does_not_duplicate_missing_key() {
        let mock = Arc::new(catalog().with_channel_outage().with_failing_key("BAD"));
        let orch = orchestrator(Arc::clone(&mock));
        let request = QueryRequest::new(QueryMode::by_keys(["A1", "BAD"]));

        let outcome = orch.run(&request, reference(), None).await;
        let failures = outcome.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0], KeyFailure::new("BAD", "not found"));
        assert_eq!(failures[1].key, "A1");
    }

    #[tokio::test]
    async fn test_failed_channel_is_reported_and_others_kept() {
        let mock = Arc::new(catalog().with_failing_channel("BR"));
        let orch = orchestrator(Arc::clone(&mock));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = QueryRequest::new(QueryMode::ByChannelStatus {
            channels: vec!["AG".to_string(), "BR".to_string()],
            statuses: vec![SaleStatus::Current],
        });

        let outcome = orch.run(&request, reference(), Some(&tx)).await;
        match outcome {
            QueryOutcome::Partial { records, failures } => {
                let mut keys: Vec<&str> = records.masters.iter().map(|m| m.key.as_str()).collect();
                keys.sort();
                assert_eq!(keys, vec!["A1", "A2"]);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].key, "BR");
                assert_eq!(failures[0].scope, FailureScope::Channel);
            }
            other => panic!("expected partial, got {:?}", other),
        }

        drop(tx);
        let mut failed = Vec::new();
        while let Some(event) = rx.recv().await {
            if let QueryEvent::KeyFailed(failure) = event {
                failed.push(failure.key);
            }
        }
        assert_eq!(failed, vec!["BR".to_string()]);
    }

    #[tokio::test]
    async fn test_channel_ids_are_canonicalized() {
        let mock = Arc::new(catalog());
        let orch = orchestrator(Arc::clone(&mock));
        let request = QueryRequest::new(QueryMode::ByChannelStatus {
            channels: vec![" ba".to_string(), "BK".to_string(), "ag".to_string()],
            statuses: vec![SaleStatus::Current],
        });

        orch.run(&request, reference(), None).await;
        let mut requested = mock.requested_channels();
        requested.sort();
        assert_eq!(requested, vec!["AG".to_string(), "BK".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_total_pages_reads_until_empty_page() {
        let mock = Arc::new(catalog().with_hidden_total_pages().with_page_size(1));
        let orch = orchestrator(Arc::clone(&mock));
        let request = QueryRequest::new(QueryMode::ByNameKeyword {
            keyword: "alpha".to_string(),
        });

        let outcome = orch.run(&request, reference(), None).await;
        assert_eq!(outcome.records().unwrap().masters.len(), 2);
        // 两页资料加一个空页
        assert_eq!(mock.master_calls(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_completion() {
        let mock = Arc::new(catalog().with_delay(Duration::from_millis(200)));
        let orch = orchestrator(Arc::clone(&mock));
        let request = QueryRequest::new(QueryMode::by_keys(["A1"]));
        let cancel = request.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let outcome = orch.run(&request, reference(), None).await;
        assert_eq!(outcome, QueryOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_unauthorized_surfaces_auth_expired() {
        let mock = Arc::new(catalog().with_valid_token("other"));
        let credentials = Arc::new(CredentialStore::with_token("tok"));
        let orch = QueryOrchestrator::new(
            mock,
            Arc::clone(&credentials),
            Duration::from_secs(5),
            50,
        );
        let request = QueryRequest::new(QueryMode::by_keys(["A1"]));
        assert_eq!(orch.run(&request, reference(), None).await, QueryOutcome::AuthExpired);
        assert!(!credentials.is_present());

        // 凭证已清除：不再发出请求
        let again = QueryRequest::new(QueryMode::by_keys(["A1"]));
        assert_eq!(orch.run(&again, reference(), None).await, QueryOutcome::AuthExpired);
    }

    #[tokio::test]
    async fn test_timeout_is_failed_timeout() {
        let mock = Arc::new(catalog().with_delay(Duration::from_millis(1500)));
        let orch = QueryOrchestrator::new(
            mock,
            Arc::new(CredentialStore::with_token("tok")),
            Duration::from_secs(1),
            50,
        );
        let request = QueryRequest::new(QueryMode::ByMasterStatus {
            statuses: vec![SaleStatus::Current],
        });
        let outcome = orch.run(&request, reference(), None).await;
        assert_eq!(outcome, QueryOutcome::Failed(QueryError::Timeout { secs: 1 }));
    }
}
