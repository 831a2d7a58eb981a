//! Mock 目录服务（用于测试与本地演示，无需远端）
//!
//! 以内存资料回应查询；可注入逐 key 失败、401 与人为延迟，并记录各操作的调用次数。
//! 批次模式下失败的 key 不出现在响应中；逐 key 模式下对该 key 返回 Network 错误。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::{normalize_key, RawChannelRow, RawMasterRow};
use crate::catalog::codes::canonical_channel;
use crate::core::RemoteError;
use crate::remote::{CatalogService, ChannelFilter, MasterFilter, MasterPage};

/// Mock 服务
#[derive(Debug)]
pub struct MockCatalogService {
    masters: RwLock<Vec<RawMasterRow>>,
    channels: RwLock<Vec<RawChannelRow>>,
    details: RwLock<HashMap<String, String>>,
    failing_keys: RwLock<HashSet<String>>,
    /// 按通路查询时失败的通路代码
    failing_channels: RwLock<HashSet<String>>,
    /// 所有通路查询都失败
    channel_outage: AtomicBool,
    /// 不回报总页数（total_pages = 0）
    hide_total_pages: bool,
    requested_channels: Mutex<Vec<String>>,
    /// None 表示任何非空凭证都有效
    valid_token: RwLock<Option<String>>,
    batch: bool,
    page_size: usize,
    delay_ms: AtomicU64,
    master_calls: AtomicUsize,
    channel_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    detail_calls: Mutex<HashMap<String, usize>>,
}

impl Default for MockCatalogService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCatalogService {
    pub fn new() -> Self {
        Self {
            masters: RwLock::new(Vec::new()),
            channels: RwLock::new(Vec::new()),
            details: RwLock::new(HashMap::new()),
            failing_keys: RwLock::new(HashSet::new()),
            failing_channels: RwLock::new(HashSet::new()),
            channel_outage: AtomicBool::new(false),
            hide_total_pages: false,
            requested_channels: Mutex::new(Vec::new()),
            valid_token: RwLock::new(None),
            batch: true,
            page_size: 100,
            delay_ms: AtomicU64::new(0),
            master_calls: AtomicUsize::new(0),
            channel_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            detail_calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_masters(self, rows: Vec<RawMasterRow>) -> Self {
        self.set_masters(rows);
        self
    }

    pub fn with_channels(self, rows: Vec<RawChannelRow>) -> Self {
        *self.channels.write().unwrap_or_else(PoisonError::into_inner) = rows;
        self
    }

    pub fn with_detail(self, key: &str, value: &str) -> Self {
        self.details
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_key(key), value.to_string());
        self
    }

    pub fn with_failing_key(self, key: &str) -> Self {
        self.failing_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_key(key));
        self
    }

    pub fn with_failing_channel(self, channel: &str) -> Self {
        self.failing_channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(canonical_channel(channel));
        self
    }

    pub fn with_channel_outage(self) -> Self {
        self.set_channel_outage(true);
        self
    }

    pub fn set_channel_outage(&self, outage: bool) {
        self.channel_outage.store(outage, Ordering::SeqCst);
    }

    /// 模拟不回报 totalPages 的端点
    pub fn with_hidden_total_pages(mut self) -> Self {
        self.hide_total_pages = true;
        self
    }

    pub fn with_valid_token(self, token: &str) -> Self {
        *self.valid_token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        self
    }

    /// false 时模拟不支持 key 清单的端点
    pub fn with_batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_masters(&self, rows: Vec<RawMasterRow>) {
        *self.masters.write().unwrap_or_else(PoisonError::into_inner) = rows;
    }

    /// 使现有凭证失效：之后所有调用返回 401
    pub fn revoke_tokens(&self) {
        *self.valid_token.write().unwrap_or_else(PoisonError::into_inner) =
            Some(String::from("\u{0}revoked"));
    }

    pub fn master_calls(&self) -> usize {
        self.master_calls.load(Ordering::SeqCst)
    }

    pub fn channel_calls(&self) -> usize {
        self.channel_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self, key: &str) -> usize {
        self.detail_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_key(key))
            .copied()
            .unwrap_or(0)
    }

    /// 按通路查询时实际送出的通路代码
    pub fn requested_channels(&self) -> Vec<String> {
        self.requested_channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_token(&self, token: &str) -> Result<(), RemoteError> {
        if token.is_empty() {
            return Err(RemoteError::Unauthorized);
        }
        match self
            .valid_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
        {
            Some(valid) if valid != token => Err(RemoteError::Unauthorized),
            _ => Ok(()),
        }
    }

    fn is_failing(&self, key: &str) -> bool {
        self.failing_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&normalize_key(key))
    }

    async fn simulate_latency(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl CatalogService for MockCatalogService {
    fn supports_batch_lookup(&self) -> bool {
        self.batch
    }

    async fn fetch_master_page(
        &self,
        token: &str,
        filter: &MasterFilter,
        page: u32,
    ) -> Result<MasterPage, RemoteError> {
        self.master_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_token(token)?;

        let rows: Vec<RawMasterRow> = {
            let masters = self.masters.read().unwrap_or_else(PoisonError::into_inner);
            match filter {
                MasterFilter::Keys(keys) => {
                    if !self.batch && keys.len() == 1 && self.is_failing(&keys[0]) {
                        return Err(RemoteError::Network(format!(
                            "simulated failure for {}",
                            keys[0]
                        )));
                    }
                    let wanted: HashSet<String> = keys.iter().map(|k| normalize_key(k)).collect();
                    masters
                        .iter()
                        .filter(|m| {
                            let key = normalize_key(&m.key);
                            wanted.contains(&key) && !self.is_failing(&key)
                        })
                        .cloned()
                        .collect()
                }
                MasterFilter::NameKeyword(keyword) => {
                    let keyword = keyword.to_lowercase();
                    masters
                        .iter()
                        .filter(|m| m.name.to_lowercase().contains(&keyword))
                        .cloned()
                        .collect()
                }
                MasterFilter::All => masters.clone(),
            }
        };

        let total_pages = if self.hide_total_pages {
            0
        } else {
            rows.len().div_ceil(self.page_size) as u32
        };
        let start = (page.max(1) as usize - 1) * self.page_size;
        let rows = rows.into_iter().skip(start).take(self.page_size).collect();
        Ok(MasterPage {
            rows,
            page,
            total_pages,
        })
    }

    async fn fetch_channel_records(
        &self,
        token: &str,
        filter: &ChannelFilter,
    ) -> Result<Vec<RawChannelRow>, RemoteError> {
        self.channel_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_token(token)?;

        if self.channel_outage.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("channel service unavailable".to_string()));
        }
        if let ChannelFilter::Channel(channel) = filter {
            self.requested_channels
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(channel.clone());
            if self
                .failing_channels
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&canonical_channel(channel))
            {
                return Err(RemoteError::Network(format!(
                    "simulated failure for channel {}",
                    channel
                )));
            }
        }

        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let rows = match filter {
            ChannelFilter::Keys(keys) => {
                let wanted: HashSet<String> = keys.iter().map(|k| normalize_key(k)).collect();
                channels
                    .iter()
                    .filter(|c| wanted.contains(&normalize_key(&c.key)))
                    .cloned()
                    .collect()
            }
            ChannelFilter::Channel(channel) => {
                let channel = canonical_channel(channel);
                channels
                    .iter()
                    .filter(|c| canonical_channel(&c.channel) == channel)
                    .cloned()
                    .collect()
            }
            ChannelFilter::All => channels.clone(),
        };
        Ok(rows)
    }

    async fn fetch_detail(&self, token: &str, key: &str) -> Result<String, RemoteError> {
        let key = normalize_key(key);
        *self
            .detail_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_insert(0) += 1;
        self.simulate_latency().await;
        self.check_token(token)?;

        if self.is_failing(&key) {
            return Err(RemoteError::Network(format!("simulated failure for {}", key)));
        }
        self.details
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or_else(|| RemoteError::Http {
                status: 404,
                body: format!("no detail for {}", key),
            })
    }

    async fn verify_credential(&self, token: &str) -> Result<bool, RemoteError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self.check_token(token).is_ok())
    }
}
