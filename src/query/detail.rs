//! 明细补全：快取优先、同 key 请求去重、并发受限
//!
//! 快取未命中时，同一 key 只会有一个在途请求；其余呼叫者共用同一个 Shared future。
//! 实际抓取在独立 task 中进行，呼叫者取消等待不影响结果写回快取。
//! 抓取完成后先写快取、再从在途表移除（两者都在在途表锁内可见），
//! 因此后来的呼叫者不是命中快取就是加入在途请求，不会重复抓取。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::catalog::normalize_key;
use crate::core::{QueryError, RemoteError, TaskScheduler};
use crate::query::RecordCache;
use crate::remote::{CatalogService, CredentialStore};

type DetailFuture = Shared<BoxFuture<'static, Result<Arc<String>, QueryError>>>;

/// 在途表：key -> (抓取序号, 共享 future)
type InFlight = Arc<Mutex<HashMap<String, (u64, DetailFuture)>>>;

pub struct DetailLoader {
    service: Arc<dyn CatalogService>,
    credentials: Arc<CredentialStore>,
    cache: Arc<RecordCache<String>>,
    scheduler: TaskScheduler,
    timeout: Duration,
    in_flight: InFlight,
    next_fetch_id: AtomicU64,
    /// Drop 时取消，背景抓取不会比 loader 活得久
    lifetime: CancellationToken,
}

impl DetailLoader {
    pub fn new(
        service: Arc<dyn CatalogService>,
        credentials: Arc<CredentialStore>,
        scheduler: TaskScheduler,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            credentials,
            cache: Arc::new(RecordCache::new()),
            scheduler,
            timeout,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_fetch_id: AtomicU64::new(0),
            lifetime: CancellationToken::new(),
        }
    }

    pub fn cache(&self) -> &RecordCache<String> {
        &self.cache
    }

    /// 取得明细：快取命中直接返回，否则加入或发起该 key 的唯一在途请求
    pub async fn load(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<String>, QueryError> {
        let key = normalize_key(key);
        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }

        let fut = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(value) = self.cache.get(&key) {
                return Ok(value);
            }
            match in_flight.get(&key) {
                Some((_, fut)) => fut.clone(),
                None => {
                    let fetch_id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                    let fut = self.spawn_fetch(key.clone(), fetch_id);
                    in_flight.insert(key.clone(), (fetch_id, fut.clone()));
                    fut
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(QueryError::Cancelled),
            result = fut => result,
        }
    }

    /// 清空快取与在途表；之前发出的抓取结果不会写回
    pub async fn reset(&self) {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.clear();
        self.cache.clear();
    }

    fn spawn_fetch(&self, key: String, fetch_id: u64) -> DetailFuture {
        let service = Arc::clone(&self.service);
        let credentials = Arc::clone(&self.credentials);
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let scheduler = self.scheduler.clone();
        let lifetime = self.lifetime.clone();
        let timeout = self.timeout;
        let epoch = cache.epoch();

        let handle = tokio::spawn(async move {
            let result = fetch_detail(
                service.as_ref(),
                &credentials,
                &scheduler,
                &lifetime,
                timeout,
                &key,
            )
            .await;

            let mut in_flight = in_flight.lock().await;
            if let Ok(value) = &result {
                if !cache.put_if_epoch(&key, Arc::clone(value), epoch) {
                    tracing::debug!("detail for {} discarded: cache was reset", key);
                }
            }
            if in_flight.get(&key).is_some_and(|(id, _)| *id == fetch_id) {
                in_flight.remove(&key);
            }
            result
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(QueryError::Network(format!("detail task failed: {e}"))))
        }
        .boxed()
        .shared()
    }
}

impl Drop for DetailLoader {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

async fn fetch_detail(
    service: &dyn CatalogService,
    credentials: &CredentialStore,
    scheduler: &TaskScheduler,
    lifetime: &CancellationToken,
    timeout: Duration,
    key: &str,
) -> Result<Arc<String>, QueryError> {
    let _permit = scheduler.acquire(lifetime).await?;
    let token = credentials.get().ok_or(QueryError::AuthExpired)?;
    let secs = timeout.as_secs();

    tracing::debug!("fetching detail for {}", key);
    let result = tokio::select! {
        _ = lifetime.cancelled() => return Err(QueryError::Cancelled),
        r = tokio::time::timeout(timeout, service.fetch_detail(&token, key)) => r,
    };
    match result {
        Err(_) => Err(QueryError::Timeout { secs }),
        Ok(Err(RemoteError::Unauthorized)) => {
            credentials.invalidate();
            Err(QueryError::AuthExpired)
        }
        Ok(Err(e)) => Err(QueryError::from_remote(e, secs)),
        Ok(Ok(value)) => Ok(Arc::new(value)),
    }
}
