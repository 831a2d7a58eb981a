//! 明细快取：按 key 记忆昂贵的明细查询结果
//!
//! get 只查表，不会触发远端请求（未命中时由 DetailLoader 负责补抓）。
//! 值以 Arc 共享：读者拿到的是不可变快照，之后的 put 只替换快取里的指标。
//! clear 在单一临界区内清空全部条目，并推进 epoch，清空前发出的请求无法再写回。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

/// 快取条目
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: Arc<V>,
    pub loaded_at: DateTime<Utc>,
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
            loaded_at: self.loaded_at,
        }
    }
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    epoch: u64,
}

/// 会话内的明细快取；不自动过期，只在 clear 时失效
#[derive(Debug)]
pub struct RecordCache<V> {
    inner: RwLock<CacheInner<V>>,
}

impl<V> Default for RecordCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RecordCache<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                epoch: 0,
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.entry(key).map(|e| e.value)
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(key)
            .cloned()
    }

    /// 写入；同一 key 后写者胜
    pub fn put(&self, key: &str, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.insert(key.to_string(), Self::make_entry(key, Arc::clone(&value)));
        value
    }

    /// 仅在 epoch 未变（期间没有 clear）时写入；返回是否写入
    pub fn put_if_epoch(&self, key: &str, value: Arc<V>, epoch: u64) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.epoch != epoch {
            return false;
        }
        inner.entries.insert(key.to_string(), Self::make_entry(key, value));
        true
    }

    pub fn epoch(&self) -> u64 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).epoch
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.epoch += 1;
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn make_entry(key: &str, value: Arc<V>) -> CacheEntry<V> {
        CacheEntry {
            key: key.to_string(),
            value,
            loaded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_clear() {
        let cache: RecordCache<String> = RecordCache::new();
        assert!(cache.get("P1").is_none());
        cache.put("P1", "Plan One".to_string());
        assert_eq!(cache.get("P1").as_deref().map(String::as_str), Some("Plan One"));
        assert_eq!(cache.entry("P1").unwrap().key, "P1");
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("P1").is_none());
    }

    #[test]
    fn test_reader_snapshot_survives_overwrite() {
        let cache: RecordCache<String> = RecordCache::new();
        cache.put("P1", "first".to_string());
        let held = cache.get("P1").unwrap();
        cache.put("P1", "second".to_string());
        assert_eq!(held.as_str(), "first");
        assert_eq!(cache.get("P1").unwrap().as_str(), "second");
    }

    #[test]
    fn test_put_after_clear_is_rejected_for_old_epoch() {
        let cache: RecordCache<String> = RecordCache::new();
        let epoch = cache.epoch();
        cache.clear();
        assert!(!cache.put_if_epoch("P1", Arc::new("stale".to_string()), epoch));
        assert!(cache.get("P1").is_none());
        assert!(cache.put_if_epoch("P1", Arc::new("fresh".to_string()), cache.epoch()));
        assert_eq!(cache.len(), 1);
    }
}
