//! 检视层：对账结果的搜寻 / 排序 / 异常筛选 / 分页
//!
//! 资料以原始顺序保存在 items，visible 只存索引（资料空间 -> 检视空间）。
//! 任何控制项变动都从完整资料重新计算：filter -> sort -> paginate。
//!
//! 不变式：
//! - 排序是稳定的；降冪以反向比较实现，同值项维持原相对顺序
//! - page_index 永远落在 [0, page_count - 1]
//! - 变更筛选条件或每页笔数会回到第一页

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::catalog::{ReconciledItem, SaleStatus};
use crate::query::KeyFailure;

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// 排序栏位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortKey {
    Key,
    Name,
    SaleStart,
    SaleEnd,
    Status,
    /// 依异常原因数量
    Anomalies,
}

impl SortKey {
    fn compare(&self, a: &ReconciledItem, b: &ReconciledItem) -> Ordering {
        match self {
            Self::Key => a.key().cmp(b.key()),
            Self::Name => a
                .master
                .name
                .to_lowercase()
                .cmp(&b.master.name.to_lowercase()),
            // None 排在有日期者之前
            Self::SaleStart => a.master.sale_start.cmp(&b.master.sale_start),
            Self::SaleEnd => a.master.sale_end.cmp(&b.master.sale_end),
            Self::Status => a.master.status.cmp(&b.master.status),
            Self::Anomalies => a.special_reasons.len().cmp(&b.special_reasons.len()),
        }
    }
}

/// 可变的检视状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub search_keyword: String,
    pub sort_key: Option<SortKey>,
    pub sort_ascending: bool,
    pub anomaly_only: bool,
    pub page_index: usize,
    pub page_size: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            search_keyword: String::new(),
            sort_key: None,
            sort_ascending: true,
            anomaly_only: false,
            page_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// 筛选后各主档状态的笔数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub current: usize,
    pub stopped: usize,
    pub abnormal: usize,
    /// 有异常原因者
    pub anomalies: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ViewModel {
    items: Vec<ReconciledItem>,
    failures: Vec<KeyFailure>,
    state: ViewState,
    /// 筛选并排序后的 items 索引
    visible: Vec<usize>,
}

impl ViewModel {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: ViewState {
                page_size: page_size.max(1),
                ..ViewState::default()
            },
            ..Self::default()
        }
    }

    /// 装入新查询的结果；保留搜寻 / 排序 / 筛选设定，回到第一页
    pub fn set_items(&mut self, items: Vec<ReconciledItem>, failures: Vec<KeyFailure>) {
        self.items = items;
        self.failures = failures;
        self.state.page_index = 0;
        self.recompute();
    }

    /// 重试合并后整批换新：保留搜寻、排序与当前页（页码夹在范围内）
    pub fn replace_items(&mut self, items: Vec<ReconciledItem>, failures: Vec<KeyFailure>) {
        self.items = items;
        self.failures = failures;
        self.recompute();
    }

    pub fn set_search(&mut self, keyword: &str) {
        self.state.search_keyword = keyword.trim().to_string();
        self.state.page_index = 0;
        self.recompute();
    }

    /// 同一栏位再点一次切换升降冪，换栏位则从升冪开始
    pub fn set_sort(&mut self, key: SortKey) {
        if self.state.sort_key == Some(key) {
            self.state.sort_ascending = !self.state.sort_ascending;
        } else {
            self.state.sort_key = Some(key);
            self.state.sort_ascending = true;
        }
        self.recompute();
    }

    pub fn set_anomaly_only(&mut self, anomaly_only: bool) {
        self.state.anomaly_only = anomaly_only;
        self.state.page_index = 0;
        self.recompute();
    }

    /// 超出范围的页码夹回最后一页
    pub fn set_page(&mut self, page_index: usize) {
        self.state.page_index = page_index.min(self.page_count() - 1);
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.state.page_size = page_size.max(1);
        self.state.page_index = 0;
    }

    /// 写入延迟载入的明细；返回是否找到该 key
    pub fn set_detail(&mut self, key: &str, detail: &str) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.key() == key) else {
            return false;
        };
        item.master.detail = Some(detail.to_string());
        // 明细也是搜寻栏位
        if !self.state.search_keyword.is_empty() {
            self.recompute();
        }
        true
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn items(&self) -> &[ReconciledItem] {
        &self.items
    }

    pub fn failures(&self) -> &[KeyFailure] {
        &self.failures
    }

    /// 筛选后的总笔数
    pub fn total_count(&self) -> usize {
        self.visible.len()
    }

    /// 至少一页（空结果也有第 0 页）
    pub fn page_count(&self) -> usize {
        self.visible.len().div_ceil(self.state.page_size).max(1)
    }

    pub fn visible_page(&self) -> Vec<&ReconciledItem> {
        let start = self.state.page_index * self.state.page_size;
        self.visible
            .iter()
            .skip(start)
            .take(self.state.page_size)
            .map(|&i| &self.items[i])
            .collect()
    }

    /// 筛选且排序后的完整集合（不分页），供汇出
    pub fn filtered(&self) -> impl Iterator<Item = &ReconciledItem> + '_ {
        self.visible.iter().map(|&i| &self.items[i])
    }

    pub fn status_summary(&self) -> StatusSummary {
        let mut seen = HashSet::new();
        let mut counts: BTreeMap<SaleStatus, usize> = BTreeMap::new();
        let mut summary = StatusSummary::default();
        for item in self.filtered().filter(|i| seen.insert(i.master.key.clone())) {
            *counts.entry(item.master.status).or_default() += 1;
            if item.has_anomaly() {
                summary.anomalies += 1;
            }
            summary.total += 1;
        }
        summary.pending = counts.get(&SaleStatus::Pending).copied().unwrap_or(0);
        summary.current = counts.get(&SaleStatus::Current).copied().unwrap_or(0);
        summary.stopped = counts.get(&SaleStatus::Stopped).copied().unwrap_or(0);
        summary.abnormal = counts.get(&SaleStatus::Abnormal).copied().unwrap_or(0);
        summary
    }

    fn matches(&self, item: &ReconciledItem) -> bool {
        if self.state.anomaly_only && !item.has_anomaly() {
            return false;
        }
        if self.state.search_keyword.is_empty() {
            return true;
        }
        let keyword = self.state.search_keyword.to_lowercase();
        [
            Some(item.master.key.as_str()),
            Some(item.master.name.as_str()),
            item.master.detail.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&keyword))
    }

    fn recompute(&mut self) {
        let mut visible: Vec<usize> = (0..self.items.len())
            .filter(|&i| self.matches(&self.items[i]))
            .collect();

        if let Some(key) = self.state.sort_key {
            let ascending = self.state.sort_ascending;
            let items = &self.items;
            visible.sort_by(|&a, &b| {
                let ord = key.compare(&items[a], &items[b]);
                if ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }

        self.visible = visible;
        self.state.page_index = self.state.page_index.min(self.page_count() - 1);
    }
}
