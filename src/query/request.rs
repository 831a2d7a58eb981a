//! 查询请求：查询模式（带各自参数的标签联合）与取消令牌

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::{normalize_key, SaleStatus, ReconciledItem};
use crate::catalog::codes::canonical_channel;

/// 查询模式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryMode {
    /// 指定 key 清单
    ByKey { keys: Vec<String> },
    /// 名称关键字
    ByNameKeyword { keyword: String },
    /// 主档状态属于 statuses 者
    ByMasterStatus { statuses: Vec<SaleStatus> },
    /// 在 channels（空 = 全部通路）中至少一个通路状态属于 statuses 者
    ByChannelStatus {
        channels: Vec<String>,
        statuses: Vec<SaleStatus>,
    },
}

impl QueryMode {
    /// key 清单：去空白、转大写、去重且保留原顺序
    pub fn by_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::HashSet::new();
        let keys = keys
            .into_iter()
            .map(|k| normalize_key(k.as_ref()))
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .collect();
        Self::ByKey { keys }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ByKey { .. } => "by_key",
            Self::ByNameKeyword { .. } => "by_name",
            Self::ByMasterStatus { .. } => "by_master_status",
            Self::ByChannelStatus { .. } => "by_channel_status",
        }
    }

    /// 对账后是否保留该项（状态类查询在判定后才能筛选）
    pub fn retains(&self, item: &ReconciledItem) -> bool {
        match self {
            Self::ByKey { .. } | Self::ByNameKeyword { .. } => true,
            Self::ByMasterStatus { statuses } => statuses.contains(&item.master.status),
            Self::ByChannelStatus { channels, statuses } => {
                let wanted: Vec<String> = channels.iter().map(|c| canonical_channel(c)).collect();
                item.channels.iter().any(|c| {
                    (wanted.is_empty() || wanted.contains(&c.channel)) && statuses.contains(&c.status)
                })
            }
        }
    }
}

/// 一次查询请求；同一会话同时只有一个在途
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub id: Uuid,
    pub mode: QueryMode,
    pub cancel: CancellationToken,
}

impl QueryRequest {
    pub fn new(mode: QueryMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
