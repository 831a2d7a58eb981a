//! 远端目录服务抽象
//!
//! 所有后端（HTTP / Mock）实现 CatalogService：主档分页查询、通路查询、明细查询与凭证验证。
//! 每次调用都带入当前凭证；凭证被拒时必须返回 RemoteError::Unauthorized。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::{RawChannelRow, RawMasterRow};
use crate::core::RemoteError;

/// 主档查询条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterFilter {
    /// 精确 key 清单
    Keys(Vec<String>),
    /// 名称关键字
    NameKeyword(String),
    /// 不过滤（全部，分页）
    All,
}

/// 通路查询条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFilter {
    Keys(Vec<String>),
    Channel(String),
    All,
}

/// 主档分页结果；page 从 1 起算
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterPage {
    #[serde(default)]
    pub rows: Vec<RawMasterRow>,
    #[serde(default)]
    pub page: u32,
    #[serde(default, alias = "totalPages")]
    pub total_pages: u32,
}

/// 目录服务 trait
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// 端点是否支持一次带入整份 key 清单；不支持时改为逐 key 查询
    fn supports_batch_lookup(&self) -> bool {
        true
    }

    async fn fetch_master_page(
        &self,
        token: &str,
        filter: &MasterFilter,
        page: u32,
    ) -> Result<MasterPage, RemoteError>;

    async fn fetch_channel_records(
        &self,
        token: &str,
        filter: &ChannelFilter,
    ) -> Result<Vec<RawChannelRow>, RemoteError>;

    /// 成本较高的明细查询，只对画面上的 key 调用
    async fn fetch_detail(&self, token: &str, key: &str) -> Result<String, RemoteError>;

    /// 轻量探测凭证是否有效
    async fn verify_credential(&self, token: &str) -> Result<bool, RemoteError>;
}
