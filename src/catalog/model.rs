//! 资料模型：远端原始资料列、判定后的主档 / 通路记录、对账结果

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::classify::{classify, parse_date, SaleStatus};
use crate::catalog::codes::{canonical_channel, decode_attribute};

/// 主档查询返回的原始资料列（同时接受 snake_case 与 camelCase 两种 REST 形态）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMasterRow {
    #[serde(default, alias = "code", alias = "productCode")]
    pub key: String,
    #[serde(default, alias = "productName")]
    pub name: String,
    /// 列举栏位代码，如 currency / unit / coverage_type
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, alias = "saleStart", alias = "startDate")]
    pub sale_start: Option<String>,
    #[serde(default, alias = "saleEnd", alias = "endDate")]
    pub sale_end: Option<String>,
}

impl RawMasterRow {
    pub fn new(key: &str, name: &str, sale_start: &str, sale_end: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            attributes: BTreeMap::new(),
            sale_start: Some(sale_start.to_string()),
            sale_end: Some(sale_end.to_string()),
        }
    }

    pub fn with_attribute(mut self, field: &str, code: &str) -> Self {
        self.attributes.insert(field.to_string(), code.to_string());
        self
    }
}

/// 通路查询返回的原始资料列
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChannelRow {
    #[serde(default, alias = "code", alias = "productCode")]
    pub key: String,
    #[serde(default, alias = "channelId", alias = "channelCode")]
    pub channel: String,
    #[serde(default, alias = "saleStart", alias = "startDate")]
    pub sale_start: Option<String>,
    #[serde(default, alias = "saleEnd", alias = "endDate")]
    pub sale_end: Option<String>,
}

impl RawChannelRow {
    pub fn new(key: &str, channel: &str, sale_start: &str, sale_end: &str) -> Self {
        Self {
            key: key.to_string(),
            channel: channel.to_string(),
            sale_start: Some(sale_start.to_string()),
            sale_end: Some(sale_end.to_string()),
        }
    }
}

/// 主档 key 正规化（去空白、转大写）
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// 已判定状态的主档记录；除 detail 外判定后不再变动
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterRecord {
    pub key: String,
    pub name: String,
    /// 解码后的显示值
    pub attributes: BTreeMap<String, String>,
    pub sale_start: Option<NaiveDate>,
    pub sale_end: Option<NaiveDate>,
    pub status: SaleStatus,
    /// 延迟载入的明细（如正式显示名称）
    pub detail: Option<String>,
}

impl MasterRecord {
    pub fn from_raw(raw: &RawMasterRow, reference: NaiveDate) -> Self {
        let sale_start = raw.sale_start.as_deref().and_then(parse_date);
        let sale_end = raw.sale_end.as_deref().and_then(parse_date);
        Self {
            key: normalize_key(&raw.key),
            name: raw.name.trim().to_string(),
            attributes: raw
                .attributes
                .iter()
                .map(|(field, code)| (field.clone(), decode_attribute(field, code)))
                .collect(),
            sale_start,
            sale_end,
            status: classify(reference, sale_start, sale_end),
            detail: None,
        }
    }

    pub fn attribute(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).map(String::as_str)
    }
}

/// 已判定状态的通路记录；channel 为正式代码
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRecord {
    pub key: String,
    pub channel: String,
    pub sale_start: Option<NaiveDate>,
    pub sale_end: Option<NaiveDate>,
    pub status: SaleStatus,
}

impl ChannelRecord {
    pub fn from_raw(raw: &RawChannelRow, reference: NaiveDate) -> Self {
        let sale_start = raw.sale_start.as_deref().and_then(parse_date);
        let sale_end = raw.sale_end.as_deref().and_then(parse_date);
        Self {
            key: normalize_key(&raw.key),
            channel: canonical_channel(&raw.channel),
            sale_start,
            sale_end,
            status: classify(reference, sale_start, sale_end),
        }
    }

    pub fn is_current(&self) -> bool {
        self.status == SaleStatus::Current
    }
}

/// 一个主档 key 的对账结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledItem {
    pub master: MasterRecord,
    /// 销售中在前、其余在后，各组内按通路代码字典序
    pub channels: Vec<ChannelRecord>,
    /// 异常原因；空表示无异常
    pub special_reasons: Vec<String>,
}

impl ReconciledItem {
    pub fn key(&self) -> &str {
        &self.master.key
    }

    pub fn has_anomaly(&self) -> bool {
        !self.special_reasons.is_empty()
    }
}
