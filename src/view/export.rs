//! 复制 / 汇出：以 tab 分隔的文字快照
//!
//! 栏位顺序与通路呈现方式和表格一致。

use chrono::NaiveDate;

use crate::catalog::codes::{ATTR_COVERAGE_TYPE, ATTR_CURRENCY, ATTR_UNIT};
use crate::catalog::{ChannelRecord, ReconciledItem};

pub const COLUMNS: &[&str] = &[
    "Key",
    "Name",
    "Currency",
    "Unit",
    "Coverage",
    "Sale Start",
    "Sale End",
    "Status",
    "Channels",
    "Special Reasons",
];

/// 如 `AG(Current), BR(Stopped)`，依对账后的顺序
pub fn render_channels(channels: &[ChannelRecord]) -> String {
    channels
        .iter()
        .map(|c| format!("{}({})", c.channel, c.status))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// 栏位内的 tab 与换行会破坏表格，换成空白
fn sanitize(field: &str) -> String {
    field
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

pub fn render_row(item: &ReconciledItem) -> String {
    let master = &item.master;
    let fields = [
        master.key.clone(),
        master.name.clone(),
        master.attribute(ATTR_CURRENCY).unwrap_or_default().to_string(),
        master.attribute(ATTR_UNIT).unwrap_or_default().to_string(),
        master.attribute(ATTR_COVERAGE_TYPE).unwrap_or_default().to_string(),
        render_date(master.sale_start),
        render_date(master.sale_end),
        master.status.to_string(),
        render_channels(&item.channels),
        item.special_reasons.join("; "),
    ];
    fields
        .iter()
        .map(|f| sanitize(f))
        .collect::<Vec<_>>()
        .join("\t")
}

/// 第一行为栏位标题
pub fn render_tsv<'a>(items: impl IntoIterator<Item = &'a ReconciledItem>) -> String {
    let mut out = COLUMNS.join("\t");
    for item in items {
        out.push('\n');
        out.push_str(&render_row(item));
    }
    out
}
