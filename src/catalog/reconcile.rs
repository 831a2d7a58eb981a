//! 对账：主档与通路资料按 key 合并、判定状态、标记异常
//!
//! 通路资料先按 key 分组成查找表，再逐一对应主档，避免巢状线性扫描。
//! 对坏资料不报错：无法判定的日期降级为 Abnormal，相关规则略过。

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::catalog::classify::{is_open_ended, SaleStatus};
use crate::catalog::model::{ChannelRecord, MasterRecord, RawChannelRow, RawMasterRow, ReconciledItem};

pub const REASON_MASTER_STOPPED_CHANNEL_SELLING: &str = "master stopped, channel(s) still selling";
pub const REASON_MASTER_CURRENT_CHANNELS_INACTIVE: &str = "master current, all channels non-current";
pub const REASON_CHANNEL_END_EXCEEDS_MASTER: &str = "channel end date exceeds master end date";
pub const REASON_MASTER_INTERVAL_INVALID: &str = "master date interval invalid (start after end)";

/// 合并、判定并标记异常；输出顺序同主档首次出现的顺序
///
/// 同一 key 的主档重复时后者覆盖前者；同一 (key, 通路) 重复时亦同。
pub fn reconcile(
    masters: &[RawMasterRow],
    channels: &[RawChannelRow],
    reference: NaiveDate,
) -> Vec<ReconciledItem> {
    let mut channels_by_key = group_channels(channels, reference);

    let mut ordered: Vec<MasterRecord> = Vec::with_capacity(masters.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(masters.len());
    for raw in masters {
        let record = MasterRecord::from_raw(raw, reference);
        if record.key.is_empty() {
            tracing::warn!("master row without key skipped: name={:?}", record.name);
            continue;
        }
        match index.get(&record.key) {
            Some(&i) => ordered[i] = record,
            None => {
                index.insert(record.key.clone(), ordered.len());
                ordered.push(record);
            }
        }
    }

    let items: Vec<ReconciledItem> = ordered
        .into_iter()
        .map(|master| {
            let matched = channels_by_key.remove(&master.key).unwrap_or_default();
            reconcile_one(master, matched.into_values().collect())
        })
        .collect();

    if !channels_by_key.is_empty() {
        tracing::debug!(
            "{} channel key(s) without a master record ignored",
            channels_by_key.len()
        );
    }
    items
}

/// 按 key 分组；组内以正式通路代码为键，后出现者覆盖先出现者
fn group_channels(
    channels: &[RawChannelRow],
    reference: NaiveDate,
) -> HashMap<String, BTreeMap<String, ChannelRecord>> {
    let mut grouped: HashMap<String, BTreeMap<String, ChannelRecord>> = HashMap::new();
    for raw in channels {
        let record = ChannelRecord::from_raw(raw, reference);
        if record.key.is_empty() || record.channel.is_empty() {
            continue;
        }
        grouped
            .entry(record.key.clone())
            .or_default()
            .insert(record.channel.clone(), record);
    }
    grouped
}

/// 由一笔主档与其（已去重的）通路记录组成对账结果
pub fn reconcile_one(master: MasterRecord, mut channels: Vec<ChannelRecord>) -> ReconciledItem {
    order_channels(&mut channels);
    let special_reasons = anomaly_reasons(&master, &channels);
    ReconciledItem {
        master,
        channels,
        special_reasons,
    }
}

/// 销售中在前，其余在后；组内按通路代码升序
pub fn order_channels(channels: &mut [ChannelRecord]) {
    channels.sort_by(|a, b| {
        b.is_current()
            .cmp(&a.is_current())
            .then_with(|| a.channel.cmp(&b.channel))
    });
}

/// 依固定顺序套用全部异常规则
pub fn anomaly_reasons(master: &MasterRecord, channels: &[ChannelRecord]) -> Vec<String> {
    let mut reasons = Vec::new();
    let any_current = channels.iter().any(ChannelRecord::is_current);

    if master.status == SaleStatus::Stopped && any_current {
        reasons.push(REASON_MASTER_STOPPED_CHANNEL_SELLING.to_string());
    }

    if master.status == SaleStatus::Current && !channels.is_empty() && !any_current {
        reasons.push(REASON_MASTER_CURRENT_CHANNELS_INACTIVE.to_string());
    }

    if let Some(master_end) = master.sale_end.filter(|end| !is_open_ended(*end)) {
        for channel in channels {
            // 主档停售而通路仍在售的情形已由第一条规则回报
            if master.status == SaleStatus::Stopped && channel.is_current() {
                continue;
            }
            if channel.sale_end.is_some_and(|end| end > master_end) {
                reasons.push(format!(
                    "{REASON_CHANNEL_END_EXCEEDS_MASTER}: {}",
                    channel.channel
                ));
            }
        }
    }

    if master.status == SaleStatus::Abnormal {
        if master.sale_start.is_none() || master.sale_end.is_none() {
            tracing::debug!("master {} has a missing or unreadable date", master.key);
        }
        reasons.push(REASON_MASTER_INTERVAL_INVALID.to_string());
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_master_stopped_channel_selling_example() {
        let masters = vec![RawMasterRow::new("P100", "Plan 100", "2023-01-01", "2024-12-31")];
        let channels = vec![RawChannelRow::new("P100", "AG", "2025-01-01", "2025-12-31")];
        let items = reconcile(&masters, &channels, d(2025, 6, 1));

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.master.status, SaleStatus::Stopped);
        assert_eq!(item.channels[0].status, SaleStatus::Current);
        assert_eq!(item.special_reasons, vec![REASON_MASTER_STOPPED_CHANNEL_SELLING.to_string()]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let masters = vec![RawMasterRow::new("P100", "Plan 100", "2023-01-01", "2024-12-31")];
        let channels = vec![RawChannelRow::new("P100", "AG", "2025-01-01", "2025-12-31")];
        let first = reconcile(&masters, &channels, d(2025, 6, 1));
        let second = reconcile(&masters, &channels, d(2025, 6, 1));
        assert_eq!(first, second);
    }

    #[test]
    fn test_channel_less_master_is_not_penalized() {
        let masters = vec![RawMasterRow::new("P1", "Plan", "2020-01-01", "2020-12-31")];
        let items = reconcile(&masters, &[], d(2025, 1, 1));
        assert!(items[0].channels.is_empty());
        assert!(items[0].special_reasons.is_empty());
    }

    #[test]
    fn test_channel_less_abnormal_master_still_flagged() {
        let masters = vec![RawMasterRow::new("P1", "Plan", "2021-01-01", "2020-12-31")];
        let items = reconcile(&masters, &[], d(2025, 1, 1));
        assert_eq!(items[0].master.status, SaleStatus::Abnormal);
        assert_eq!(items[0].special_reasons, vec![REASON_MASTER_INTERVAL_INVALID.to_string()]);
    }

    #[test]
    fn test_unparseable_master_date_is_retained() {
        let mut raw = RawMasterRow::new("P1", "Plan", "2021-01-01", "2020-12-31");
        raw.sale_end = Some("someday".to_string());
        let items = reconcile(&[raw], &[], d(2025, 1, 1));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].master.status, SaleStatus::Abnormal);
        assert_eq!(items[0].special_reasons, vec![REASON_MASTER_INTERVAL_INVALID.to_string()]);
    }

    #[test]
    fn test_master_current_all_channels_inactive() {
        let masters = vec![RawMasterRow::new("P1", "Plan", "2024-01-01", "9999-12-31")];
        let channels = vec![
            RawChannelRow::new("P1", "AG", "2024-01-01", "2024-06-30"),
            RawChannelRow::new("P1", "BR", "2026-01-01", "2026-12-31"),
        ];
        let items = reconcile(&masters, &channels, d(2025, 1, 1));
        assert_eq!(
            items[0].special_reasons,
            vec![REASON_MASTER_CURRENT_CHANNELS_INACTIVE.to_string()]
        );
    }

    #[test]
    fn test_channel_end_exceeds_master_end_per_channel() {
        let masters = vec![RawMasterRow::new("P1", "Plan", "2024-01-01", "2025-12-31")];
        let channels = vec![
            RawChannelRow::new("P1", "WS", "2024-01-01", "2026-06-30"),
            RawChannelRow::new("P1", "AG", "2024-01-01", "2026-12-31"),
            RawChannelRow::new("P1", "BR", "2024-01-01", "2025-06-30"),
        ];
        let items = reconcile(&masters, &channels, d(2025, 1, 1));
        assert_eq!(
            items[0].special_reasons,
            vec![
                format!("{REASON_CHANNEL_END_EXCEEDS_MASTER}: AG"),
                format!("{REASON_CHANNEL_END_EXCEEDS_MASTER}: WS"),
            ]
        );
    }

    #[test]
    fn test_rules_reported_in_fixed_order() {
        // 主档已停售：AG 仍在售（规则一），BR 已停售但迄日超过主档（规则三）
        let masters = vec![RawMasterRow::new("P1", "Plan", "2023-01-01", "2024-06-30")];
        let channels = vec![
            RawChannelRow::new("P1", "BR", "2023-01-01", "2024-09-30"),
            RawChannelRow::new("P1", "AG", "2023-01-01", "2025-12-31"),
        ];
        let items = reconcile(&masters, &channels, d(2025, 1, 1));
        assert_eq!(
            items[0].special_reasons,
            vec![
                REASON_MASTER_STOPPED_CHANNEL_SELLING.to_string(),
                format!("{REASON_CHANNEL_END_EXCEEDS_MASTER}: BR"),
            ]
        );
    }

    #[test]
    fn test_channels_ordered_active_first_then_lexical() {
        let masters = vec![RawMasterRow::new("P1", "Plan", "2020-01-01", "9999-12-31")];
        let channels = vec![
            RawChannelRow::new("P1", "WS", "2020-01-01", "9999-12-31"),
            RawChannelRow::new("P1", "TM", "2020-01-01", "2021-01-01"),
            RawChannelRow::new("P1", "AG", "2020-01-01", "9999-12-31"),
            RawChannelRow::new("P1", "BR", "2020-01-01", "2021-01-01"),
        ];
        let items = reconcile(&masters, &channels, d(2025, 1, 1));
        let order: Vec<&str> = items[0].channels.iter().map(|c| c.channel.as_str()).collect();
        assert_eq!(order, vec!["AG", "WS", "BR", "TM"]);
    }

    #[test]
    fn test_duplicate_channel_later_record_wins() {
        let masters = vec![RawMasterRow::new("P1", "Plan", "2020-01-01", "9999-12-31")];
        let channels = vec![
            RawChannelRow::new("P1", "AG", "2020-01-01", "2021-01-01"),
            RawChannelRow::new("P1", "AG", "2020-01-01", "9999-12-31"),
        ];
        let items = reconcile(&masters, &channels, d(2025, 1, 1));
        assert_eq!(items[0].channels.len(), 1);
        assert_eq!(items[0].channels[0].status, SaleStatus::Current);
    }

    #[test]
    fn test_channel_alias_merges_with_canonical() {
        let masters = vec![RawMasterRow::new("P1", "Plan", "2020-01-01", "9999-12-31")];
        let channels = vec![
            RawChannelRow::new("p1", "BK", "2020-01-01", "2021-01-01"),
            RawChannelRow::new("P1", "ba", "2020-01-01", "9999-12-31"),
        ];
        let items = reconcile(&masters, &channels, d(2025, 1, 1));
        assert_eq!(items[0].channels.len(), 1);
        assert_eq!(items[0].channels[0].channel, "BK");
        assert!(items[0].channels[0].is_current());
    }

    #[test]
    fn test_duplicate_master_keeps_first_position() {
        let masters = vec![
            RawMasterRow::new("P1", "Old", "2020-01-01", "9999-12-31"),
            RawMasterRow::new("P2", "Two", "2020-01-01", "9999-12-31"),
            RawMasterRow::new("P1", "New", "2020-01-01", "9999-12-31"),
        ];
        let items = reconcile(&masters, &[], d(2025, 1, 1));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].master.name, "New");
        assert_eq!(items[1].key(), "P2");
    }
}
