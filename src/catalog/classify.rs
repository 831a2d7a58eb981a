//! 销售状态判定
//!
//! 以参考日比对起讫区间，得出 Pending / Current / Stopped / Abnormal。
//! 纯函数：日期字串先正规化为数字年月日再比较，不依赖地区设定。

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// 「无迄日」的哨兵年份，迄日落在此年即视为永续销售
pub const OPEN_END_YEAR: i32 = 9999;

/// 销售状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SaleStatus {
    /// 尚未开卖
    Pending,
    /// 销售中
    Current,
    /// 已停售
    Stopped,
    /// 日期缺漏、无法解析或起日晚于迄日
    Abnormal,
}

impl SaleStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Current => "Current",
            Self::Stopped => "Stopped",
            Self::Abnormal => "Abnormal",
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 迄日是否为永续哨兵
pub fn is_open_ended(end: NaiveDate) -> bool {
    end.year() >= OPEN_END_YEAR
}

/// 判定状态；起讫区间两端皆为闭区间
pub fn classify(reference: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> SaleStatus {
    let (Some(start), Some(end)) = (start, end) else {
        return SaleStatus::Abnormal;
    };
    if start > end {
        return SaleStatus::Abnormal;
    }
    if reference < start {
        SaleStatus::Pending
    } else if is_open_ended(end) || reference <= end {
        SaleStatus::Current
    } else {
        SaleStatus::Stopped
    }
}

/// 以字串形式的起讫日判定
pub fn classify_raw(reference: NaiveDate, start: Option<&str>, end: Option<&str>) -> SaleStatus {
    classify(
        reference,
        start.and_then(parse_date),
        end.and_then(parse_date),
    )
}

/// 将来源日期正规化为 NaiveDate
///
/// 接受 `YYYY-MM-DD`、`YYYY/MM/DD`、`YYYY.MM.DD`（月日可为一位数）与 `YYYYMMDD`；
/// 结尾的时间部分（`T...` 或空白后的时间）忽略。其他格式一律视为无法解析。
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let s = s.split(['T', ' ']).next().unwrap_or(s);
    if s.is_empty() {
        return None;
    }

    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let year = s[0..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let sep = s.chars().find(|c| matches!(c, '-' | '/' | '.'))?;
    let parts: Vec<&str> = s.split(sep).collect();
    let [y, m, d] = parts.as_slice() else {
        return None;
    };
    if y.len() != 4 || m.is_empty() || m.len() > 2 || d.is_empty() || d.len() > 2 {
        return None;
    }
    if ![y, m, d].iter().all(|p| p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}
