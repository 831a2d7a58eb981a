//! 代码表：币别、单位、保障型态与通路代码
//!
//! 主档的列举栏位以固定代码表解码为显示值；未知代码原样显示，资料列不因此被丢弃。

/// 可解码的主档属性栏位
pub const ATTR_CURRENCY: &str = "currency";
pub const ATTR_UNIT: &str = "unit";
pub const ATTR_COVERAGE_TYPE: &str = "coverage_type";

const CURRENCY_CODES: &[(&str, &str)] = &[
    ("1", "TWD"),
    ("2", "USD"),
    ("3", "AUD"),
    ("4", "CNY"),
    ("5", "EUR"),
    ("6", "JPY"),
];

const UNIT_CODES: &[(&str, &str)] = &[
    ("A", "Amount"),
    ("U", "Units"),
    ("P", "Plans"),
];

const COVERAGE_TYPE_CODES: &[(&str, &str)] = &[
    ("L", "Life"),
    ("H", "Health"),
    ("A", "Accident"),
    ("I", "Investment-linked"),
    ("N", "Annuity"),
];

/// 通路正式代码
pub const CHANNELS: &[(&str, &str)] = &[
    ("AG", "Agency"),
    ("BK", "Bancassurance"),
    ("BR", "Broker"),
    ("TM", "Telemarketing"),
    ("WS", "Online"),
];

/// 部分来源系统使用的通路别名 -> 正式代码
const CHANNEL_ALIASES: &[(&str, &str)] = &[("BA", "BK")];

fn lookup(table: &[(&str, &'static str)], code: &str) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, v)| *v)
}

/// 依栏位名解码；未知栏位或代码返回原始代码
pub fn decode_attribute(field: &str, code: &str) -> String {
    let code = code.trim();
    let table = match field {
        ATTR_CURRENCY => CURRENCY_CODES,
        ATTR_UNIT => UNIT_CODES,
        ATTR_COVERAGE_TYPE => COVERAGE_TYPE_CODES,
        _ => return code.to_string(),
    };
    lookup(table, code)
        .or_else(|| lookup(table, &code.to_uppercase()))
        .map(String::from)
        .unwrap_or_else(|| code.to_string())
}

/// 通路代码正规化：去空白、转大写、别名转正式代码
pub fn canonical_channel(raw: &str) -> String {
    let code = raw.trim().to_uppercase();
    CHANNEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == code)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(code)
}

/// 通路显示名称
pub fn channel_name(canonical: &str) -> Option<&'static str> {
    lookup(CHANNELS, canonical)
}
