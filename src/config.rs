//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PLANCODE__*` 覆盖（双下划线表示嵌套，如 `PLANCODE__REMOTE__BASE_URL=https://...`）。

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::catalog::parse_date;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub query: QuerySection,
    #[serde(default)]
    pub credential: CredentialSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 固定参考日（YYYY-MM-DD）；未设置时取本地当日
    pub reference_date: Option<String>,
}

impl AppSection {
    /// 设置了但无法解析时返回 None 并记录警告
    pub fn reference_date(&self) -> Option<NaiveDate> {
        let raw = self.reference_date.as_deref()?;
        let parsed = parse_date(raw);
        if parsed.is_none() {
            tracing::warn!("app.reference_date {:?} is not a valid date, using today", raw);
        }
        parsed
    }
}

/// [remote] 段：目录服务端点与超时
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_master_path")]
    pub master_path: String,
    #[serde(default = "default_channel_path")]
    pub channel_path: String,
    #[serde(default = "default_detail_path")]
    pub detail_path: String,
    #[serde(default = "default_verify_path")]
    pub verify_path: String,
    /// 主档端点是否接受整份 key 清单
    #[serde(default = "default_batch_lookup")]
    pub batch_lookup: bool,
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 分页查询的页数上限
    #[serde(default = "default_max_master_pages")]
    pub max_master_pages: u32,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_master_path() -> String {
    "/api/products".to_string()
}

fn default_channel_path() -> String {
    "/api/channels".to_string()
}

fn default_detail_path() -> String {
    "/api/products/detail".to_string()
}

fn default_verify_path() -> String {
    "/api/auth/verify".to_string()
}

fn default_batch_lookup() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_master_pages() -> u32 {
    200
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            master_path: default_master_path(),
            channel_path: default_channel_path(),
            detail_path: default_detail_path(),
            verify_path: default_verify_path(),
            batch_lookup: default_batch_lookup(),
            request_timeout_secs: default_request_timeout_secs(),
            max_master_pages: default_max_master_pages(),
        }
    }
}

/// [query] 段：分页大小与明细补全并发数
#[derive(Debug, Clone, Deserialize)]
pub struct QuerySection {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_concurrent_details")]
    pub max_concurrent_details: usize,
}

fn default_page_size() -> usize {
    50
}

fn default_max_concurrent_details() -> usize {
    4
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_concurrent_details: default_max_concurrent_details(),
        }
    }
}

/// [credential] 段：启动时的初始凭证（通常来自环境变量）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialSection {
    pub token: Option<String>,
}

/// 从 config 目录加载配置，环境变量 PLANCODE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PLANCODE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PLANCODE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
