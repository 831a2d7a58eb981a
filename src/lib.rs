//! Plancode - 商品 / 通路销售状态查询引擎
//!
//! 模块划分：
//! - **catalog**: 状态判定、代码表、资料模型、主档与通路对账
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、会话监管、任务调度、状态投影、组装
//! - **observability**: 日志初始化
//! - **query**: 查询模式、编排执行、明细快取与补全
//! - **remote**: 目录服务抽象与实现（HTTP / Mock）、凭证存放
//! - **session**: 展示层入口（开始 / 取消 / 重新整理查询、检视操作、汇出）
//! - **view**: 搜寻 / 排序 / 分页与 tab 分隔汇出

pub mod catalog;
pub mod config;
pub mod core;
pub mod observability;
pub mod query;
pub mod remote;
pub mod session;
pub mod view;

pub use session::QuerySession;
