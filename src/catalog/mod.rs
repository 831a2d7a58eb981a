//! 目录层：状态判定、代码表、资料模型与对账

pub mod classify;
pub mod codes;
pub mod model;
pub mod reconcile;

pub use classify::{classify, parse_date, SaleStatus, OPEN_END_YEAR};
pub use model::{
    normalize_key, ChannelRecord, MasterRecord, RawChannelRow, RawMasterRow, ReconciledItem,
};
pub use reconcile::reconcile;
