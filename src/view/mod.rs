//! 检视层：搜寻 / 排序 / 分页投影与 tab 分隔汇出

pub mod export;
pub mod view_model;

pub use export::{render_row, render_tsv, COLUMNS};
pub use view_model::{SortKey, StatusSummary, ViewModel, ViewState, DEFAULT_PAGE_SIZE};
