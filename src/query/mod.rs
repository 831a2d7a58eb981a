//! 查询层：请求模式、编排执行、明细快取与补全

pub mod cache;
pub mod detail;
pub mod orchestrator;
pub mod request;

pub use cache::{CacheEntry, RecordCache};
pub use detail::DetailLoader;
pub use orchestrator::{
    FailureScope, FetchedRecords, KeyFailure, QueryEvent, QueryOrchestrator, QueryOutcome,
};
pub use request::{QueryMode, QueryRequest};
