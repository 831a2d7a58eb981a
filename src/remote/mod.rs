//! 远端层：目录服务抽象与实现（HTTP / Mock）、凭证存放

pub mod credential;
pub mod http;
pub mod mock;
pub mod traits;

pub use credential::CredentialStore;
pub use http::HttpCatalogService;
pub use mock::MockCatalogService;
pub use traits::{CatalogService, ChannelFilter, MasterFilter, MasterPage};
