pub mod eastmoney;
pub mod eastmoney_news;
pub mod provider;
pub mod router;
pub mod sina;
pub mod tencent;
pub mod types;
pub mod xueqiu;

pub use provider::{SourceDispatch, StaticDispatch};
pub use router::{DataSourceRouter, FetchSuccess, NoProviderAvailable};
pub use types::{CapabilityType, DataItem, FetchRequest, SourceError};
