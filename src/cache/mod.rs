// Local query result cache

pub mod keying;
pub mod models;
pub mod store;
pub mod table;

pub use keying::{CacheKey, QueryParams};
pub use models::CacheStatistics;
pub use store::QueryCache;
pub use table::TableOutput;
