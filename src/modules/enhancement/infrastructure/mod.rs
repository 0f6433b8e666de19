pub mod in_memory;
pub mod rate_limited_executor;

pub use in_memory::{InMemoryRecordStore, LoggingCacheInvalidator};
pub use rate_limited_executor::RateLimitedExecutor;
