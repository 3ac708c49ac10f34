//! Service layer for the cortex API.

pub mod bookkeeping;
pub mod rate_limit;

pub use bookkeeping::Bookkeeper;
pub use rate_limit::{MemoryRateLimitStore, RateLimiter, RateLimitStore, RedisRateLimitStore};
