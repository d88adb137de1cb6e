//! Shared utilities: the expiring cache and security helpers.

pub mod expiring_cache;
pub mod security;

pub use expiring_cache::ExpiringCache;
pub use security::{constant_time_eq, mask_token};
