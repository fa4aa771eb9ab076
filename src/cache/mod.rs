//! Bounded result cache.

pub mod bounded;

pub use bounded::{BoundedCache, CacheStats};
