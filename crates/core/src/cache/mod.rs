//! Process-local response cache.
//!
//! Handlers build a [`CacheKey`] from everything that identifies a response
//! and wrap the adapter call in [`ResponseCache::cached`]. Entries expire by
//! route class and are dropped lazily on read.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{ResponseCache, TtlClass};
