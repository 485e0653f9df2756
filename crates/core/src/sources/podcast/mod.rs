//! Podcast adapters.

mod tingshu;

pub use tingshu::Tingshu;
