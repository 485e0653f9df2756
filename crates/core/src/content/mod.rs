//! Content entities and the parsing helpers adapters share.

pub mod html;
pub mod ids;
mod types;

pub use ids::{decode_url_id, encode_url_id, join_id, split_id};
pub use types::*;
