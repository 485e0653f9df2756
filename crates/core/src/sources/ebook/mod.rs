//! E-book adapters.

mod biquge;
mod novelforum;

pub use biquge::Biquge;
pub use novelforum::NovelForum;
