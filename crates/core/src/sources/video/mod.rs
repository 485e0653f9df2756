//! Video adapters.

mod maccms;
mod vodplus;
mod youtube;

pub use maccms::MacCms;
pub use vodplus::VodPlus;
pub use youtube::YouTube;
