//! Source adapters.
//!
//! One capability trait per content domain, the concrete adapters for the
//! shipped sites, and the per-domain factories that build them from config.

pub mod comic;
pub mod ebook;
mod error;
pub mod factory;
pub mod podcast;
mod traits;
pub(crate) mod util;
pub mod video;

pub use error::SourceError;
pub use factory::{FactoryError, SourceFactories, SourceFactory, SourceMeta};
pub use traits::{ComicSource, EbookSource, PodcastSource, VideoSource};
