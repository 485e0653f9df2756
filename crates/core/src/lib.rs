pub mod cache;
pub mod config;
pub mod content;
pub mod extractor;
pub mod fetch;
pub mod metrics;
pub mod proxy;
pub mod resolver;
pub mod sources;
pub mod testing;
pub mod transcode;
pub mod warmup;

pub use cache::{CacheKey, ResponseCache, TtlClass};
pub use config::{
    builtin_sources, load_config, load_config_from_str, load_config_or_default, validate_config,
    CacheConfig, Config, ConfigError, Domain, FetchConfig, SanitizedConfig, SourceConfig,
    TranscoderConfig, WarmupConfig,
};
pub use content::{
    Book, BookChapter, BookChapterContent, BookDetail, Category, Comic, ComicChapter, ComicImage,
    Episode, EpisodeDetail, ImageSet, Listing, Paging, Program, Status, StreamFormat, Video,
    VideoEpisode, VideoEpisodeDetail,
};
pub use extractor::{ExtractorError, YtDlp};
pub use fetch::{FetchSession, RequestOptions, SessionError};
pub use proxy::{MediaProxy, ProxyError};
pub use resolver::{ResolveError, Stage};
pub use sources::{
    ComicSource, EbookSource, FactoryError, PodcastSource, SourceError, SourceFactories,
    SourceFactory, SourceMeta, VideoSource,
};
pub use transcode::{
    TaskRegistry, TaskStatus, TranscodeError, TranscodeRequest, TranscodeService, TranscodeTask,
};
pub use warmup::MetadataWarmer;
