use mediahub_core::{
    CacheConfig, Config, MediaProxy, MetadataWarmer, ResponseCache, SanitizedConfig,
    SessionError, SourceFactories, TranscodeService,
};

/// Shared application state
pub struct AppState {
    config: Config,
    sources: SourceFactories,
    cache: ResponseCache,
    proxy: MediaProxy,
    transcoder: TranscodeService,
    warmer: MetadataWarmer,
}

impl AppState {
    pub fn new(config: Config, sources: SourceFactories, proxy: MediaProxy) -> Self {
        let cache = ResponseCache::new(config.cache.clone());
        let transcoder = TranscodeService::new(config.transcoder.clone());
        let warmer = MetadataWarmer::new(config.warmup.clone());
        Self {
            config,
            sources,
            cache,
            proxy,
            transcoder,
            warmer,
        }
    }

    /// Build every service from configuration alone.
    pub fn from_config(config: Config) -> Result<Self, SessionError> {
        let sources = SourceFactories::from_config(&config);
        let proxy = MediaProxy::from_config(&config)?;
        Ok(Self::new(config, sources, proxy))
    }

    /// Replace the response cache, e.g. to disable it in tests.
    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = ResponseCache::new(config);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn sources(&self) -> &SourceFactories {
        &self.sources
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn proxy(&self) -> &MediaProxy {
        &self.proxy
    }

    pub fn transcoder(&self) -> &TranscodeService {
        &self.transcoder
    }

    pub fn warmer(&self) -> &MetadataWarmer {
        &self.warmer
    }
}
