//! Per-domain adapter registries.
//!
//! A factory knows every configured source of its domain and builds the
//! adapter on first use. Built adapters are cached and shared.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{Config, Domain, SourceConfig};
use crate::fetch::SessionError;

use super::comic::{Dm5, Kuman};
use super::ebook::{Biquge, NovelForum};
use super::podcast::Tingshu;
use super::traits::{ComicSource, EbookSource, PodcastSource, VideoSource};
use super::video::{MacCms, VodPlus, YouTube};

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("unknown {domain} source: {id}")]
    Unknown { domain: &'static str, id: String },

    #[error("source '{id}' is disabled")]
    Disabled { id: String },

    #[error("failed to build source '{id}': {reason}")]
    Build { id: String, reason: String },
}

/// Public description of a registered source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceMeta {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub domain: Domain,
}

impl From<&SourceConfig> for SourceMeta {
    fn from(source: &SourceConfig) -> Self {
        Self {
            id: source.id.clone(),
            name: source.name.clone(),
            description: source.description.clone(),
            enabled: source.enabled,
            domain: source.domain,
        }
    }
}

type Constructor<T> = Box<dyn Fn() -> Result<Arc<T>, SessionError> + Send + Sync>;

struct Registration<T: ?Sized> {
    meta: SourceMeta,
    build: Constructor<T>,
}

/// Registry of the adapters of one domain.
pub struct SourceFactory<T: ?Sized> {
    domain: Domain,
    default_id: String,
    registrations: Vec<Registration<T>>,
    instances: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> std::fmt::Debug for SourceFactory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<_> = self.registrations.iter().map(|r| r.meta.id.as_str()).collect();
        f.debug_struct("SourceFactory")
            .field("domain", &self.domain)
            .field("default_id", &self.default_id)
            .field("sources", &ids)
            .finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> SourceFactory<T> {
    pub fn new(domain: Domain, default_id: impl Into<String>) -> Self {
        Self {
            domain,
            default_id: default_id.into(),
            registrations: Vec::new(),
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    /// Register a source built lazily by `build`.
    ///
    /// A later registration with the same id replaces the earlier one.
    pub fn register<F>(&mut self, meta: SourceMeta, build: F)
    where
        F: Fn() -> Result<Arc<T>, SessionError> + Send + Sync + 'static,
    {
        self.registrations.retain(|r| r.meta.id != meta.id);
        self.registrations.push(Registration {
            meta,
            build: Box::new(build),
        });
    }

    /// Register an already built adapter.
    pub fn register_instance(&mut self, meta: SourceMeta, instance: Arc<T>) {
        self.register(meta, move || Ok(Arc::clone(&instance)));
    }

    /// Resolve a source id, `None` meaning the domain default.
    pub async fn get(&self, id: Option<&str>) -> Result<Arc<T>, FactoryError> {
        let id = id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.default_id);

        let registration = self
            .registrations
            .iter()
            .find(|r| r.meta.id == id)
            .ok_or_else(|| FactoryError::Unknown {
                domain: self.domain.as_str(),
                id: id.to_string(),
            })?;
        if !registration.meta.enabled {
            return Err(FactoryError::Disabled { id: id.to_string() });
        }

        if let Some(instance) = self.instances.read().await.get(id) {
            return Ok(Arc::clone(instance));
        }

        let built = (registration.build)().map_err(|e| FactoryError::Build {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        debug!(domain = self.domain.as_str(), source = id, "Built source adapter");

        // Another request may have built it meanwhile; the first one wins.
        let mut instances = self.instances.write().await;
        let instance = instances.entry(id.to_string()).or_insert(built);
        Ok(Arc::clone(instance))
    }

    pub fn list(&self) -> Vec<SourceMeta> {
        self.registrations.iter().map(|r| r.meta.clone()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registrations.iter().any(|r| r.meta.id == id)
    }
}

/// The four domain factories.
#[derive(Debug)]
pub struct SourceFactories {
    pub comics: SourceFactory<dyn ComicSource>,
    pub ebooks: SourceFactory<dyn EbookSource>,
    pub podcasts: SourceFactory<dyn PodcastSource>,
    pub videos: SourceFactory<dyn VideoSource>,
}

impl SourceFactories {
    /// Empty factories with the configured defaults.
    pub fn empty(config: &Config) -> Self {
        let defaults = &config.defaults;
        Self {
            comics: SourceFactory::new(Domain::Comic, defaults.comic.clone()),
            ebooks: SourceFactory::new(Domain::Ebook, defaults.ebook.clone()),
            podcasts: SourceFactory::new(Domain::Podcast, defaults.podcast.clone()),
            videos: SourceFactory::new(Domain::Video, defaults.video.clone()),
        }
    }

    /// Wire every configured source row to its adapter.
    ///
    /// The adapter is chosen by the row's `adapter` option, falling back to
    /// its id. Rows naming no known adapter, or an adapter of another
    /// domain, are skipped with a warning.
    pub fn from_config(config: &Config) -> Self {
        let mut factories = Self::empty(config);

        for row in &config.sources {
            let kind = row.option("adapter").unwrap_or(&row.id).to_string();
            let meta = SourceMeta::from(row);
            let source = row.clone();
            let policy = config.fetch.clone();

            let wired = match (kind.as_str(), row.domain) {
                ("dm5", Domain::Comic) => {
                    factories.comics.register(meta, move || {
                        Ok(Arc::new(Dm5::new(&source, &policy)?) as Arc<dyn ComicSource>)
                    });
                    true
                }
                ("kuman", Domain::Comic) => {
                    factories.comics.register(meta, move || {
                        Ok(Arc::new(Kuman::new(&source, &policy)?) as Arc<dyn ComicSource>)
                    });
                    true
                }
                ("biquge", Domain::Ebook) => {
                    factories.ebooks.register(meta, move || {
                        Ok(Arc::new(Biquge::new(&source, &policy)?) as Arc<dyn EbookSource>)
                    });
                    true
                }
                ("novelforum", Domain::Ebook) => {
                    factories.ebooks.register(meta, move || {
                        Ok(Arc::new(NovelForum::new(&source, &policy)?) as Arc<dyn EbookSource>)
                    });
                    true
                }
                ("tingshu", Domain::Podcast) => {
                    factories.podcasts.register(meta, move || {
                        Ok(Arc::new(Tingshu::new(&source, &policy)?) as Arc<dyn PodcastSource>)
                    });
                    true
                }
                ("vodplus", Domain::Video) => {
                    factories.videos.register(meta, move || {
                        Ok(Arc::new(VodPlus::new(&source, &policy)?) as Arc<dyn VideoSource>)
                    });
                    true
                }
                ("maccms", Domain::Video) => {
                    factories.videos.register(meta, move || {
                        Ok(Arc::new(MacCms::new(&source, &policy)?) as Arc<dyn VideoSource>)
                    });
                    true
                }
                ("youtube", Domain::Video) => {
                    let extractor = config.extractor.clone();
                    factories.videos.register(meta, move || {
                        Ok(Arc::new(YouTube::new(&source, &policy, &extractor)?)
                            as Arc<dyn VideoSource>)
                    });
                    true
                }
                _ => false,
            };

            if !wired {
                warn!(
                    source = %row.id,
                    adapter = %kind,
                    domain = row.domain.as_str(),
                    "No adapter for source row, skipping"
                );
            }
        }

        factories
    }

    /// Every registered source, optionally restricted to one domain.
    pub fn list(&self, domain: Option<Domain>) -> Vec<SourceMeta> {
        let all = [
            self.comics.list(),
            self.ebooks.list(),
            self.podcasts.list(),
            self.videos.list(),
        ];
        all.into_iter()
            .flatten()
            .filter(|meta| domain.map(|d| meta.domain == d).unwrap_or(true))
            .collect()
    }
}
