use crate::{
    EdgeStore, Error, IdentifierRegistry, InfoManager, MemoryEdgeStore, MemoryInfoStore,
    MemoryPendingStore, MemoryRegistry, PendingManager, SqliteBackend,
};
use models::{Author, Kind, Paper, Relation, Venue};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Selects the implementation behind every store.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    #[default]
    Memory,
    ExternalKv,
}

/// Cache configuration. Registry and committed-edge state is always
/// permanent; only info records and pending lists honour TTLs.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    pub backend: Backend,
    /// Database file; required by the `external-kv` backend.
    pub path: Option<PathBuf>,
    pub ttl: TtlConfig,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    #[serde(with = "humantime_serde")]
    pub paper_info: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub author_info: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub venue_info: Option<Duration>,
    pub pending: PendingTtl,
}

/// Expiry per pending list, keyed by traversal direction.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PendingTtl {
    #[serde(with = "humantime_serde")]
    pub paper_authors: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub author_papers: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub paper_venues: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub venue_papers: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub paper_references: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub paper_citations: Option<Duration>,
}

/// The full cache consumed by the traversal engine: one info manager per
/// entity kind, one pending list per traversal direction, one committed
/// edge namespace per reified relation. A plain aggregate; every part is
/// an independently replaceable trait object, but all managers of one
/// kind share that kind's registry.
pub struct WeaverCache {
    pub papers: InfoManager<Paper>,
    pub authors: InfoManager<Author>,
    pub venues: InfoManager<Venue>,

    pub paper_authors: PendingManager<Author>,
    pub author_papers: PendingManager<Paper>,
    pub paper_venues: PendingManager<Venue>,
    pub venue_papers: PendingManager<Paper>,
    pub paper_references: PendingManager<Paper>,
    pub paper_citations: PendingManager<Paper>,

    pub authored_edges: Arc<dyn EdgeStore>,
    pub published_in_edges: Arc<dyn EdgeStore>,
    pub cites_edges: Arc<dyn EdgeStore>,
}

impl WeaverCache {
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        match config.backend {
            Backend::Memory => Ok(Self::in_memory_with(&config.ttl)),
            Backend::ExternalKv => {
                let path = config.path.as_ref().ok_or_else(|| {
                    Error::Config("the external-kv backend requires `path`".to_string())
                })?;
                let backend = SqliteBackend::open(path)?;
                Ok(Self::sqlite_with(&backend, &config.ttl))
            }
        }
    }

    pub fn in_memory() -> Self {
        Self::in_memory_with(&TtlConfig::default())
    }

    pub fn in_memory_with(ttl: &TtlConfig) -> Self {
        let papers: Arc<dyn IdentifierRegistry> = Arc::new(MemoryRegistry::new());
        let authors: Arc<dyn IdentifierRegistry> = Arc::new(MemoryRegistry::new());
        let venues: Arc<dyn IdentifierRegistry> = Arc::new(MemoryRegistry::new());

        let pending = |ttl: Option<Duration>| Arc::new(MemoryPendingStore::new(ttl));

        Self {
            papers: InfoManager::new(
                papers.clone(),
                Arc::new(MemoryInfoStore::new(ttl.paper_info)),
            ),
            authors: InfoManager::new(
                authors.clone(),
                Arc::new(MemoryInfoStore::new(ttl.author_info)),
            ),
            venues: InfoManager::new(
                venues.clone(),
                Arc::new(MemoryInfoStore::new(ttl.venue_info)),
            ),
            paper_authors: PendingManager::new(
                authors.clone(),
                pending(ttl.pending.paper_authors),
            ),
            author_papers: PendingManager::new(papers.clone(), pending(ttl.pending.author_papers)),
            paper_venues: PendingManager::new(venues.clone(), pending(ttl.pending.paper_venues)),
            venue_papers: PendingManager::new(papers.clone(), pending(ttl.pending.venue_papers)),
            paper_references: PendingManager::new(
                papers.clone(),
                pending(ttl.pending.paper_references),
            ),
            paper_citations: PendingManager::new(papers, pending(ttl.pending.paper_citations)),
            authored_edges: Arc::new(MemoryEdgeStore::new()),
            published_in_edges: Arc::new(MemoryEdgeStore::new()),
            cites_edges: Arc::new(MemoryEdgeStore::new()),
        }
    }

    pub fn sqlite(backend: &SqliteBackend) -> Self {
        Self::sqlite_with(backend, &TtlConfig::default())
    }

    pub fn sqlite_with(backend: &SqliteBackend, ttl: &TtlConfig) -> Self {
        let papers: Arc<dyn IdentifierRegistry> = Arc::new(backend.registry(Kind::Paper));
        let authors: Arc<dyn IdentifierRegistry> = Arc::new(backend.registry(Kind::Author));
        let venues: Arc<dyn IdentifierRegistry> = Arc::new(backend.registry(Kind::Venue));

        Self {
            papers: InfoManager::new(
                papers.clone(),
                Arc::new(backend.info_store(Kind::Paper, ttl.paper_info)),
            ),
            authors: InfoManager::new(
                authors.clone(),
                Arc::new(backend.info_store(Kind::Author, ttl.author_info)),
            ),
            venues: InfoManager::new(
                venues.clone(),
                Arc::new(backend.info_store(Kind::Venue, ttl.venue_info)),
            ),
            paper_authors: PendingManager::new(
                authors.clone(),
                Arc::new(backend.pending_store("paper_authors", ttl.pending.paper_authors)),
            ),
            author_papers: PendingManager::new(
                papers.clone(),
                Arc::new(backend.pending_store("author_papers", ttl.pending.author_papers)),
            ),
            paper_venues: PendingManager::new(
                venues.clone(),
                Arc::new(backend.pending_store("paper_venues", ttl.pending.paper_venues)),
            ),
            venue_papers: PendingManager::new(
                papers.clone(),
                Arc::new(backend.pending_store("venue_papers", ttl.pending.venue_papers)),
            ),
            paper_references: PendingManager::new(
                papers.clone(),
                Arc::new(backend.pending_store("paper_references", ttl.pending.paper_references)),
            ),
            paper_citations: PendingManager::new(
                papers,
                Arc::new(backend.pending_store("paper_citations", ttl.pending.paper_citations)),
            ),
            authored_edges: Arc::new(backend.edge_store(Relation::Authored)),
            published_in_edges: Arc::new(backend.edge_store(Relation::PublishedIn)),
            cites_edges: Arc::new(backend.edge_store(Relation::Cites)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn pending_managers_share_the_kind_registry() {
        let cache = WeaverCache::in_memory();
        let parent = models::CanonicalId::from_i64(1);

        // A paper listed as a citation becomes iterable as a paper.
        cache
            .paper_citations
            .add(parent, &[Paper::with(["doi:cited"])])
            .await
            .unwrap();
        let papers = cache.papers.entities().await.unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].1, Paper::with(["doi:cited"]));

        // And its aliases merge across managers.
        cache
            .author_papers
            .add(parent, &[Paper::with(["doi:cited", "arxiv:x"])])
            .await
            .unwrap();
        let papers = cache.papers.entities().await.unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].1, Paper::with(["doi:cited", "arxiv:x"]));
    }

    #[tokio::test]
    async fn kinds_do_not_bleed_across_registries() {
        let cache = WeaverCache::in_memory();
        cache
            .papers
            .set_info(&Paper::with(["x:1"]), &json!({}))
            .await
            .unwrap();
        cache
            .authors
            .set_info(&Author::with(["x:1"]), &json!({}))
            .await
            .unwrap();
        assert_eq!(cache.papers.entities().await.unwrap().len(), 1);
        assert_eq!(cache.authors.entities().await.unwrap().len(), 1);
        assert_eq!(cache.venues.entities().await.unwrap().len(), 0);
    }

    #[test]
    fn config_parses_backend_and_ttls() {
        let config: Config = serde_json::from_value(json!({
            "backend": "external-kv",
            "path": "/tmp/weave.sqlite",
            "ttl": {
                "paper_info": "1h",
                "pending": { "paper_citations": "30m" },
            },
        }))
        .unwrap();
        assert_eq!(config.backend, Backend::ExternalKv);
        assert_eq!(config.ttl.paper_info, Some(Duration::from_secs(3600)));
        assert_eq!(
            config.ttl.pending.paper_citations,
            Some(Duration::from_secs(1800))
        );
        assert_eq!(config.ttl.author_info, None);
    }

    #[test]
    fn external_kv_without_path_is_rejected() {
        let config = Config {
            backend: Backend::ExternalKv,
            ..Config::default()
        };
        assert!(matches!(
            WeaverCache::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
