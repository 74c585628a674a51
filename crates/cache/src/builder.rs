use crate::{
    EdgeStore, IdentifierRegistry, InfoManager, InfoStore, MemoryEdgeStore, MemoryInfoStore,
    MemoryPendingStore, MemoryRegistry, PendingManager, PendingStore, SqliteBackend, TtlConfig,
    WeaverCache,
};
use models::{Kind, Relation};
use std::sync::Arc;

/// Builder for caches mixing backends per component: e.g. a durable
/// SQLite registry and edge set with throwaway in-memory info stores.
/// Components left unset fall back to the builder's base backend.
///
/// ```no_run
/// # fn main() -> cache::Result<()> {
/// let durable = cache::SqliteBackend::open("weave.sqlite")?;
/// let cache = cache::WeaverCacheBuilder::sqlite(durable.clone())
///     .paper_info(std::sync::Arc::new(cache::MemoryInfoStore::new(None)))
///     .author_info(std::sync::Arc::new(cache::MemoryInfoStore::new(None)))
///     .build();
/// # Ok(())
/// # }
/// ```
pub struct WeaverCacheBuilder {
    base: Base,
    ttl: TtlConfig,

    paper_registry: Option<Arc<dyn IdentifierRegistry>>,
    author_registry: Option<Arc<dyn IdentifierRegistry>>,
    venue_registry: Option<Arc<dyn IdentifierRegistry>>,

    paper_info: Option<Arc<dyn InfoStore>>,
    author_info: Option<Arc<dyn InfoStore>>,
    venue_info: Option<Arc<dyn InfoStore>>,

    pending: [Option<Arc<dyn PendingStore>>; 6],

    authored_edges: Option<Arc<dyn EdgeStore>>,
    published_in_edges: Option<Arc<dyn EdgeStore>>,
    cites_edges: Option<Arc<dyn EdgeStore>>,
}

enum Base {
    Memory,
    Sqlite(SqliteBackend),
}

// Index into the pending-store slots, in declaration order.
const PAPER_AUTHORS: usize = 0;
const AUTHOR_PAPERS: usize = 1;
const PAPER_VENUES: usize = 2;
const VENUE_PAPERS: usize = 3;
const PAPER_REFERENCES: usize = 4;
const PAPER_CITATIONS: usize = 5;

const PENDING_LISTS: [&str; 6] = [
    "paper_authors",
    "author_papers",
    "paper_venues",
    "venue_papers",
    "paper_references",
    "paper_citations",
];

impl WeaverCacheBuilder {
    pub fn memory() -> Self {
        Self::with_base(Base::Memory)
    }

    pub fn sqlite(backend: SqliteBackend) -> Self {
        Self::with_base(Base::Sqlite(backend))
    }

    fn with_base(base: Base) -> Self {
        Self {
            base,
            ttl: TtlConfig::default(),
            paper_registry: None,
            author_registry: None,
            venue_registry: None,
            paper_info: None,
            author_info: None,
            venue_info: None,
            pending: Default::default(),
            authored_edges: None,
            published_in_edges: None,
            cites_edges: None,
        }
    }

    /// TTLs applied to base-backend info and pending stores. Stores set
    /// explicitly carry their own expiry.
    pub fn ttl(mut self, ttl: TtlConfig) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn paper_registry(mut self, registry: Arc<dyn IdentifierRegistry>) -> Self {
        self.paper_registry = Some(registry);
        self
    }

    pub fn author_registry(mut self, registry: Arc<dyn IdentifierRegistry>) -> Self {
        self.author_registry = Some(registry);
        self
    }

    pub fn venue_registry(mut self, registry: Arc<dyn IdentifierRegistry>) -> Self {
        self.venue_registry = Some(registry);
        self
    }

    pub fn paper_info(mut self, store: Arc<dyn InfoStore>) -> Self {
        self.paper_info = Some(store);
        self
    }

    pub fn author_info(mut self, store: Arc<dyn InfoStore>) -> Self {
        self.author_info = Some(store);
        self
    }

    pub fn venue_info(mut self, store: Arc<dyn InfoStore>) -> Self {
        self.venue_info = Some(store);
        self
    }

    pub fn paper_authors(mut self, store: Arc<dyn PendingStore>) -> Self {
        self.pending[PAPER_AUTHORS] = Some(store);
        self
    }

    pub fn author_papers(mut self, store: Arc<dyn PendingStore>) -> Self {
        self.pending[AUTHOR_PAPERS] = Some(store);
        self
    }

    pub fn paper_venues(mut self, store: Arc<dyn PendingStore>) -> Self {
        self.pending[PAPER_VENUES] = Some(store);
        self
    }

    pub fn venue_papers(mut self, store: Arc<dyn PendingStore>) -> Self {
        self.pending[VENUE_PAPERS] = Some(store);
        self
    }

    pub fn paper_references(mut self, store: Arc<dyn PendingStore>) -> Self {
        self.pending[PAPER_REFERENCES] = Some(store);
        self
    }

    pub fn paper_citations(mut self, store: Arc<dyn PendingStore>) -> Self {
        self.pending[PAPER_CITATIONS] = Some(store);
        self
    }

    pub fn authored_edges(mut self, store: Arc<dyn EdgeStore>) -> Self {
        self.authored_edges = Some(store);
        self
    }

    pub fn published_in_edges(mut self, store: Arc<dyn EdgeStore>) -> Self {
        self.published_in_edges = Some(store);
        self
    }

    pub fn cites_edges(mut self, store: Arc<dyn EdgeStore>) -> Self {
        self.cites_edges = Some(store);
        self
    }

    pub fn build(self) -> WeaverCache {
        let Self {
            base,
            ttl,
            paper_registry,
            author_registry,
            venue_registry,
            paper_info,
            author_info,
            venue_info,
            mut pending,
            authored_edges,
            published_in_edges,
            cites_edges,
        } = self;

        let registry = |kind: Kind| -> Arc<dyn IdentifierRegistry> {
            match &base {
                Base::Memory => Arc::new(MemoryRegistry::new()),
                Base::Sqlite(backend) => Arc::new(backend.registry(kind)),
            }
        };
        let info = |kind: Kind, ttl| -> Arc<dyn InfoStore> {
            match &base {
                Base::Memory => Arc::new(MemoryInfoStore::new(ttl)),
                Base::Sqlite(backend) => Arc::new(backend.info_store(kind, ttl)),
            }
        };
        let pending_store = |list: &'static str, ttl| -> Arc<dyn PendingStore> {
            match &base {
                Base::Memory => Arc::new(MemoryPendingStore::new(ttl)),
                Base::Sqlite(backend) => Arc::new(backend.pending_store(list, ttl)),
            }
        };
        let edges = |relation: Relation| -> Arc<dyn EdgeStore> {
            match &base {
                Base::Memory => Arc::new(MemoryEdgeStore::new()),
                Base::Sqlite(backend) => Arc::new(backend.edge_store(relation)),
            }
        };

        let papers = paper_registry.unwrap_or_else(|| registry(Kind::Paper));
        let authors = author_registry.unwrap_or_else(|| registry(Kind::Author));
        let venues = venue_registry.unwrap_or_else(|| registry(Kind::Venue));

        let pending_ttls = [
            ttl.pending.paper_authors,
            ttl.pending.author_papers,
            ttl.pending.paper_venues,
            ttl.pending.venue_papers,
            ttl.pending.paper_references,
            ttl.pending.paper_citations,
        ];
        let mut pending_slot = |slot: usize| -> Arc<dyn PendingStore> {
            pending[slot]
                .take()
                .unwrap_or_else(|| pending_store(PENDING_LISTS[slot], pending_ttls[slot]))
        };

        WeaverCache {
            papers: InfoManager::new(
                papers.clone(),
                paper_info.unwrap_or_else(|| info(Kind::Paper, ttl.paper_info)),
            ),
            authors: InfoManager::new(
                authors.clone(),
                author_info.unwrap_or_else(|| info(Kind::Author, ttl.author_info)),
            ),
            venues: InfoManager::new(
                venues.clone(),
                venue_info.unwrap_or_else(|| info(Kind::Venue, ttl.venue_info)),
            ),
            paper_authors: PendingManager::new(authors.clone(), pending_slot(PAPER_AUTHORS)),
            author_papers: PendingManager::new(papers.clone(), pending_slot(AUTHOR_PAPERS)),
            paper_venues: PendingManager::new(venues.clone(), pending_slot(PAPER_VENUES)),
            venue_papers: PendingManager::new(papers.clone(), pending_slot(VENUE_PAPERS)),
            paper_references: PendingManager::new(papers.clone(), pending_slot(PAPER_REFERENCES)),
            paper_citations: PendingManager::new(papers, pending_slot(PAPER_CITATIONS)),
            authored_edges: authored_edges.unwrap_or_else(|| edges(Relation::Authored)),
            published_in_edges: published_in_edges
                .unwrap_or_else(|| edges(Relation::PublishedIn)),
            cites_edges: cites_edges.unwrap_or_else(|| edges(Relation::Cites)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use models::{Entity, Paper};
    use serde_json::json;

    #[tokio::test]
    async fn overrides_mix_with_the_base_backend() {
        let durable = SqliteBackend::open_in_memory().unwrap();

        // Durable registry and edges, in-memory paper info.
        let cache = WeaverCacheBuilder::sqlite(durable.clone())
            .paper_info(Arc::new(MemoryInfoStore::new(None)))
            .build();

        cache
            .papers
            .set_info(&Paper::with(["doi:1"]), &json!({"title": "X"}))
            .await
            .unwrap();

        // The registry row went to SQLite; the info record did not.
        let registry = durable.registry(Kind::Paper);
        let identifiers = Paper::with(["doi:1"]).identifiers().clone();
        assert!(registry.canonical_of(&identifiers).await.unwrap().is_some());
        let durable_info = durable.info_store(Kind::Paper, None);
        let canonical = registry.canonical_of(&identifiers).await.unwrap().unwrap();
        assert_eq!(durable_info.get(canonical).await.unwrap(), None);

        // But reads through the cache still see it.
        let (_, _, info) = cache.papers.get_info(&Paper::with(["doi:1"])).await.unwrap();
        assert_eq!(info, Some(json!({"title": "X"})));
    }

    #[tokio::test]
    async fn memory_base_builds_a_working_cache() {
        let cache = WeaverCacheBuilder::memory().build();
        cache
            .papers
            .set_info(&Paper::with(["doi:1"]), &json!({}))
            .await
            .unwrap();
        assert_eq!(cache.papers.entities().await.unwrap().len(), 1);
    }
}
