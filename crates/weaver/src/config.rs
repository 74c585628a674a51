use fetch_pool::{FetchCache, Pool};
use models::Relation;
use std::sync::Arc;
use std::time::Duration;

/// Engine configuration: cache backend and TTLs, data-source pooling,
/// and the run policy.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    pub cache: cache::Config,
    pub datasource: DataSourceConfig,
    pub run: RunConfig,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DataSourceConfig {
    /// Fetch-pool semaphore size: the global bound on concurrent
    /// requests into one data source.
    pub max_concurrent: usize,
    /// Per-request timeout. A timed-out fetch reads as a transient miss.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Raw-response cache expiry, per entity kind.
    pub cache_ttl: SourceCacheTtl,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            timeout: None,
            cache_ttl: SourceCacheTtl::default(),
        }
    }
}

impl DataSourceConfig {
    /// The fetch pool a data-source adapter should route its requests
    /// through.
    pub fn pool<T: Clone + Send + Sync + 'static>(&self, cache: Arc<dyn FetchCache<T>>) -> Pool<T> {
        Pool::new(cache, self.max_concurrent, self.timeout)
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SourceCacheTtl {
    #[serde(with = "humantime_serde")]
    pub paper: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub author: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub venue: Option<Duration>,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RunConfig {
    /// Upper bound on frontier passes; 0 runs until quiescent.
    pub max_iterations: u32,
    /// Enabled relations. Order is immaterial: passes always run in the
    /// fixed `AUTHORED, PUBLISHED_IN, CITES, CITED_BY` order.
    pub relations: Vec<Relation>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 0,
            relations: Relation::ALL.to_vec(),
        }
    }
}

impl RunConfig {
    pub(crate) fn enabled_relations(&self) -> Vec<Relation> {
        Relation::ALL
            .iter()
            .copied()
            .filter(|relation| self.relations.contains(relation))
            .collect()
    }
}
