mod builder;
mod composite;
mod manager;
mod memory;
mod sqlite;
mod stores;

pub use builder::WeaverCacheBuilder;
pub use composite::{Backend, Config, PendingTtl, TtlConfig, WeaverCache};
pub use manager::{InfoManager, PendingManager};
pub use memory::{MemoryEdgeStore, MemoryInfoStore, MemoryPendingStore, MemoryRegistry};
pub use sqlite::SqliteBackend;
pub use stores::{EdgeStore, IdentifierRegistry, InfoStore, PendingStore};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The entity carries no identifiers at all. Deterministic: such an
    /// entity can never be resolved, so callers must not retry it.
    #[error("entity has no identifiers")]
    EmptyIdentifiers,
    #[error("invalid cache configuration: {0}")]
    Config(String),
    // rusqlite does a pretty good job of showing context in its errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to encode cached value")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
