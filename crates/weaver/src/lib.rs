mod config;
mod contracts;
mod counts;
mod driver;
mod step;

pub use config::{Config, DataSourceConfig, RunConfig, SourceCacheTtl};
pub use contracts::{DataSource, Destination, SeedSource, Seeds};
pub use counts::PassCounts;
pub use driver::Weaver;

// Drivers are constructed over the composite cache; re-exported so
// embedders don't need a direct `cache` dependency for the common path.
pub use cache::WeaverCache;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] cache::Error),
    /// A destination write failed. The corresponding cache entry was
    /// deliberately not written, so nothing falsely reads as durable.
    #[error("destination write failed")]
    Destination(#[source] anyhow::Error),
    #[error("seed source failed")]
    Seeds(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
