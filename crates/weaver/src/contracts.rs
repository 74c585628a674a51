use models::{Author, Info, Kind, Paper, Relation, Venue};
use std::collections::BTreeSet;

/// DataSource adapts one upstream bibliographic service.
///
/// Info calls return the probed entity enriched with any further
/// identifiers the service knows (a DOI found alongside an arXiv id,
/// say) together with its info record. Every error is treated as
/// transient by the engine: the affected entity is counted as failed
/// and retried on a later frontier pass, so adapters should not retry
/// internally beyond their own rate-limit handling.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    async fn paper_info(&self, paper: &Paper) -> anyhow::Result<(Paper, Info)>;
    async fn paper_authors(&self, paper: &Paper) -> anyhow::Result<Vec<Author>>;
    async fn paper_venues(&self, paper: &Paper) -> anyhow::Result<Vec<Venue>>;
    /// Papers the given paper cites.
    async fn paper_references(&self, paper: &Paper) -> anyhow::Result<Vec<Paper>>;
    /// Papers citing the given paper.
    async fn paper_citations(&self, paper: &Paper) -> anyhow::Result<Vec<Paper>>;
    async fn author_info(&self, author: &Author) -> anyhow::Result<(Author, Info)>;
    async fn author_papers(&self, author: &Author) -> anyhow::Result<Vec<Paper>>;
    async fn venue_info(&self, venue: &Venue) -> anyhow::Result<(Venue, Info)>;
    async fn venue_papers(&self, venue: &Venue) -> anyhow::Result<Vec<Paper>>;
}

/// Destination receives the woven graph. Both operations are idempotent
/// upserts, may run concurrently, and must merge nodes sharing any
/// identifier — the same equivalence the engine's registry maintains.
///
/// `CITED_BY` never reaches a destination: it is delivered as `CITES`
/// with the pair swapped, so destinations reify one direction only.
///
/// Unlike data-source failures, a destination error is fatal to the
/// running pass: the engine refuses to mark state it could not write.
#[async_trait::async_trait]
pub trait Destination: Send + Sync {
    async fn save_info(
        &self,
        kind: Kind,
        identifiers: &BTreeSet<String>,
        info: &Info,
    ) -> anyhow::Result<()>;

    async fn link(
        &self,
        relation: Relation,
        parent: &BTreeSet<String>,
        child: &BTreeSet<String>,
    ) -> anyhow::Result<()>;
}

/// A finite seed set of a single kind. The driver picks the matching
/// per-relation expansion from the kind.
#[derive(Clone, Debug)]
pub enum Seeds {
    Papers(Vec<Paper>),
    Authors(Vec<Author>),
    Venues(Vec<Venue>),
}

#[async_trait::async_trait]
pub trait SeedSource: Send + Sync {
    async fn seeds(&self) -> anyhow::Result<Seeds>;
}

// A fixed seed set is itself a seed source.
#[async_trait::async_trait]
impl SeedSource for Seeds {
    async fn seeds(&self) -> anyhow::Result<Seeds> {
        Ok(self.clone())
    }
}
