use crate::step::{expand, SourceInfo, StepBinding, StepOutcome};
use crate::{DataSource, Destination, Error, PassCounts, RunConfig, SeedSource, Seeds};
use cache::{InfoManager, WeaverCache};
use futures::future::BoxFuture;
use models::{Author, Entity, Paper, Relation, Venue};
use std::future::Future;
use std::sync::Arc;

/// Weaver drives repeated frontier passes over the registry until a
/// pass discovers nothing new, or the configured iteration bound is
/// reached.
///
/// All state lives in the cache passed at construction: drivers hold no
/// globals, and several may coexist over disjoint caches.
pub struct Weaver {
    cache: WeaverCache,
    source: Arc<dyn DataSource>,
    destination: Arc<dyn Destination>,
    seeds: Arc<dyn SeedSource>,
    run: RunConfig,
}

impl Weaver {
    pub fn new(
        cache: WeaverCache,
        source: Arc<dyn DataSource>,
        destination: Arc<dyn Destination>,
        seeds: Arc<dyn SeedSource>,
        run: RunConfig,
    ) -> Self {
        Self {
            cache,
            source,
            destination,
            seeds,
            run,
        }
    }

    /// Builds the cache from configuration and wires up a driver.
    pub fn from_config(
        config: &crate::Config,
        source: Arc<dyn DataSource>,
        destination: Arc<dyn Destination>,
        seeds: Arc<dyn SeedSource>,
    ) -> crate::Result<Self> {
        Ok(Self::new(
            WeaverCache::from_config(&config.cache)?,
            source,
            destination,
            seeds,
            config.run.clone(),
        ))
    }

    pub fn cache(&self) -> &WeaverCache {
        &self.cache
    }

    /// Drains the seed source, registers every seed, and expands each
    /// along the first enabled relation matching its kind.
    pub async fn init(&self) -> crate::Result<PassCounts> {
        let seeds = self.seeds.seeds().await.map_err(Error::Seeds)?;
        let enabled = self.run.enabled_relations();
        let mut counts = PassCounts::default();

        match seeds {
            Seeds::Papers(papers) => {
                let papers = register_seeds(&self.cache.papers, papers, &mut counts).await?;
                // Paper seeds expand along the first enabled paper-parent
                // relation; remaining relations catch up on the first pass.
                if enabled.contains(&Relation::Authored) {
                    counts += self.paper_to_authors(papers).await?;
                } else if enabled.contains(&Relation::PublishedIn) {
                    counts += self.paper_to_venues(papers).await?;
                } else if enabled.contains(&Relation::Cites) {
                    counts += self.paper_to_references(papers).await?;
                } else if enabled.contains(&Relation::CitedBy) {
                    counts += self.paper_to_citations(papers).await?;
                }
            }
            Seeds::Authors(authors) => {
                let authors = register_seeds(&self.cache.authors, authors, &mut counts).await?;
                if enabled.contains(&Relation::Authored) {
                    counts += self.author_to_papers(authors).await?;
                }
            }
            Seeds::Venues(venues) => {
                let venues = register_seeds(&self.cache.venues, venues, &mut counts).await?;
                if enabled.contains(&Relation::PublishedIn) {
                    counts += self.venue_to_papers(venues).await?;
                }
            }
        }

        tracing::info!(
            new_entities = counts.new_entities(),
            new_edges = counts.new_edges,
            failed_parents = counts.failed_parents,
            failed_children = counts.failed_children,
            "completed seeding"
        );
        Ok(counts)
    }

    /// One frontier pass: every enabled relation, in fixed order, over a
    /// snapshot of the relevant registries. Parents within a relation
    /// pass expand concurrently; relation passes run in sequence so a
    /// pass sees what its predecessor cached.
    pub async fn step(&self) -> crate::Result<PassCounts> {
        let mut counts = PassCounts::default();
        for relation in self.run.enabled_relations() {
            match relation {
                Relation::Authored => {
                    counts += self.author_to_papers(self.authors_snapshot().await?).await?;
                    counts += self.paper_to_authors(self.papers_snapshot().await?).await?;
                }
                Relation::PublishedIn => {
                    counts += self.paper_to_venues(self.papers_snapshot().await?).await?;
                }
                Relation::Cites => {
                    counts += self
                        .paper_to_references(self.papers_snapshot().await?)
                        .await?;
                }
                Relation::CitedBy => {
                    counts += self
                        .paper_to_citations(self.papers_snapshot().await?)
                        .await?;
                }
            }
        }
        Ok(counts)
    }

    /// Seeds, then steps until quiescence or the iteration bound.
    /// Returns cumulative counts.
    pub async fn run(&self) -> crate::Result<PassCounts> {
        self.run_until(std::future::pending()).await
    }

    /// As [`Weaver::run`], but stops early once `shutdown` resolves.
    /// The in-flight pass is finished first, so the returned partial
    /// counts describe only durable state.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> crate::Result<PassCounts> {
        tokio::pin!(shutdown);

        let mut total = self.init().await?;
        let mut passes = 0u32;
        let mut stopped = false;

        while !stopped && (self.run.max_iterations == 0 || passes < self.run.max_iterations) {
            passes += 1;
            let step = self.step();
            tokio::pin!(step);
            let counts = loop {
                tokio::select! {
                    biased;
                    () = &mut shutdown, if !stopped => {
                        stopped = true;
                        tracing::info!("shutdown signalled; finishing the in-flight pass");
                    }
                    result = &mut step => break result?,
                }
            };

            tracing::info!(
                pass = passes,
                new_entities = counts.new_entities(),
                new_edges = counts.new_edges,
                failed_parents = counts.failed_parents,
                failed_children = counts.failed_children,
                "completed pass"
            );
            total += counts;
            if counts.is_quiescent() {
                break;
            }
        }

        tracing::info!(
            passes,
            total_new_entities = total.new_entities(),
            total_new_edges = total.new_edges,
            total_failed_parents = total.failed_parents,
            total_failed_children = total.failed_children,
            "run complete"
        );
        Ok(total)
    }

    async fn papers_snapshot(&self) -> crate::Result<Vec<Paper>> {
        let entities = self.cache.papers.entities().await?;
        Ok(entities.into_iter().map(|(_, paper)| paper).collect())
    }

    async fn authors_snapshot(&self) -> crate::Result<Vec<Author>> {
        let entities = self.cache.authors.entities().await?;
        Ok(entities.into_iter().map(|(_, author)| author).collect())
    }

    async fn paper_to_authors(&self, papers: Vec<Paper>) -> crate::Result<PassCounts> {
        self.expand_parents(
            StepBinding {
                label: "paper_to_authors",
                relation: Relation::Authored,
                swap: false,
                parents: &self.cache.papers,
                children: &self.cache.authors,
                pending: &self.cache.paper_authors,
                edges: self.cache.authored_edges.as_ref(),
                source: self.source.as_ref(),
                destination: self.destination.as_ref(),
            },
            papers,
            paper_authors_of,
        )
        .await
    }

    async fn author_to_papers(&self, authors: Vec<Author>) -> crate::Result<PassCounts> {
        self.expand_parents(
            StepBinding {
                label: "author_to_papers",
                relation: Relation::Authored,
                swap: true,
                parents: &self.cache.authors,
                children: &self.cache.papers,
                pending: &self.cache.author_papers,
                edges: self.cache.authored_edges.as_ref(),
                source: self.source.as_ref(),
                destination: self.destination.as_ref(),
            },
            authors,
            author_papers_of,
        )
        .await
    }

    async fn paper_to_venues(&self, papers: Vec<Paper>) -> crate::Result<PassCounts> {
        self.expand_parents(
            StepBinding {
                label: "paper_to_venues",
                relation: Relation::PublishedIn,
                swap: false,
                parents: &self.cache.papers,
                children: &self.cache.venues,
                pending: &self.cache.paper_venues,
                edges: self.cache.published_in_edges.as_ref(),
                source: self.source.as_ref(),
                destination: self.destination.as_ref(),
            },
            papers,
            paper_venues_of,
        )
        .await
    }

    async fn venue_to_papers(&self, venues: Vec<Venue>) -> crate::Result<PassCounts> {
        self.expand_parents(
            StepBinding {
                label: "venue_to_papers",
                relation: Relation::PublishedIn,
                swap: true,
                parents: &self.cache.venues,
                children: &self.cache.papers,
                pending: &self.cache.venue_papers,
                edges: self.cache.published_in_edges.as_ref(),
                source: self.source.as_ref(),
                destination: self.destination.as_ref(),
            },
            venues,
            venue_papers_of,
        )
        .await
    }

    async fn paper_to_references(&self, papers: Vec<Paper>) -> crate::Result<PassCounts> {
        self.expand_parents(
            StepBinding {
                label: "paper_to_references",
                relation: Relation::Cites,
                swap: false,
                parents: &self.cache.papers,
                children: &self.cache.papers,
                pending: &self.cache.paper_references,
                edges: self.cache.cites_edges.as_ref(),
                source: self.source.as_ref(),
                destination: self.destination.as_ref(),
            },
            papers,
            paper_references_of,
        )
        .await
    }

    // CITED_BY(p, q) reifies as CITES(q, p): same edge namespace as the
    // reference pass, pair swapped.
    async fn paper_to_citations(&self, papers: Vec<Paper>) -> crate::Result<PassCounts> {
        let (relation, swap) = Relation::CitedBy.reified();
        self.expand_parents(
            StepBinding {
                label: "paper_to_citations",
                relation,
                swap,
                parents: &self.cache.papers,
                children: &self.cache.papers,
                pending: &self.cache.paper_citations,
                edges: self.cache.cites_edges.as_ref(),
                source: self.source.as_ref(),
                destination: self.destination.as_ref(),
            },
            papers,
            paper_citations_of,
        )
        .await
    }

    async fn expand_parents<P, C, F>(
        &self,
        binding: StepBinding<'_, P, C>,
        parents: Vec<P>,
        children_of: F,
    ) -> crate::Result<PassCounts>
    where
        P: SourceInfo,
        C: SourceInfo,
        F: for<'a> Fn(&'a dyn DataSource, &'a P) -> BoxFuture<'a, anyhow::Result<Vec<C>>> + Copy,
    {
        let total = parents.len();
        let tasks = parents
            .into_iter()
            .map(|parent| expand(&binding, parent, children_of));

        let mut counts = PassCounts::default();
        for outcome in futures::future::join_all(tasks).await {
            match outcome? {
                StepOutcome::Expanded(step) => {
                    counts.new_parents += step.new_parents;
                    counts.new_children += step.new_children;
                    counts.new_edges += step.new_edges;
                    counts.failed_children += step.failed_children;
                }
                StepOutcome::ParentFailed => counts.failed_parents += 1,
            }
        }

        tracing::info!(
            pass = binding.label,
            parents = total,
            new_parents = counts.new_parents,
            new_children = counts.new_children,
            new_edges = counts.new_edges,
            failed_parents = counts.failed_parents,
            failed_children = counts.failed_children,
            "completed relation pass"
        );
        Ok(counts)
    }
}

async fn register_seeds<E: Entity>(
    manager: &InfoManager<E>,
    seeds: Vec<E>,
    counts: &mut PassCounts,
) -> crate::Result<Vec<E>> {
    let mut registered = Vec::with_capacity(seeds.len());
    for seed in seeds {
        match manager.register(&seed).await {
            Ok((_, merged)) => registered.push(merged),
            Err(cache::Error::EmptyIdentifiers) => {
                tracing::warn!(%seed, "dropping seed without identifiers");
                counts.failed_parents += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(registered)
}

fn paper_authors_of<'a>(
    source: &'a dyn DataSource,
    paper: &'a Paper,
) -> BoxFuture<'a, anyhow::Result<Vec<Author>>> {
    source.paper_authors(paper)
}

fn author_papers_of<'a>(
    source: &'a dyn DataSource,
    author: &'a Author,
) -> BoxFuture<'a, anyhow::Result<Vec<Paper>>> {
    source.author_papers(author)
}

fn paper_venues_of<'a>(
    source: &'a dyn DataSource,
    paper: &'a Paper,
) -> BoxFuture<'a, anyhow::Result<Vec<Venue>>> {
    source.paper_venues(paper)
}

fn venue_papers_of<'a>(
    source: &'a dyn DataSource,
    venue: &'a Venue,
) -> BoxFuture<'a, anyhow::Result<Vec<Paper>>> {
    source.venue_papers(venue)
}

fn paper_references_of<'a>(
    source: &'a dyn DataSource,
    paper: &'a Paper,
) -> BoxFuture<'a, anyhow::Result<Vec<Paper>>> {
    source.paper_references(paper)
}

fn paper_citations_of<'a>(
    source: &'a dyn DataSource,
    paper: &'a Paper,
) -> BoxFuture<'a, anyhow::Result<Vec<Paper>>> {
    source.paper_citations(paper)
}
