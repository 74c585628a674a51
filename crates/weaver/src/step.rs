use crate::{DataSource, Destination, Error};
use cache::{EdgeStore, InfoManager, PendingManager};
use futures::future::BoxFuture;
use models::{Author, CanonicalId, Entity, Info, Paper, Relation, Venue};

/// One directed expansion, wired to the managers and stores of its
/// parent and child kinds. `swap` commits `(child, parent)` instead of
/// `(parent, child)`: set on the reverse passes (author→papers,
/// venue→papers) and on `CITED_BY`, whose edges reify as `CITES`.
pub(crate) struct StepBinding<'w, P: Entity, C: Entity> {
    pub label: &'static str,
    /// The relation as committed: always one of the reified three.
    pub relation: Relation,
    pub swap: bool,
    pub parents: &'w InfoManager<P>,
    pub children: &'w InfoManager<C>,
    pub pending: &'w PendingManager<C>,
    pub edges: &'w dyn EdgeStore,
    pub source: &'w dyn DataSource,
    pub destination: &'w dyn Destination,
}

#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct StepCounts {
    pub new_parents: usize,
    pub new_children: usize,
    pub new_edges: usize,
    pub failed_children: usize,
}

pub(crate) enum StepOutcome {
    Expanded(StepCounts),
    /// The parent's own info or child-list fetch failed; nothing else
    /// happened this step and a later pass retries the parent whole.
    ParentFailed,
}

enum ChildOutcome {
    Failed,
    Resolved { fresh: bool, new_edge: bool },
}

/// Expands one parent along one relation: resolve parent info, resolve
/// the pending child list, then resolve every child and commit its edge
/// at most once. Destination writes strictly precede the cache marks
/// that record them, so cached state always reflects durable state.
pub(crate) async fn expand<P, C, F>(
    bind: &StepBinding<'_, P, C>,
    parent: P,
    children_of: F,
) -> crate::Result<StepOutcome>
where
    P: SourceInfo,
    C: SourceInfo,
    F: for<'a> Fn(&'a dyn DataSource, &'a P) -> BoxFuture<'a, anyhow::Result<Vec<C>>>,
{
    // The parent enters the registry before anything can fail, so a
    // transiently failed seed is still found and retried next pass.
    let (mut parent_cid, parent) = match bind.parents.register(&parent).await {
        Ok(registered) => registered,
        Err(cache::Error::EmptyIdentifiers) => {
            tracing::warn!(pass = bind.label, "dropping parent without identifiers");
            return Ok(StepOutcome::ParentFailed);
        }
        Err(err) => return Err(err.into()),
    };

    let mut counts = StepCounts::default();

    // Stage 1: parent info, from cache or source.
    let (_, mut parent, cached) = bind.parents.get_info(&parent).await?;
    if cached.is_none() {
        let (updated, info) = match parent.fetch_info(bind.source).await {
            Ok(fetched) => fetched,
            Err(error) => {
                tracing::warn!(pass = bind.label, %parent, %error, "failed to fetch parent info");
                return Ok(StepOutcome::ParentFailed);
            }
        };
        let updated = updated.merged_with(&parent);
        bind.destination
            .save_info(P::KIND, updated.identifiers(), &info)
            .await
            .map_err(Error::Destination)?;
        let (cid, merged) = bind.parents.set_info(&updated, &info).await?;
        // The fetched identifiers may have folded this parent into
        // another class; continue under the surviving canonical.
        (parent_cid, parent) = (cid, merged);
        counts.new_parents = 1;
    }

    // Stage 2: the pending child list, from cache or source. An empty
    // cached list means "known to have no children" and stays empty.
    let children = match bind.pending.get(parent_cid).await? {
        Some(children) => children,
        None => {
            let found = match children_of(bind.source, &parent).await {
                Ok(found) => found,
                Err(error) => {
                    tracing::warn!(pass = bind.label, %parent, %error, "failed to fetch children");
                    return Ok(StepOutcome::ParentFailed);
                }
            };
            // A child with no identifiers at all can never be resolved.
            // Drop it before the list is persisted: counted failed once,
            // not retried.
            let (valid, invalid): (Vec<C>, Vec<C>) = found
                .into_iter()
                .partition(|child| !child.identifiers().is_empty());
            if !invalid.is_empty() {
                tracing::warn!(
                    pass = bind.label,
                    %parent,
                    dropped = invalid.len(),
                    "discarding children without identifiers"
                );
                counts.failed_children += invalid.len();
            }
            bind.pending.add(parent_cid, &valid).await?
        }
    };

    // Stage 3: children resolve concurrently. The fetch pool inside the
    // data source is what bounds the fan-out.
    let tasks = children
        .into_iter()
        .map(|child| process_child(bind, parent_cid, &parent, child));
    for outcome in futures::future::join_all(tasks).await {
        match outcome? {
            ChildOutcome::Failed => counts.failed_children += 1,
            ChildOutcome::Resolved { fresh, new_edge } => {
                counts.new_children += usize::from(fresh);
                counts.new_edges += usize::from(new_edge);
            }
        }
    }

    tracing::debug!(
        pass = bind.label,
        %parent,
        new_children = counts.new_children,
        new_edges = counts.new_edges,
        failed_children = counts.failed_children,
        "expanded parent"
    );
    Ok(StepOutcome::Expanded(counts))
}

async fn process_child<P, C>(
    bind: &StepBinding<'_, P, C>,
    parent_cid: CanonicalId,
    parent: &P,
    child: C,
) -> crate::Result<ChildOutcome>
where
    P: SourceInfo,
    C: SourceInfo,
{
    let (found, child, cached) = match bind.children.get_info(&child).await {
        Ok(resolved) => resolved,
        Err(cache::Error::EmptyIdentifiers) => {
            tracing::warn!(pass = bind.label, "dropping child without identifiers");
            return Ok(ChildOutcome::Failed);
        }
        Err(err) => return Err(err.into()),
    };

    let mut fresh = false;
    let (child_cid, child) = match (found, cached) {
        (Some(cid), Some(_)) => (cid, child),
        _ => {
            let (updated, info) = match child.fetch_info(bind.source).await {
                Ok(fetched) => fetched,
                Err(error) => {
                    tracing::warn!(pass = bind.label, %child, %error, "failed to fetch child info");
                    return Ok(ChildOutcome::Failed);
                }
            };
            let updated = updated.merged_with(&child);
            bind.destination
                .save_info(C::KIND, updated.identifiers(), &info)
                .await
                .map_err(Error::Destination)?;
            let (cid, merged) = bind.children.set_info(&updated, &info).await?;
            fresh = true;
            (cid, merged)
        }
    };

    // Commit the edge at most once. Two passes may race the same pair
    // from opposite directions; the destination's upsert absorbs that,
    // and the edge store records the pair exactly once either way.
    let (from_cid, to_cid) = if bind.swap {
        (child_cid, parent_cid)
    } else {
        (parent_cid, child_cid)
    };
    if bind.edges.contains(from_cid, to_cid).await? {
        return Ok(ChildOutcome::Resolved {
            fresh,
            new_edge: false,
        });
    }
    let (from_ids, to_ids) = if bind.swap {
        (child.identifiers(), parent.identifiers())
    } else {
        (parent.identifiers(), child.identifiers())
    };
    bind.destination
        .link(bind.relation, from_ids, to_ids)
        .await
        .map_err(Error::Destination)?;
    bind.edges.insert(from_cid, to_cid).await?;
    tracing::debug!(pass = bind.label, %parent, %child, "committed edge");
    Ok(ChildOutcome::Resolved {
        fresh,
        new_edge: true,
    })
}

/// Hooks each entity kind to its data-source info call, so the step
/// stays generic over kinds.
pub(crate) trait SourceInfo: Entity {
    fn fetch_info<'a>(
        &'a self,
        source: &'a dyn DataSource,
    ) -> BoxFuture<'a, anyhow::Result<(Self, Info)>>;
}

impl SourceInfo for Paper {
    fn fetch_info<'a>(
        &'a self,
        source: &'a dyn DataSource,
    ) -> BoxFuture<'a, anyhow::Result<(Paper, Info)>> {
        source.paper_info(self)
    }
}

impl SourceInfo for Author {
    fn fetch_info<'a>(
        &'a self,
        source: &'a dyn DataSource,
    ) -> BoxFuture<'a, anyhow::Result<(Author, Info)>> {
        source.author_info(self)
    }
}

impl SourceInfo for Venue {
    fn fetch_info<'a>(
        &'a self,
        source: &'a dyn DataSource,
    ) -> BoxFuture<'a, anyhow::Result<(Venue, Info)>> {
        source.venue_info(self)
    }
}
