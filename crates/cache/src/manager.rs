use crate::{IdentifierRegistry, InfoStore, PendingStore};
use indexmap::IndexMap;
use models::{CanonicalId, Entity, Info};
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

/// InfoManager couples one kind's identifier registry with its info
/// store, so callers address entities by whatever identifiers they hold
/// and always get back the full merged alias set.
pub struct InfoManager<E: Entity> {
    registry: Arc<dyn IdentifierRegistry>,
    store: Arc<dyn InfoStore>,
    _kind: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for InfoManager<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            store: self.store.clone(),
            _kind: PhantomData,
        }
    }
}

impl<E: Entity> InfoManager<E> {
    pub fn new(registry: Arc<dyn IdentifierRegistry>, store: Arc<dyn InfoStore>) -> Self {
        Self {
            registry,
            store,
            _kind: PhantomData,
        }
    }

    pub fn registry(&self) -> &Arc<dyn IdentifierRegistry> {
        &self.registry
    }

    /// Looks up an entity by its identifiers. On a hit the probe's
    /// identifiers are folded into the equivalence class, so lookups
    /// enrich the registry as a side effect.
    pub async fn get_info(
        &self,
        entity: &E,
    ) -> crate::Result<(Option<CanonicalId>, E, Option<Info>)> {
        if self
            .registry
            .canonical_of(entity.identifiers())
            .await?
            .is_none()
        {
            return Ok((None, entity.clone(), None));
        }
        let canonical = self.registry.register(entity.identifiers()).await?;
        let aliases = self.registry.aliases_of(canonical).await?;
        let info = self.store.get(canonical).await?;
        Ok((Some(canonical), E::new(aliases), info))
    }

    /// Registers the entity and overwrites its info record.
    pub async fn set_info(&self, entity: &E, info: &Info) -> crate::Result<(CanonicalId, E)> {
        let canonical = self.registry.register(entity.identifiers()).await?;
        self.store.set(canonical, info).await?;
        let aliases = self.registry.aliases_of(canonical).await?;
        Ok((canonical, E::new(aliases)))
    }

    /// Registers the entity without touching info.
    pub async fn register(&self, entity: &E) -> crate::Result<(CanonicalId, E)> {
        let canonical = self.registry.register(entity.identifiers()).await?;
        let aliases = self.registry.aliases_of(canonical).await?;
        Ok((canonical, E::new(aliases)))
    }

    /// A snapshot of every registered entity with its full alias set.
    pub async fn entities(&self) -> crate::Result<Vec<(CanonicalId, E)>> {
        let mut out = Vec::new();
        for canonical in self.registry.enumerate().await? {
            let aliases = self.registry.aliases_of(canonical).await?;
            if aliases.is_empty() {
                // Merged away between the snapshot and this read.
                continue;
            }
            out.push((canonical, E::new(aliases)));
        }
        Ok(out)
    }
}

/// PendingManager couples the child kind's registry with one relation's
/// pending-list store. Children are registered the moment they are
/// listed, the stored list is deduplicated by canonical ID, and reads
/// always reflect the current identifier closure of every child.
pub struct PendingManager<C: Entity> {
    registry: Arc<dyn IdentifierRegistry>,
    store: Arc<dyn PendingStore>,
    _kind: PhantomData<fn() -> C>,
}

impl<C: Entity> Clone for PendingManager<C> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            store: self.store.clone(),
            _kind: PhantomData,
        }
    }
}

impl<C: Entity> PendingManager<C> {
    pub fn new(registry: Arc<dyn IdentifierRegistry>, store: Arc<dyn PendingStore>) -> Self {
        Self {
            registry,
            store,
            _kind: PhantomData,
        }
    }

    async fn resolve(
        &self,
        parent: CanonicalId,
    ) -> crate::Result<Option<IndexMap<CanonicalId, BTreeSet<String>>>> {
        let Some(stored) = self.store.get(parent).await? else {
            return Ok(None);
        };
        let mut resolved = IndexMap::with_capacity(stored.len());
        for identifiers in stored {
            let canonical = self.registry.register(&identifiers).await?;
            let aliases = self.registry.aliases_of(canonical).await?;
            resolved.insert(canonical, aliases);
        }
        Ok(Some(resolved))
    }

    /// The pending children of `parent`, with merged identifiers, or
    /// None if the list was never set. `Some(vec![])` means the parent
    /// is known to have no children of this kind.
    pub async fn get(&self, parent: CanonicalId) -> crate::Result<Option<Vec<C>>> {
        let Some(resolved) = self.resolve(parent).await? else {
            return Ok(None);
        };
        Ok(Some(
            resolved.into_iter().map(|(_, ids)| C::new(ids)).collect(),
        ))
    }

    /// Merges `children` into the stored list: existing entries keep
    /// their position, new canonical IDs append in input order, and a
    /// richer identifier set for a known child replaces its stored
    /// aliases. Returns the merged entity for each input position.
    pub async fn add(&self, parent: CanonicalId, children: &[C]) -> crate::Result<Vec<C>> {
        let mut merged = self.resolve(parent).await?.unwrap_or_default();
        let mut updated = Vec::with_capacity(children.len());
        for child in children {
            let canonical = self.registry.register(child.identifiers()).await?;
            let aliases = self.registry.aliases_of(canonical).await?;
            merged.insert(canonical, aliases.clone());
            updated.push(C::new(aliases));
        }
        let stored: Vec<BTreeSet<String>> = merged.into_iter().map(|(_, ids)| ids).collect();
        self.store.set(parent, &stored).await?;
        Ok(updated)
    }
}
