use crate::{EdgeStore, Error, IdentifierRegistry, InfoStore, PendingStore};
use models::{CanonicalId, Info};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// In-memory identifier registry: a union-find over identifier strings,
/// serialised behind one mutex. The critical section is pure map work
/// and never awaits.
pub struct MemoryRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    ident_to_canonical: HashMap<String, CanonicalId>,
    canonical_to_idents: BTreeMap<CanonicalId, BTreeSet<String>>,
    next: i64,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdentifierRegistry for MemoryRegistry {
    async fn canonical_of(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> crate::Result<Option<CanonicalId>> {
        if identifiers.is_empty() {
            return Err(Error::EmptyIdentifiers);
        }
        let state = self.state.lock().unwrap();
        Ok(identifiers
            .iter()
            .find_map(|ident| state.ident_to_canonical.get(ident).copied()))
    }

    async fn register(&self, identifiers: &BTreeSet<String>) -> crate::Result<CanonicalId> {
        if identifiers.is_empty() {
            return Err(Error::EmptyIdentifiers);
        }
        let mut state = self.state.lock().unwrap();

        let existing: BTreeSet<CanonicalId> = identifiers
            .iter()
            .filter_map(|ident| state.ident_to_canonical.get(ident).copied())
            .collect();

        let Some(&primary) = existing.iter().next() else {
            // No overlap with any known entity: mint a fresh canonical.
            state.next += 1;
            let canonical = CanonicalId::from_i64(state.next);
            for ident in identifiers {
                state.ident_to_canonical.insert(ident.clone(), canonical);
            }
            state
                .canonical_to_idents
                .insert(canonical, identifiers.clone());
            return Ok(canonical);
        };

        // Union all overlapped classes plus the new identifiers under the
        // primary, rewrite the pointer map, and drop the losers from the
        // enumeration.
        let mut all = identifiers.clone();
        for canonical in &existing {
            if let Some(idents) = state.canonical_to_idents.get(canonical) {
                all.extend(idents.iter().cloned());
            }
        }
        for ident in &all {
            state.ident_to_canonical.insert(ident.clone(), primary);
        }
        for canonical in &existing {
            if *canonical != primary {
                state.canonical_to_idents.remove(canonical);
            }
        }
        state.canonical_to_idents.insert(primary, all);
        Ok(primary)
    }

    async fn aliases_of(&self, canonical: CanonicalId) -> crate::Result<BTreeSet<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .canonical_to_idents
            .get(&canonical)
            .cloned()
            .unwrap_or_default())
    }

    async fn enumerate(&self) -> crate::Result<Vec<CanonicalId>> {
        let state = self.state.lock().unwrap();
        Ok(state.canonical_to_idents.keys().copied().collect())
    }
}

/// In-memory info store with optional expiry; an expired record reads
/// as absent and is dropped on access.
pub struct MemoryInfoStore {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<CanonicalId, (Info, Option<Instant>)>>,
}

impl MemoryInfoStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl InfoStore for MemoryInfoStore {
    async fn get(&self, canonical: CanonicalId) -> crate::Result<Option<Info>> {
        let mut entries = self.entries.lock().unwrap();
        let expired = match entries.get(&canonical) {
            None => return Ok(None),
            Some((_, Some(expires))) => *expires <= Instant::now(),
            Some((_, None)) => false,
        };
        if expired {
            entries.remove(&canonical);
            return Ok(None);
        }
        Ok(entries.get(&canonical).map(|(info, _)| info.clone()))
    }

    async fn set(&self, canonical: CanonicalId, info: &Info) -> crate::Result<()> {
        let expires = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .unwrap()
            .insert(canonical, (info.clone(), expires));
        Ok(())
    }
}

/// In-memory pending-list store with optional expiry.
pub struct MemoryPendingStore {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<CanonicalId, (Vec<BTreeSet<String>>, Option<Instant>)>>,
}

impl MemoryPendingStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl PendingStore for MemoryPendingStore {
    async fn get(&self, parent: CanonicalId) -> crate::Result<Option<Vec<BTreeSet<String>>>> {
        let mut entries = self.entries.lock().unwrap();
        let expired = match entries.get(&parent) {
            None => return Ok(None),
            Some((_, Some(expires))) => *expires <= Instant::now(),
            Some((_, None)) => false,
        };
        if expired {
            entries.remove(&parent);
            return Ok(None);
        }
        Ok(entries.get(&parent).map(|(children, _)| children.clone()))
    }

    async fn set(&self, parent: CanonicalId, children: &[BTreeSet<String>]) -> crate::Result<()> {
        let expires = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .unwrap()
            .insert(parent, (children.to_vec(), expires));
        Ok(())
    }
}

/// In-memory committed-edge set. Check-then-commit races are absorbed by
/// the idempotent insert.
#[derive(Default)]
pub struct MemoryEdgeStore {
    edges: Mutex<HashSet<(CanonicalId, CanonicalId)>>,
}

impl MemoryEdgeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl EdgeStore for MemoryEdgeStore {
    async fn contains(&self, parent: CanonicalId, child: CanonicalId) -> crate::Result<bool> {
        Ok(self.edges.lock().unwrap().contains(&(parent, child)))
    }

    async fn insert(&self, parent: CanonicalId, child: CanonicalId) -> crate::Result<bool> {
        Ok(self.edges.lock().unwrap().insert((parent, child)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn ids<const N: usize>(raw: [&str; N]) -> BTreeSet<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn register_mints_and_merges() {
        let registry = MemoryRegistry::new();

        let a = registry.register(&ids(["doi:1"])).await.unwrap();
        let b = registry.register(&ids(["arxiv:2"])).await.unwrap();
        assert_ne!(a, b);

        // Overlapping registration folds both classes into one.
        let c = registry.register(&ids(["doi:1", "arxiv:2"])).await.unwrap();
        assert_eq!(
            registry.canonical_of(&ids(["doi:1"])).await.unwrap(),
            Some(c)
        );
        assert_eq!(
            registry.canonical_of(&ids(["arxiv:2"])).await.unwrap(),
            Some(c)
        );
        assert_eq!(registry.aliases_of(c).await.unwrap(), ids(["doi:1", "arxiv:2"]));
        assert_eq!(registry.enumerate().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn canonical_of_is_a_pure_query() {
        let registry = MemoryRegistry::new();
        let a = registry.register(&ids(["x:1"])).await.unwrap();
        let b = registry.register(&ids(["x:2"])).await.unwrap();

        // Querying with members of both classes picks one but merges nothing.
        let picked = registry
            .canonical_of(&ids(["x:1", "x:2"]))
            .await
            .unwrap()
            .unwrap();
        assert!(picked == a || picked == b);
        assert_eq!(registry.enumerate().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn register_rejects_empty_sets() {
        let registry = MemoryRegistry::new();
        assert!(matches!(
            registry.register(&BTreeSet::new()).await,
            Err(Error::EmptyIdentifiers)
        ));
        assert!(matches!(
            registry.canonical_of(&BTreeSet::new()).await,
            Err(Error::EmptyIdentifiers)
        ));
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = MemoryRegistry::new();
        let a = registry.register(&ids(["doi:1", "ss:2"])).await.unwrap();
        let b = registry.register(&ids(["doi:1", "ss:2"])).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.enumerate().await.unwrap(), vec![a]);
    }

    // Merge closure: registering any chain of overlapping sets leaves
    // every touched identifier under one canonical ID.
    #[quickcheck_macros::quickcheck]
    fn merge_closure_over_chained_sets(chain: Vec<Vec<u8>>) -> bool {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            let registry = MemoryRegistry::new();
            let mut prev: Option<String> = None;
            for (i, raw) in chain.iter().enumerate() {
                // Link every set to the previous one through a shared member.
                let mut set: BTreeSet<String> = raw.iter().map(|b| format!("id:{b}")).collect();
                set.insert(format!("link:{i}"));
                if let Some(prev) = prev.take() {
                    set.insert(prev);
                }
                prev = Some(format!("link:{i}"));
                registry.register(&set).await.unwrap();
            }
            if chain.is_empty() {
                return true;
            }
            // All linked sets collapsed to a single canonical.
            registry.enumerate().await.unwrap().len() == 1
        })
    }

    // Disjoint identifier sets never merge: the partition stays exactly
    // as fine as the inputs.
    #[quickcheck_macros::quickcheck]
    fn disjoint_singletons_stay_distinct(raw: Vec<u8>) -> bool {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            let registry = MemoryRegistry::new();
            let mut distinct = BTreeSet::new();
            for b in &raw {
                let set: BTreeSet<String> = [format!("id:{b}")].into_iter().collect();
                registry.register(&set).await.unwrap();
                distinct.insert(*b);
            }
            registry.enumerate().await.unwrap().len() == distinct.len()
        })
    }

    // Aliases only ever grow.
    #[quickcheck_macros::quickcheck]
    fn aliases_are_monotonic(sets: Vec<Vec<u8>>) -> bool {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            let registry = MemoryRegistry::new();
            let mut sizes: HashMap<CanonicalId, usize> = HashMap::new();
            for raw in &sets {
                if raw.is_empty() {
                    continue;
                }
                let set: BTreeSet<String> = raw.iter().map(|b| format!("id:{}", b % 16)).collect();
                let canonical = registry.register(&set).await.unwrap();
                let n = registry.aliases_of(canonical).await.unwrap().len();
                if let Some(prior) = sizes.insert(canonical, n) {
                    if n < prior {
                        return false;
                    }
                }
            }
            true
        })
    }

    #[tokio::test]
    async fn info_store_expires_entries() {
        let store = MemoryInfoStore::new(Some(Duration::from_millis(20)));
        let canonical = CanonicalId::from_i64(1);
        store.set(canonical, &json!({"title": "X"})).await.unwrap();
        assert_eq!(
            store.get(canonical).await.unwrap(),
            Some(json!({"title": "X"}))
        );
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get(canonical).await.unwrap(), None);
    }

    #[tokio::test]
    async fn pending_store_distinguishes_unset_from_empty() {
        let store = MemoryPendingStore::new(None);
        let parent = CanonicalId::from_i64(1);
        assert_eq!(store.get(parent).await.unwrap(), None);
        store.set(parent, &[]).await.unwrap();
        assert_eq!(store.get(parent).await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn edge_store_insert_reports_novelty() {
        let store = MemoryEdgeStore::new();
        let (p, c) = (CanonicalId::from_i64(1), CanonicalId::from_i64(2));
        assert!(!store.contains(p, c).await.unwrap());
        assert!(store.insert(p, c).await.unwrap());
        assert!(!store.insert(p, c).await.unwrap());
        assert!(store.contains(p, c).await.unwrap());
        // Directional: the reverse pair is independent.
        assert!(!store.contains(c, p).await.unwrap());
    }
}
