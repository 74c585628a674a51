//! The same contract suite, run against both store backends through the
//! trait objects the managers actually consume.

use cache::{
    EdgeStore, IdentifierRegistry, InfoManager, InfoStore, MemoryEdgeStore, MemoryInfoStore,
    MemoryPendingStore, MemoryRegistry, PendingManager, PendingStore, SqliteBackend,
};
use models::{Author, CanonicalId, Entity, Kind, Paper, Relation};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

struct Stores {
    registry: Arc<dyn IdentifierRegistry>,
    info: Arc<dyn InfoStore>,
    pending: Arc<dyn PendingStore>,
    edges: Arc<dyn EdgeStore>,
}

fn memory_stores() -> Stores {
    Stores {
        registry: Arc::new(MemoryRegistry::new()),
        info: Arc::new(MemoryInfoStore::new(None)),
        pending: Arc::new(MemoryPendingStore::new(None)),
        edges: Arc::new(MemoryEdgeStore::new()),
    }
}

fn sqlite_stores() -> Stores {
    let backend = SqliteBackend::open_in_memory().unwrap();
    Stores {
        registry: Arc::new(backend.registry(Kind::Paper)),
        info: Arc::new(backend.info_store(Kind::Paper, None)),
        pending: Arc::new(backend.pending_store("paper_references", None)),
        edges: Arc::new(backend.edge_store(Relation::Cites)),
    }
}

fn each_backend() -> Vec<(&'static str, Stores)> {
    vec![("memory", memory_stores()), ("sqlite", sqlite_stores())]
}

fn ids<const N: usize>(raw: [&str; N]) -> BTreeSet<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn registry_contract() {
    for (name, stores) in each_backend() {
        let registry = &stores.registry;

        // Fresh sets mint distinct canonicals; overlap merges them.
        let a = registry.register(&ids(["doi:a"])).await.unwrap();
        let b = registry.register(&ids(["doi:b"])).await.unwrap();
        assert_ne!(a, b, "{name}");

        let merged = registry.register(&ids(["doi:a", "doi:b"])).await.unwrap();
        assert!(merged == a || merged == b, "{name}");
        assert_eq!(
            registry.aliases_of(merged).await.unwrap(),
            ids(["doi:a", "doi:b"]),
            "{name}"
        );
        assert_eq!(registry.enumerate().await.unwrap(), vec![merged], "{name}");

        // Registered queries resolve through any member identifier.
        assert_eq!(
            registry.canonical_of(&ids(["doi:b", "x:unknown"])).await.unwrap(),
            Some(merged),
            "{name}"
        );
        assert_eq!(
            registry.canonical_of(&ids(["x:unknown"])).await.unwrap(),
            None,
            "{name}"
        );

        // Empty input is invalid everywhere.
        assert!(
            matches!(
                registry.register(&BTreeSet::new()).await,
                Err(cache::Error::EmptyIdentifiers)
            ),
            "{name}"
        );
    }
}

// Concurrent registrations sharing one hub identifier must land in a
// single equivalence class, not several needing later reconciliation.
#[tokio::test]
async fn concurrent_overlapping_registers_converge() {
    for (name, stores) in each_backend() {
        let registry = stores.registry.clone();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let set: BTreeSet<String> =
                        [format!("x:{i}"), "hub:0".to_string()].into_iter().collect();
                    registry.register(&set).await.unwrap()
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.enumerate().await.unwrap().len(), 1, "{name}");
        let canonical = registry
            .canonical_of(&ids(["hub:0"]))
            .await
            .unwrap()
            .unwrap();
        // The hub plus sixteen distinct spokes.
        assert_eq!(registry.aliases_of(canonical).await.unwrap().len(), 17, "{name}");
    }
}

#[tokio::test]
async fn info_manager_contract() {
    for (name, stores) in each_backend() {
        let manager: InfoManager<Paper> =
            InfoManager::new(stores.registry.clone(), stores.info.clone());

        let (canonical, _, info) = manager.get_info(&Paper::with(["doi:1"])).await.unwrap();
        assert_eq!((canonical, info), (None, None), "{name}");

        manager
            .set_info(&Paper::with(["doi:1", "arxiv:1"]), &json!({"title": "T"}))
            .await
            .unwrap();

        let (canonical, merged, info) = manager.get_info(&Paper::with(["arxiv:1"])).await.unwrap();
        assert!(canonical.is_some(), "{name}");
        assert_eq!(merged, Paper::with(["doi:1", "arxiv:1"]), "{name}");
        assert_eq!(info, Some(json!({"title": "T"})), "{name}");
    }
}

// Pending round-trips are idempotent on canonical membership and order,
// on either backend.
#[tokio::test]
async fn pending_manager_round_trip_is_idempotent() {
    for (name, stores) in each_backend() {
        let manager: PendingManager<Paper> =
            PendingManager::new(stores.registry.clone(), stores.pending.clone());
        let parent = CanonicalId::from_i64(999);

        let children = [
            Paper::with(["doi:3"]),
            Paper::with(["doi:1"]),
            Paper::with(["doi:2"]),
        ];
        manager.add(parent, &children).await.unwrap();
        let first = manager.get(parent).await.unwrap().unwrap();
        manager.add(parent, &children).await.unwrap();
        let second = manager.get(parent).await.unwrap().unwrap();
        assert_eq!(first, second, "{name}");
        assert_eq!(first.len(), 3, "{name}");

        // Enriching one child updates in place without reordering.
        manager
            .add(parent, &[Paper::with(["doi:1", "ss:1"])])
            .await
            .unwrap();
        let third = manager.get(parent).await.unwrap().unwrap();
        assert_eq!(
            third,
            vec![
                Paper::with(["doi:3"]),
                Paper::with(["doi:1", "ss:1"]),
                Paper::with(["doi:2"]),
            ],
            "{name}"
        );
    }
}

#[tokio::test]
async fn edge_store_contract() {
    for (name, stores) in each_backend() {
        let edges = &stores.edges;
        let (p, c) = (CanonicalId::from_i64(1), CanonicalId::from_i64(2));

        assert!(!edges.contains(p, c).await.unwrap(), "{name}");
        assert!(edges.insert(p, c).await.unwrap(), "{name}");
        assert!(!edges.insert(p, c).await.unwrap(), "{name}");
        assert!(edges.contains(p, c).await.unwrap(), "{name}");
        assert!(!edges.contains(c, p).await.unwrap(), "{name}");
    }
}

// A child listed by one manager is discoverable through any other
// manager sharing the registry, regardless of backend mix.
#[tokio::test]
async fn managers_compose_over_a_shared_registry() {
    for (name, stores) in each_backend() {
        let infos: InfoManager<Author> =
            InfoManager::new(stores.registry.clone(), stores.info.clone());
        let pending: PendingManager<Author> =
            PendingManager::new(stores.registry.clone(), stores.pending.clone());

        pending
            .add(CanonicalId::from_i64(7), &[Author::with(["o:1"])])
            .await
            .unwrap();
        let entities = infos.entities().await.unwrap();
        assert_eq!(entities.len(), 1, "{name}");
        assert_eq!(entities[0].1.identifiers(), &ids(["o:1"]), "{name}");
    }
}
