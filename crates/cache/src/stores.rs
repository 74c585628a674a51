use models::{CanonicalId, Info};
use std::collections::BTreeSet;

/// IdentifierRegistry maintains, for one entity kind, the partition of
/// all observed identifiers into entities: every identifier maps to
/// exactly one canonical ID, and two identifier sets that ever shared a
/// member share a canonical ID from then on.
///
/// Registry state never expires within a run; canonical IDs of merge
/// losers leave the enumeration but are never re-minted.
#[async_trait::async_trait]
pub trait IdentifierRegistry: Send + Sync {
    /// Returns the canonical ID of any member of `identifiers` already
    /// registered, or None. A pure query: never merges. If members map to
    /// several distinct canonicals the choice is deterministic for a
    /// given registry state (first match in identifier order).
    async fn canonical_of(&self, identifiers: &BTreeSet<String>) -> crate::Result<Option<CanonicalId>>;

    /// Registers `identifiers`, merging every overlapping equivalence
    /// class into one, and returns the surviving canonical ID. Atomic:
    /// two concurrent registrations with overlapping sets observe a
    /// single winner. Empty input is rejected.
    async fn register(&self, identifiers: &BTreeSet<String>) -> crate::Result<CanonicalId>;

    /// All identifiers bound to `canonical` (empty if unknown or merged away).
    async fn aliases_of(&self, canonical: CanonicalId) -> crate::Result<BTreeSet<String>>;

    /// Snapshot of every live canonical ID at call time. Registrations
    /// racing the call may be missed; the next pass picks them up.
    async fn enumerate(&self) -> crate::Result<Vec<CanonicalId>>;
}

/// Whole-record info storage per canonical ID. Entries may expire;
/// an expired entry reads as absent and the caller re-fetches.
#[async_trait::async_trait]
pub trait InfoStore: Send + Sync {
    async fn get(&self, canonical: CanonicalId) -> crate::Result<Option<Info>>;
    async fn set(&self, canonical: CanonicalId, info: &Info) -> crate::Result<()>;
}

/// Ordered child lists keyed by parent canonical ID, stored as raw
/// identifier sets. `None` means "never fetched", which is distinct from
/// `Some(vec![])`, "fetched and the parent has no children".
#[async_trait::async_trait]
pub trait PendingStore: Send + Sync {
    async fn get(&self, parent: CanonicalId) -> crate::Result<Option<Vec<BTreeSet<String>>>>;
    async fn set(&self, parent: CanonicalId, children: &[BTreeSet<String>]) -> crate::Result<()>;
}

/// Directional (parent, child) pairs already written to the destination.
/// A recorded pair is proof of a prior durable write, so this store
/// never expires.
#[async_trait::async_trait]
pub trait EdgeStore: Send + Sync {
    async fn contains(&self, parent: CanonicalId, child: CanonicalId) -> crate::Result<bool>;
    /// Records the pair; returns true iff it was not present before.
    async fn insert(&self, parent: CanonicalId, child: CanonicalId) -> crate::Result<bool>;
}
