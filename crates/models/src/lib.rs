mod entity;
mod id;
mod relation;
pub mod title;

pub use entity::{Author, Entity, Kind, Paper, Venue};
pub use id::CanonicalId;
pub use relation::Relation;

/// Info is the opaque property record attached to an entity.
/// The engine stores, retrieves and overwrites it whole, and
/// otherwise never looks inside.
pub type Info = serde_json::Value;
