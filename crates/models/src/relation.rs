use crate::Kind;
use std::fmt;

/// Relation is a typed, directed edge kind between two canonical
/// entities. Parent and child kinds are fixed per relation.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Paper -> Author, ordered as the paper's author list.
    Authored,
    /// Paper -> Venue.
    PublishedIn,
    /// Paper -> Paper: the parent's reference list.
    Cites,
    /// Paper -> Paper: papers citing the parent. Not reified in storage;
    /// committing `CITED_BY(p, q)` commits `CITES(q, p)`.
    CitedBy,
}

impl Relation {
    pub const ALL: [Relation; 4] = [
        Relation::Authored,
        Relation::PublishedIn,
        Relation::Cites,
        Relation::CitedBy,
    ];

    pub fn parent_kind(&self) -> Kind {
        Kind::Paper
    }

    pub fn child_kind(&self) -> Kind {
        match self {
            Relation::Authored => Kind::Author,
            Relation::PublishedIn => Kind::Venue,
            Relation::Cites | Relation::CitedBy => Kind::Paper,
        }
    }

    /// The relation under which an edge is actually stored and written,
    /// and whether the (parent, child) pair must be swapped to fit it.
    pub fn reified(&self) -> (Relation, bool) {
        match self {
            Relation::CitedBy => (Relation::Cites, true),
            other => (*other, false),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Authored => "AUTHORED",
            Relation::PublishedIn => "PUBLISHED_IN",
            Relation::Cites => "CITES",
            Relation::CitedBy => "CITED_BY",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
