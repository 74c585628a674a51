use std::collections::BTreeSet;
use std::fmt;

/// Kind distinguishes the three entity namespaces. Identifiers never
/// cross kinds: a Paper and an Author sharing the literal same string
/// are still different entities.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Paper,
    Author,
    Venue,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Paper => "paper",
            Kind::Author => "author",
            Kind::Venue => "venue",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity is the common shape of papers, authors and venues: a non-empty
/// set of opaque `scheme:value` identifier strings, compared byte-exact.
/// The trait lets caches and the traversal engine stay generic over kind
/// while the concrete types keep kinds apart at compile time.
pub trait Entity: Clone + fmt::Debug + fmt::Display + Send + Sync + 'static {
    const KIND: Kind;

    fn new(identifiers: BTreeSet<String>) -> Self;
    fn identifiers(&self) -> &BTreeSet<String>;
    fn into_identifiers(self) -> BTreeSet<String>;

    /// Returns this entity extended with every identifier of `other`.
    /// Identifier sets only ever grow.
    fn merged_with(self, other: &Self) -> Self {
        let mut identifiers = self.into_identifiers();
        identifiers.extend(other.identifiers().iter().cloned());
        Self::new(identifiers)
    }
}

macro_rules! entity_types {
    ($($(#[$doc:meta])* $name:ident => $kind:expr,)*) => {
        $(
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub identifiers: BTreeSet<String>,
        }

        impl $name {
            pub fn with<I, S>(identifiers: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                Self {
                    identifiers: identifiers.into_iter().map(Into::into).collect(),
                }
            }
        }

        impl Entity for $name {
            const KIND: Kind = $kind;

            fn new(identifiers: BTreeSet<String>) -> Self {
                Self { identifiers }
            }
            fn identifiers(&self) -> &BTreeSet<String> {
                &self.identifiers
            }
            fn into_identifiers(self) -> BTreeSet<String> {
                self.identifiers
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "("))?;
                fmt_identifiers(&self.identifiers, f)?;
                write!(f, ")")
            }
        }
        )*
    };
}

entity_types! {
    /// A publication, e.g. `{"doi:10.1000/xyz123", "arxiv:1706.03762"}`.
    Paper => Kind::Paper,
    /// A person, e.g. `{"orcid:0000-0001-2345-6789"}`.
    Author => Kind::Author,
    /// A journal or conference, e.g. `{"issn:1234-5678"}`.
    Venue => Kind::Venue,
}

// Entities routinely accumulate many aliases; log lines show at most two.
fn fmt_identifiers(identifiers: &BTreeSet<String>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, id) in identifiers.iter().take(2).enumerate() {
        if i != 0 {
            write!(f, ", ")?;
        }
        f.write_str(id)?;
    }
    if identifiers.len() > 2 {
        write!(f, ", ..")?;
    }
    Ok(())
}
