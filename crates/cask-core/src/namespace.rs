use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// The `database.collection` key identifying one logical stream.
///
/// Unique among concurrently-open producers or consumers at any instant.
/// Database names cannot contain `.`; collection names may, so parsing
/// splits on the first dot only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    /// Builds a namespace from its two components.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Parses a `database.collection` string.
    pub fn parse(qualified: &str) -> Result<Self, ArchiveError> {
        match qualified.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self::new(db, coll)),
            _ => Err(ArchiveError::Protocol(format!(
                "malformed namespace {qualified:?}"
            ))),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::Namespace;

    #[test]
    fn parse_splits_on_first_dot_only() {
        let ns = Namespace::parse("app.events.2024").expect("namespace should parse");
        assert_eq!(ns.database(), "app");
        assert_eq!(ns.collection(), "events.2024");
        assert_eq!(ns.to_string(), "app.events.2024");
    }

    #[test]
    fn parse_rejects_missing_components() {
        assert!(Namespace::parse("nodot").is_err());
        assert!(Namespace::parse(".coll").is_err());
        assert!(Namespace::parse("db.").is_err());
    }

    #[test]
    fn namespaces_hash_and_compare_by_both_parts() {
        let a = Namespace::new("db", "a");
        let b = Namespace::new("db", "b");
        assert_ne!(a, b);
        assert_eq!(a, Namespace::parse("db.a").expect("should parse"));
    }
}
