//! Namespace — the (database, collection) pair an operation targets.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// An ordered (database, collection) pair. Either component may be absent.
///
/// Parsed once during extraction and shared by cheap clone across every
/// accumulator key that embeds it. Equality and hash are structural.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    database: Option<Arc<str>>,
    collection: Option<Arc<str>>,
}

impl Namespace {
    /// An empty namespace — no database, no collection.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from explicit parts.
    pub fn from_parts(database: Option<&str>, collection: Option<&str>) -> Self {
        Self {
            database: database.filter(|s| !s.is_empty()).map(Arc::from),
            collection: collection.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }

    /// Parse `"db.coll"` notation. The first `.` splits database from
    /// collection; a string with no `.` is a database-only namespace.
    pub fn parse(ns: &str) -> Self {
        match ns.split_once('.') {
            Some((db, coll)) => Self::from_parts(Some(db), Some(coll)),
            None => Self::from_parts(Some(ns), None),
        }
    }

    /// Parse a namespace string but override the collection component.
    pub fn parse_with_collection(ns: &str, collection: &str) -> Self {
        let db = ns.split_once('.').map_or(ns, |(db, _)| db);
        Self::from_parts(Some(db), Some(collection))
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// True when neither component is present.
    pub fn is_empty(&self) -> bool {
        self.database.is_none() && self.collection.is_none()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.database.as_deref(), self.collection.as_deref()) {
            (Some(db), Some(coll)) => write!(f, "{db}.{coll}"),
            (Some(db), None) => write!(f, "{db}"),
            (None, Some(coll)) => write!(f, ".{coll}"),
            (None, None) => write!(f, "(none)"),
        }
    }
}

impl Serialize for Namespace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_dot() {
        let ns = Namespace::parse("appdb.users");
        assert_eq!(ns.database(), Some("appdb"));
        assert_eq!(ns.collection(), Some("users"));

        // Collections may themselves contain dots.
        let ns = Namespace::parse("config.system.sessions");
        assert_eq!(ns.database(), Some("config"));
        assert_eq!(ns.collection(), Some("system.sessions"));
    }

    #[test]
    fn database_only() {
        let ns = Namespace::parse("admin");
        assert_eq!(ns.database(), Some("admin"));
        assert_eq!(ns.collection(), None);
        assert!(!ns.is_empty());
    }

    #[test]
    fn structural_equality_and_display() {
        let a = Namespace::parse("appdb.users");
        let b = Namespace::from_parts(Some("appdb"), Some("users"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "appdb.users");
        assert_eq!(Namespace::empty().to_string(), "(none)");
    }

    #[test]
    fn empty_components_are_absent() {
        let ns = Namespace::from_parts(Some(""), Some("users"));
        assert_eq!(ns.database(), None);
        assert_eq!(ns.collection(), Some("users"));
    }
}
