//! Operation type tags.

use std::fmt;

use serde::{Serialize, Serializer};

/// The closed set of operation classes a log record can normalize to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpType {
    Find,
    Aggregate,
    GetMore,
    Insert,
    /// `update` issued as a command (`attr.command.update`).
    UpdateCmd,
    /// `update` reported as a write op (`attr.type == "update"`).
    UpdateWrite,
    Remove,
    FindAndModify,
    Distinct,
    Count,
    /// TTL monitor deletion pass (`c == "INDEX"`, expired-document message).
    TtlDelete,
    /// Other index maintenance operations.
    IndexOp,
    /// Recognized record with no more specific class (e.g. transaction
    /// telemetry).
    CommandOther,
}

impl OpType {
    /// Every tag, in stable report order.
    pub const ALL: [Self; 13] = [
        Self::Find,
        Self::Aggregate,
        Self::GetMore,
        Self::Insert,
        Self::UpdateCmd,
        Self::UpdateWrite,
        Self::Remove,
        Self::FindAndModify,
        Self::Distinct,
        Self::Count,
        Self::TtlDelete,
        Self::IndexOp,
        Self::CommandOther,
    ];

    /// Number of distinct tags (sizing for per-op counter arrays).
    pub const COUNT: usize = Self::ALL.len();

    /// Stable index into per-op counter arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Wire name used in reports and counters.
    pub fn name(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Aggregate => "aggregate",
            Self::GetMore => "getMore",
            Self::Insert => "insert",
            Self::UpdateCmd => "update",
            Self::UpdateWrite => "update_w",
            Self::Remove => "remove",
            Self::FindAndModify => "findAndModify",
            Self::Distinct => "distinct",
            Self::Count => "count",
            Self::TtlDelete => "ttl_delete",
            Self::IndexOp => "index_op",
            Self::CommandOther => "command",
        }
    }

    /// Whether records of this class carry a query shape (queryHash /
    /// planCacheKey) worth grouping on.
    pub fn supports_query_shape(self) -> bool {
        matches!(
            self,
            Self::Find
                | Self::Aggregate
                | Self::GetMore
                | Self::UpdateCmd
                | Self::Remove
                | Self::FindAndModify
                | Self::Distinct
                | Self::Count
        )
    }

    /// Whether records of this class carry execution statistics
    /// (keys/docs examined, returned counts).
    pub fn supports_exec_stats(self) -> bool {
        !matches!(self, Self::IndexOp | Self::CommandOther)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for OpType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_dense_and_stable() {
        for (i, op) in OpType::ALL.iter().enumerate() {
            assert_eq!(op.index(), i);
        }
    }

    #[test]
    fn query_shape_support() {
        assert!(OpType::Find.supports_query_shape());
        assert!(OpType::FindAndModify.supports_query_shape());
        assert!(!OpType::Insert.supports_query_shape());
        assert!(!OpType::TtlDelete.supports_query_shape());
    }

    #[test]
    fn exec_stats_support() {
        assert!(OpType::UpdateWrite.supports_exec_stats());
        assert!(OpType::TtlDelete.supports_exec_stats());
        assert!(!OpType::CommandOther.supports_exec_stats());
    }
}
