//! Line filter configuration.

use serde::{Deserialize, Serialize};

/// The default noise pattern set: substrings that mark a line as
/// operational chatter. Component tags, health-check and session commands,
/// replication heartbeats, admin introspection commands, and internal
/// namespaces.
pub const DEFAULT_NOISE_PATTERNS: &[&str] = &[
    // Component tags
    "\"c\":\"NETWORK\"",
    "\"c\":\"ACCESS\"",
    "\"c\":\"CONNPOOL\"",
    "\"c\":\"STORAGE\"",
    "\"c\":\"CONTROL\"",
    "\"c\":\"SHARDING\"",
    // Health checks
    "\"hello\"",
    "\"isMaster\"",
    "\"ismaster\"",
    "\"ping\"",
    // Session management
    "\"endSessions\"",
    "\"startSession\"",
    "\"saslContinue\"",
    // Replication chatter
    "\"replSetHeartbeat\"",
    "\"replSetUpdatePosition\"",
    // Admin introspection
    "\"serverStatus\"",
    "\"getCmdLineOpts\"",
    "\"getParameter\"",
    "\"buildInfo\"",
    "\"logRotate\"",
    "\"getDefaultRWConcern\"",
    "\"listDatabases\"",
    "\"dbstats\"",
    "\"collStats\"",
    "\"listIndexes\"",
    // Internal namespaces
    "local.oplog.rs",
    "local.clustermanager",
    "config.system.sessions",
    "config.mongos",
];

/// Configuration for the noise filter.
///
/// The effective pattern set is computed by three orthogonal operations in
/// fixed order: `patterns` replaces the default set, `add` unions into it,
/// `remove` subtracts from the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Replaces the default noise set entirely when present.
    pub patterns: Option<Vec<String>>,
    /// Additional noise substrings.
    pub add: Vec<String>,
    /// Substrings removed from the merged set.
    pub remove: Vec<String>,
}

impl FilterConfig {
    /// The merged noise pattern set: replace, then union, then difference.
    pub fn effective_patterns(&self) -> Vec<String> {
        let mut merged: Vec<String> = match &self.patterns {
            Some(replacement) => replacement.clone(),
            None => DEFAULT_NOISE_PATTERNS.iter().map(|s| s.to_string()).collect(),
        };
        for p in &self.add {
            if !merged.contains(p) {
                merged.push(p.clone());
            }
        }
        merged.retain(|p| !self.remove.contains(p));
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unconfigured() {
        let config = FilterConfig::default();
        let patterns = config.effective_patterns();
        assert_eq!(patterns.len(), DEFAULT_NOISE_PATTERNS.len());
        assert!(patterns.iter().any(|p| p == "\"c\":\"NETWORK\""));
    }

    #[test]
    fn replace_union_difference_order() {
        let config = FilterConfig {
            patterns: Some(vec!["a".into(), "b".into()]),
            add: vec!["c".into(), "b".into()],
            remove: vec!["a".into()],
        };
        assert_eq!(
            config.effective_patterns(),
            vec!["b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn remove_applies_to_defaults() {
        let config = FilterConfig {
            remove: vec!["\"ping\"".into()],
            ..Default::default()
        };
        assert!(!config.effective_patterns().iter().any(|p| p == "\"ping\""));
    }
}
