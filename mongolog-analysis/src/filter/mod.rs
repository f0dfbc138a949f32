//! Line-level noise filter.
//!
//! Two ordered substring tests over the raw line, both compiled into
//! Aho-Corasick automatons at construction so classification is a scan with
//! no per-line allocation.

use aho_corasick::AhoCorasick;

use mongolog_core::config::FilterConfig;
use mongolog_core::errors::ConfigError;

/// Outcome of classifying one raw line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Drop,
}

/// Operation-naming JSON key tokens that always admit a line, regardless of
/// any noise pattern it also contains. A noise-class substring (say, an
/// access-control component tag inside an error message) must not mask a
/// genuine slow-query record.
pub const ALWAYS_ADMIT_TOKENS: &[&str] = &[
    "\"find\":",
    "\"aggregate\":",
    "\"update\":",
    "\"insert\":",
    "\"delete\":",
    "\"findAndModify\":",
    "\"getMore\":",
    "\"count\":",
    "\"distinct\":",
];

/// Message markers for connection-lifecycle lines. These lines match the
/// NETWORK/ACCESS noise tags, so when the connection join is active the
/// coordinator routes them past the noise verdict.
const CONNECTION_MARKERS: &[&str] = &[
    "client metadata",
    "Connection accepted",
    "Connection ended",
    "Successfully authenticated",
];

/// Classifies raw lines as admit-or-drop. Pure; build once per run.
pub struct LineFilter {
    always_admit: AhoCorasick,
    noise: Option<AhoCorasick>,
    connection: AhoCorasick,
}

impl LineFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, ConfigError> {
        let compile = |patterns: &[&str]| {
            AhoCorasick::new(patterns).map_err(|e| ConfigError::PatternSet {
                reason: e.to_string(),
            })
        };

        let noise_patterns = config.effective_patterns();
        let noise = if noise_patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::new(&noise_patterns).map_err(|e| ConfigError::PatternSet {
                    reason: e.to_string(),
                })?,
            )
        };

        Ok(Self {
            always_admit: compile(ALWAYS_ADMIT_TOKENS)?,
            noise,
            connection: compile(CONNECTION_MARKERS)?,
        })
    }

    /// Classify one raw line.
    ///
    /// Empty and non-structured lines drop. The always-admit test runs
    /// before the noise test.
    pub fn classify(&self, line: &[u8]) -> Admission {
        if !starts_structured(line) {
            return Admission::Drop;
        }
        if self.always_admit.is_match(line) {
            return Admission::Admit;
        }
        match &self.noise {
            Some(noise) if noise.is_match(line) => Admission::Drop,
            _ => Admission::Admit,
        }
    }

    /// Whether the line is a connection-lifecycle event worth extracting
    /// even when [`classify`](Self::classify) says drop.
    pub fn is_connection_event(&self, line: &[u8]) -> bool {
        starts_structured(line) && self.connection.is_match(line)
    }
}

/// A record-bearing line is a JSON document; anything else is not parseable.
fn starts_structured(line: &[u8]) -> bool {
    line.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> LineFilter {
        LineFilter::new(&FilterConfig::default()).unwrap()
    }

    #[test]
    fn empty_and_unstructured_lines_drop() {
        let f = filter();
        assert_eq!(f.classify(b""), Admission::Drop);
        assert_eq!(f.classify(b"   "), Admission::Drop);
        assert_eq!(f.classify(b"plain text line"), Admission::Drop);
    }

    #[test]
    fn noise_component_drops() {
        let f = filter();
        let line = br#"{"t":{"$date":"2024-01-01T00:00:00.000Z"},"c":"NETWORK","msg":"Interim response"}"#;
        assert_eq!(f.classify(line), Admission::Drop);
    }

    #[test]
    fn operation_token_admits_despite_noise_tag() {
        // Allowlist rule fires first: a find command inside a line that also
        // carries a noise-class substring is still admitted.
        let f = filter();
        let line = br#"{"c":"NETWORK","attr":{"command":{"find":"users"}}}"#;
        assert_eq!(f.classify(line), Admission::Admit);
    }

    #[test]
    fn unknown_structured_line_admits() {
        let f = filter();
        let line = br#"{"c":"COMMAND","msg":"Slow query","attr":{}}"#;
        assert_eq!(f.classify(line), Admission::Admit);
    }

    #[test]
    fn classification_is_idempotent() {
        let f = filter();
        let lines: [&[u8]; 3] = [
            br#"{"c":"NETWORK","msg":"x"}"#,
            br#"{"attr":{"command":{"find":"users"}}}"#,
            b"garbage",
        ];
        for line in lines {
            assert_eq!(f.classify(line), f.classify(line));
        }
    }

    #[test]
    fn connection_markers_detected() {
        let f = filter();
        let meta = br#"{"c":"NETWORK","msg":"client metadata","ctx":"conn1"}"#;
        assert_eq!(f.classify(meta), Admission::Drop);
        assert!(f.is_connection_event(meta));
        assert!(!f.is_connection_event(br#"{"c":"COMMAND","msg":"Slow query"}"#));
    }

    #[test]
    fn configured_patterns_respected() {
        let config = FilterConfig {
            patterns: Some(vec!["myChatter".into()]),
            ..Default::default()
        };
        let f = LineFilter::new(&config).unwrap();
        assert_eq!(
            f.classify(br#"{"msg":"myChatter stuff"}"#),
            Admission::Drop
        );
        // The default NETWORK tag is no longer noise after replacement.
        assert_eq!(
            f.classify(br#"{"c":"NETWORK","msg":"something"}"#),
            Admission::Admit
        );
    }
}
