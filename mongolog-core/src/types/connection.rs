//! Connection event model — the inputs to the connection join.

use chrono::{DateTime, Utc};
use serde::Serialize;
use smallvec::SmallVec;

/// Client metadata reported when a connection is accepted.
#[derive(Debug, Clone)]
pub struct ClientMetadata {
    pub ctx: String,
    pub driver_name: Option<String>,
    pub driver_version: Option<String>,
    pub compressors: SmallVec<[String; 2]>,
    pub os_type: Option<String>,
    pub os_name: Option<String>,
    pub platform: Option<String>,
    pub server_version: Option<String>,
    pub remote_host: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One event in the three independent streams joined on connection id.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Connection-acceptance client metadata (driver identity).
    Metadata(Box<ClientMetadata>),
    /// Successful authentication.
    Auth {
        ctx: String,
        username: String,
        db: Option<String>,
        mechanism: Option<String>,
        timestamp: Option<DateTime<Utc>>,
    },
    /// Connection opened.
    Started {
        ctx: String,
        timestamp: Option<DateTime<Utc>>,
    },
    /// Connection closed.
    Ended {
        ctx: String,
        timestamp: Option<DateTime<Utc>>,
    },
}

impl ConnectionEvent {
    /// The connection context string this event belongs to.
    pub fn ctx(&self) -> &str {
        match self {
            Self::Metadata(m) => &m.ctx,
            Self::Auth { ctx, .. } | Self::Started { ctx, .. } | Self::Ended { ctx, .. } => ctx,
        }
    }
}

/// Per-driver aggregate identity: one entry per distinct combination of
/// driver build, host platform, negotiated compressors, and username.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct DriverKey {
    pub driver_name: Option<String>,
    pub driver_version: Option<String>,
    pub os_type: Option<String>,
    pub platform: Option<String>,
    pub compressors: SmallVec<[String; 2]>,
    pub username: Option<String>,
}

/// Extract the numeric connection id from a ctx string (`"conn42"` → 42).
///
/// The id is the trailing run of ASCII digits; a ctx with no trailing digits
/// (e.g. `"listener"`) has no connection id.
pub fn connection_id(ctx: &str) -> Option<i64> {
    let prefix = ctx.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &ctx[prefix.len()..];
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctx_parsing() {
        assert_eq!(connection_id("conn42"), Some(42));
        assert_eq!(connection_id("conn1"), Some(1));
        assert_eq!(connection_id("thread3"), Some(3));
        assert_eq!(connection_id("listener"), None);
        assert_eq!(connection_id(""), None);
    }

    #[test]
    fn driver_key_structural_identity() {
        let a = DriverKey {
            driver_name: Some("driver-x".into()),
            driver_version: Some("1.2.3".into()),
            username: Some("alice".into()),
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(a, b);
        let mut c = a.clone();
        c.username = None;
        assert_ne!(a, c);
    }
}
