//! Connection-lifecycle event extraction.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use smallvec::SmallVec;

use mongolog_core::{ClientMetadata, ConnectionEvent};

use super::numeric::{field_obj, field_str};

/// Classify a parsed line as a connection event, if it is one.
///
/// Metadata and accept/end events ride on the NETWORK component;
/// authentication success rides on ACCESS.
pub fn classify_event(
    component: &str,
    msg: &str,
    ctx: &str,
    attr: Option<&Map<String, Value>>,
    timestamp: Option<DateTime<Utc>>,
) -> Option<ConnectionEvent> {
    if ctx.is_empty() {
        return None;
    }
    match component {
        "NETWORK" => match msg {
            "client metadata" => {
                Some(ConnectionEvent::Metadata(Box::new(client_metadata(
                    ctx, attr?, timestamp,
                ))))
            }
            "Connection accepted" => Some(ConnectionEvent::Started {
                ctx: ctx.to_string(),
                timestamp,
            }),
            "Connection ended" => Some(ConnectionEvent::Ended {
                ctx: ctx.to_string(),
                timestamp,
            }),
            _ => None,
        },
        "ACCESS" if msg.starts_with("Successfully authenticated") => {
            let attr = attr?;
            let username = field_str(attr, "user")
                .or_else(|| field_str(attr, "principalName"))?
                .to_string();
            Some(ConnectionEvent::Auth {
                ctx: ctx.to_string(),
                username,
                db: field_str(attr, "db")
                    .or_else(|| field_str(attr, "authenticationDatabase"))
                    .map(String::from),
                mechanism: field_str(attr, "mechanism").map(String::from),
                timestamp,
            })
        }
        _ => None,
    }
}

fn client_metadata(
    ctx: &str,
    attr: &Map<String, Value>,
    timestamp: Option<DateTime<Utc>>,
) -> ClientMetadata {
    let doc = field_obj(attr, "doc");
    let driver = doc.and_then(|d| field_obj(d, "driver"));
    let os = doc.and_then(|d| field_obj(d, "os"));

    // Negotiated compressors live at the attribute level; older servers put
    // the client's offered list inside the metadata doc.
    let compressors: SmallVec<[String; 2]> = attr
        .get("negotiatedCompressors")
        .or_else(|| doc.and_then(|d| d.get("compression")))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    ClientMetadata {
        ctx: ctx.to_string(),
        driver_name: driver.and_then(|d| field_str(d, "name")).map(String::from),
        driver_version: driver
            .and_then(|d| field_str(d, "version"))
            .map(String::from),
        compressors,
        os_type: os.and_then(|o| field_str(o, "type")).map(String::from),
        os_name: os.and_then(|o| field_str(o, "name")).map(String::from),
        platform: doc.and_then(|d| field_str(d, "platform")).map(String::from),
        server_version: doc
            .and_then(|d| field_str(d, "serverVersion"))
            .map(String::from),
        remote_host: field_str(attr, "remote").map(String::from),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attr(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn metadata_event() {
        let a = attr(json!({
            "remote": "10.0.0.5:50432",
            "doc": {
                "driver": {"name": "driver-x", "version": "1.2.3"},
                "os": {"type": "linux", "name": "Ubuntu"},
                "platform": "glibc 2.35"
            }
        }));
        let ev = classify_event("NETWORK", "client metadata", "conn42", Some(&a), None).unwrap();
        let ConnectionEvent::Metadata(meta) = ev else {
            panic!("expected metadata event");
        };
        assert_eq!(meta.driver_name.as_deref(), Some("driver-x"));
        assert_eq!(meta.driver_version.as_deref(), Some("1.2.3"));
        assert_eq!(meta.os_type.as_deref(), Some("linux"));
        assert_eq!(meta.remote_host.as_deref(), Some("10.0.0.5:50432"));
    }

    #[test]
    fn auth_event() {
        let a = attr(json!({"user": "alice", "db": "admin", "mechanism": "SCRAM-SHA-256"}));
        let ev = classify_event(
            "ACCESS",
            "Successfully authenticated",
            "conn42",
            Some(&a),
            None,
        )
        .unwrap();
        let ConnectionEvent::Auth { username, db, mechanism, .. } = ev else {
            panic!("expected auth event");
        };
        assert_eq!(username, "alice");
        assert_eq!(db.as_deref(), Some("admin"));
        assert_eq!(mechanism.as_deref(), Some("SCRAM-SHA-256"));
    }

    #[test]
    fn lifecycle_events() {
        let started = classify_event("NETWORK", "Connection accepted", "conn7", None, None);
        assert!(matches!(started, Some(ConnectionEvent::Started { .. })));
        let ended = classify_event("NETWORK", "Connection ended", "conn7", None, None);
        assert!(matches!(ended, Some(ConnectionEvent::Ended { .. })));
    }

    #[test]
    fn non_connection_lines_ignored() {
        assert!(classify_event("COMMAND", "Slow query", "conn7", None, None).is_none());
        assert!(classify_event("NETWORK", "Interim response", "conn7", None, None).is_none());
    }
}
