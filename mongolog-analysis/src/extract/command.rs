//! Command verb recognition and namespace resolution.

use serde_json::{Map, Value};

use mongolog_core::{Namespace, OpType};

use super::numeric::field_str;

/// Recognized command verbs in match priority order. The verb decides the
/// op type and where the collection name comes from.
const COMMAND_VERBS: &[(&str, OpType)] = &[
    ("find", OpType::Find),
    ("aggregate", OpType::Aggregate),
    ("getMore", OpType::GetMore),
    ("insert", OpType::Insert),
    ("update", OpType::UpdateCmd),
    ("delete", OpType::Remove),
    ("findAndModify", OpType::FindAndModify),
    ("findandmodify", OpType::FindAndModify),
    ("distinct", OpType::Distinct),
    ("count", OpType::Count),
    ("createIndexes", OpType::IndexOp),
    ("dropIndexes", OpType::IndexOp),
];

/// A recognized command: its op class and resolved namespace.
#[derive(Debug)]
pub struct RecognizedCommand {
    pub op_type: OpType,
    pub namespace: Namespace,
}

/// Recognize the verb in a command sub-object and resolve the namespace.
///
/// `ns` is the attribute-level `attr.ns` value when present. For
/// FIND_AND_MODIFY / UPDATE / INSERT / DELETE / GETMORE the verb's value
/// carries the collection; for FIND / AGGREGATE / DISTINCT / COUNT the
/// namespace field does. `aggregate: 1` is a database-level aggregation —
/// a valid record with the collection absent.
pub fn recognize(command: &Map<String, Value>, ns: Option<&str>) -> Option<RecognizedCommand> {
    for (verb, op_type) in COMMAND_VERBS {
        let Some(value) = command.get(*verb) else {
            continue;
        };
        let namespace = match op_type {
            OpType::Find | OpType::Aggregate | OpType::Distinct | OpType::Count => {
                match (ns, value.as_str()) {
                    (Some(ns), _) => Namespace::parse(ns),
                    // No attr.ns: fall back to the verb value plus $db.
                    (None, Some(coll)) => {
                        Namespace::from_parts(field_str(command, "$db"), Some(coll))
                    }
                    (None, None) => Namespace::from_parts(field_str(command, "$db"), None),
                }
            }
            OpType::GetMore => {
                // getMore's own value is a cursor id; the collection rides in
                // a sibling field.
                collection_namespace(command, ns, field_str(command, "collection"))
            }
            _ => collection_namespace(command, ns, value.as_str()),
        };
        return Some(RecognizedCommand {
            op_type: *op_type,
            namespace,
        });
    }
    None
}

/// Resolve a namespace from an explicit collection name, taking the database
/// from `attr.ns` when present, else from the command's `$db`.
fn collection_namespace(
    command: &Map<String, Value>,
    ns: Option<&str>,
    collection: Option<&str>,
) -> Namespace {
    match (ns, collection) {
        (Some(ns), Some(coll)) => Namespace::parse_with_collection(ns, coll),
        (Some(ns), None) => Namespace::parse(ns),
        (None, coll) => Namespace::from_parts(field_str(command, "$db"), coll),
    }
}

/// Write-path op types (`attr.type` on WRITE component records).
pub fn write_op_type(type_token: &str) -> Option<OpType> {
    match type_token {
        "update" => Some(OpType::UpdateWrite),
        "insert" => Some(OpType::Insert),
        "remove" => Some(OpType::Remove),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn find_uses_attr_ns() {
        let cmd = obj(json!({"find": "users", "filter": {}}));
        let rec = recognize(&cmd, Some("appdb.users")).unwrap();
        assert_eq!(rec.op_type, OpType::Find);
        assert_eq!(rec.namespace, Namespace::parse("appdb.users"));
    }

    #[test]
    fn insert_collection_from_verb_value() {
        let cmd = obj(json!({"insert": "orders", "$db": "shop"}));
        let rec = recognize(&cmd, None).unwrap();
        assert_eq!(rec.op_type, OpType::Insert);
        assert_eq!(rec.namespace, Namespace::from_parts(Some("shop"), Some("orders")));
    }

    #[test]
    fn getmore_collection_from_sibling_field() {
        let cmd = obj(json!({"getMore": {"$numberLong": "123456"}, "collection": "events"}));
        let rec = recognize(&cmd, Some("site.events")).unwrap();
        assert_eq!(rec.op_type, OpType::GetMore);
        assert_eq!(rec.namespace, Namespace::parse("site.events"));
    }

    #[test]
    fn database_level_aggregate() {
        let cmd = obj(json!({"aggregate": 1, "$db": "admin"}));
        let rec = recognize(&cmd, None).unwrap();
        assert_eq!(rec.op_type, OpType::Aggregate);
        assert_eq!(rec.namespace.database(), Some("admin"));
        assert_eq!(rec.namespace.collection(), None);
    }

    #[test]
    fn index_maintenance_commands() {
        let cmd = obj(json!({"createIndexes": "users", "$db": "appdb"}));
        let rec = recognize(&cmd, None).unwrap();
        assert_eq!(rec.op_type, OpType::IndexOp);
        assert_eq!(rec.namespace, Namespace::from_parts(Some("appdb"), Some("users")));
    }

    #[test]
    fn unrecognized_command_is_none() {
        let cmd = obj(json!({"shardCollection": "appdb.users"}));
        assert!(recognize(&cmd, Some("appdb.users")).is_none());
    }

    #[test]
    fn write_tokens() {
        assert_eq!(write_op_type("update"), Some(OpType::UpdateWrite));
        assert_eq!(write_op_type("remove"), Some(OpType::Remove));
        assert_eq!(write_op_type("command"), None);
    }
}
