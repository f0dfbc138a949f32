//! Typed lookups over the dynamically-typed log document.
//!
//! Numeric values appear either as plain JSON numbers or as extended-JSON
//! wrappers (`{"$numberLong": "1234"}`); both must coerce transparently.

use serde_json::{Map, Value};

/// Coerce a JSON value to a signed 64-bit integer.
///
/// Accepts integers, unsigned integers (saturating), floats with an integral
/// value, and the `$numberLong` / `$numberInt` / `$numberDouble` wrappers.
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            if n.as_u64().is_some() {
                return Some(i64::MAX);
            }
            n.as_f64().and_then(float_to_i64)
        }
        Value::Object(obj) => {
            let inner = obj
                .get("$numberLong")
                .or_else(|| obj.get("$numberInt"))
                .or_else(|| obj.get("$numberDouble"))?;
            match inner {
                Value::String(s) => {
                    if let Ok(i) = s.parse::<i64>() {
                        Some(i)
                    } else {
                        s.parse::<f64>().ok().and_then(float_to_i64)
                    }
                }
                other => as_i64(other),
            }
        }
        _ => None,
    }
}

fn float_to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Numeric field lookup on an object.
pub fn field_i64(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    obj.get(key).and_then(as_i64)
}

/// String field lookup on an object.
pub fn field_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

/// Object field lookup on an object.
pub fn field_obj<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(Value::as_object)
}

/// Boolean field lookup; extended truthiness (`true` or nonzero number).
pub fn field_bool(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(v) => as_i64(v).is_some_and(|i| i != 0),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_numbers() {
        assert_eq!(as_i64(&json!(42)), Some(42));
        assert_eq!(as_i64(&json!(-7)), Some(-7));
        assert_eq!(as_i64(&json!(120.0)), Some(120));
        assert_eq!(as_i64(&json!(1.5)), None);
    }

    #[test]
    fn extended_json_wrappers() {
        assert_eq!(as_i64(&json!({"$numberLong": "9007199254740993"})), Some(9007199254740993));
        assert_eq!(as_i64(&json!({"$numberInt": "12"})), Some(12));
        assert_eq!(as_i64(&json!({"$numberDouble": "952.0"})), Some(952));
        assert_eq!(as_i64(&json!({"$numberLong": 88})), Some(88));
    }

    #[test]
    fn non_numeric_values() {
        assert_eq!(as_i64(&json!("12")), None);
        assert_eq!(as_i64(&json!(null)), None);
        assert_eq!(as_i64(&json!({"other": 1})), None);
    }

    #[test]
    fn unsigned_overflow_saturates() {
        assert_eq!(as_i64(&json!(u64::MAX)), Some(i64::MAX));
    }

    #[test]
    fn field_helpers() {
        let doc = json!({"a": 1, "b": "x", "c": {"d": 2}, "e": true});
        let obj = doc.as_object().unwrap();
        assert_eq!(field_i64(obj, "a"), Some(1));
        assert_eq!(field_str(obj, "b"), Some("x"));
        assert!(field_obj(obj, "c").is_some());
        assert!(field_bool(obj, "e"));
        assert!(!field_bool(obj, "missing"));
    }
}
