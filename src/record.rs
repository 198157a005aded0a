use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

/// One flat API record, keyed by column name.
pub type Record = Map<String, Value>;

/// Convert a JSON scalar to the value bound for a column.
///
/// Nested arrays/objects are stored as their JSON text; nothing in the
/// reconciled tables expects them, but the API adds fields between seasons.
pub fn to_sql_value(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

pub fn field_i64(record: &Record, key: &str) -> Option<i64> {
    let value = record.get(key)?;
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value.as_str()?.trim().parse::<i64>().ok()
}

/// API flags arrive as `true`/`false`, but older payloads used 0/1.
pub fn field_flag(record: &Record, key: &str) -> bool {
    match record.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

/// Turn a JSON array of objects into records, dropping non-object entries.
pub fn records_from_array(value: &Value) -> Vec<Record> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_object().cloned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_scalars() {
        assert_eq!(to_sql_value(None), SqlValue::Null);
        assert_eq!(to_sql_value(Some(&json!(true))), SqlValue::Integer(1));
        assert_eq!(to_sql_value(Some(&json!(42))), SqlValue::Integer(42));
        assert_eq!(to_sql_value(Some(&json!(4.5))), SqlValue::Real(4.5));
        assert_eq!(
            to_sql_value(Some(&json!("12.3"))),
            SqlValue::Text("12.3".to_string())
        );
        assert_eq!(
            to_sql_value(Some(&json!([1, 2]))),
            SqlValue::Text("[1,2]".to_string())
        );
    }

    #[test]
    fn flags_accept_bool_and_int() {
        let record = json!({"a": true, "b": 0, "c": 1, "d": null})
            .as_object()
            .cloned()
            .unwrap();
        assert!(field_flag(&record, "a"));
        assert!(!field_flag(&record, "b"));
        assert!(field_flag(&record, "c"));
        assert!(!field_flag(&record, "d"));
        assert!(!field_flag(&record, "missing"));
    }

    #[test]
    fn field_i64_parses_strings() {
        let record = json!({"round": "6", "element": 12})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(field_i64(&record, "round"), Some(6));
        assert_eq!(field_i64(&record, "element"), Some(12));
        assert_eq!(field_i64(&record, "fixture"), None);
    }
}
