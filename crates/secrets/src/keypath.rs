//! Key-path descent into JSON secret values
//!
//! A key path `a.b.c` is evaluated as the JSONPath expression `$..a.b.c`:
//! recursive descent for any member named `a`, then plain child steps.
//! Numeric steps index into arrays.

use serde_json::Value;

/// Pick the value addressed by `key_path` out of `value`.
///
/// - empty key path, or `value` not JSON: `value` unchanged, as a string
/// - exactly one match: objects and arrays keep their JSON shape, scalars
///   become their canonical string form (`5432`, `true`, `null`)
/// - zero or several matches: an empty string
#[must_use]
pub fn descend(value: &str, key_path: &str) -> Value {
    if key_path.is_empty() {
        return Value::String(value.to_string());
    }
    let Ok(tree) = serde_json::from_str::<Value>(value) else {
        return Value::String(value.to_string());
    };

    let mut steps = key_path.split('.');
    let Some(first) = steps.next() else {
        return Value::String(value.to_string());
    };

    let mut nodes = Vec::new();
    collect_descendants(&tree, first, &mut nodes);
    for step in steps {
        nodes = nodes
            .into_iter()
            .filter_map(|node| child(node, step))
            .collect();
    }

    match nodes.as_slice() {
        [single @ (Value::Object(_) | Value::Array(_))] => (*single).clone(),
        [single] => Value::String(value_text(single)),
        [] => {
            tracing::debug!(key_path, "key path matched nothing");
            Value::String(String::new())
        }
        many => {
            tracing::debug!(key_path, matches = many.len(), "key path is ambiguous");
            Value::String(String::new())
        }
    }
}

/// Render a resolved value as text: strings unquoted, everything else in
/// canonical JSON form.
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn collect_descendants<'v>(node: &'v Value, name: &str, out: &mut Vec<&'v Value>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                if key == name {
                    out.push(child);
                }
                collect_descendants(child, name, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_descendants(item, name, out);
            }
        }
        _ => {}
    }
}

fn child<'v>(node: &'v Value, step: &str) -> Option<&'v Value> {
    match node {
        Value::Object(map) => map.get(step),
        Value::Array(items) => step.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_key_path_is_noop() {
        assert_eq!(descend(r#"{"a":1}"#, ""), json!(r#"{"a":1}"#));
    }

    #[test]
    fn test_plain_scalar_passes_through() {
        assert_eq!(descend("not json", "password"), json!("not json"));
    }

    #[test]
    fn test_top_level_field() {
        let body = r#"{"user":"u","password":"p"}"#;
        assert_eq!(descend(body, "password"), json!("p"));
    }

    #[test]
    fn test_nested_field_found_by_descent() {
        let body = r#"{"db":{"primary":{"host":"h1"}}}"#;
        assert_eq!(descend(body, "host"), json!("h1"));
    }

    #[test]
    fn test_dotted_path() {
        let body = r#"{"db":{"primary":{"host":"h1"},"replica":{"host":"h2"}}}"#;
        assert_eq!(descend(body, "replica.host"), json!("h2"));
    }

    #[test]
    fn test_array_index_step() {
        let body = r#"{"hosts":["a","b"]}"#;
        assert_eq!(descend(body, "hosts.1"), json!("b"));
    }

    #[test]
    fn test_scalar_match_becomes_text() {
        let body = r#"{"port":5432,"tls":true,"ratio":0.5,"note":null}"#;
        assert_eq!(descend(body, "port"), json!("5432"));
        assert_eq!(descend(body, "tls"), json!("true"));
        assert_eq!(descend(body, "ratio"), json!("0.5"));
        assert_eq!(descend(body, "note"), json!("null"));
    }

    #[test]
    fn test_non_scalar_match_keeps_shape() {
        let body = r#"{"opts":{"ssl":true},"hosts":["a","b"]}"#;
        assert_eq!(descend(body, "opts"), json!({"ssl": true}));
        assert_eq!(descend(body, "hosts"), json!(["a", "b"]));
    }

    #[test]
    fn test_zero_matches_is_empty() {
        assert_eq!(descend(r#"{"a":"b"}"#, "missing"), json!(""));
    }

    #[test]
    fn test_multiple_matches_is_empty() {
        let body = r#"{"a":{"host":"x"},"b":{"host":"y"}}"#;
        assert_eq!(descend(body, "host"), json!(""));
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&json!("p")), "p");
        assert_eq!(value_text(&json!(12)), "12");
        assert_eq!(value_text(&json!({"a":"b"})), r#"{"a":"b"}"#);
    }
}
