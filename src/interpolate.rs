use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

fn variable_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("variable regex"))
}

/// Rewrites `${a.b.c}` references inside string scalars against `context`.
///
/// Mapping keys are never rewritten and non-string leaves pass through
/// unchanged. A reference whose path does not fully resolve keeps its
/// literal `${...}` text.
pub fn interpolate_value(value: &Value, context: &Map<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate_str(s, context)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| interpolate_value(v, context)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Interpolates every value of a tool-argument map.
pub fn interpolate_args(
    args: &Map<String, Value>,
    context: &Map<String, Value>,
) -> Map<String, Value> {
    args.iter()
        .map(|(k, v)| (k.clone(), interpolate_value(v, context)))
        .collect()
}

fn interpolate_str(input: &str, context: &Map<String, Value>) -> String {
    variable_pattern()
        .replace_all(input, |caps: &Captures| {
            // A stored null is indistinguishable from a miss and stays literal.
            match resolve_path(&caps[1], context) {
                Some(v) if !v.is_null() => stringify(v),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Walks a dotted path through nested mappings. Any missing segment or
/// non-mapping intermediate resolves to `None`.
fn resolve_path<'a>(path: &str, context: &'a Map<String, Value>) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = context.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn resolves_nested_path() {
        let context = ctx(json!({"stored": {"user_id": 42}}));
        let out = interpolate_value(
            &json!("DELETE FROM users WHERE id = ${stored.user_id}"),
            &context,
        );
        assert_eq!(out, json!("DELETE FROM users WHERE id = 42"));
    }

    #[test]
    fn missing_path_stays_literal() {
        let context = ctx(json!({"stored": {}}));
        let out = interpolate_value(&json!("x ${stored.absent} y"), &context);
        assert_eq!(out, json!("x ${stored.absent} y"));
    }

    #[test]
    fn non_mapping_intermediate_stays_literal() {
        let context = ctx(json!({"stored": {"token": "abc"}}));
        let out = interpolate_value(&json!("${stored.token.deeper}"), &context);
        assert_eq!(out, json!("${stored.token.deeper}"));
    }

    #[test]
    fn null_value_stays_literal() {
        let context = ctx(json!({"stored": {"gone": null}}));
        let out = interpolate_value(&json!("${stored.gone}"), &context);
        assert_eq!(out, json!("${stored.gone}"));
    }

    #[test]
    fn booleans_and_numbers_stringify() {
        let context = ctx(json!({"flags": {"on": true}, "n": 1.5}));
        assert_eq!(
            interpolate_value(&json!("${flags.on}/${n}"), &context),
            json!("true/1.5")
        );
    }

    #[test]
    fn composites_render_as_compact_json() {
        let context = ctx(json!({"row": {"id": 1, "tags": ["a"]}}));
        assert_eq!(
            interpolate_value(&json!("got ${row}"), &context),
            json!(r#"got {"id":1,"tags":["a"]}"#)
        );
    }

    #[test]
    fn recurses_through_arrays_and_objects_without_touching_keys() {
        let context = ctx(json!({"stored": {"name": "alice"}}));
        let out = interpolate_value(
            &json!({"${stored.name}": "literal-key-stays", "list": ["${stored.name}", 7]}),
            &context,
        );
        assert_eq!(
            out,
            json!({"${stored.name}": "literal-key-stays", "list": ["alice", 7]})
        );
    }

    #[test]
    fn non_string_leaves_pass_through_typed() {
        let context = ctx(json!({}));
        let input = json!({"n": 3, "b": false, "f": 2.25, "z": null});
        assert_eq!(interpolate_value(&input, &context), input);
    }

    #[test]
    fn idempotent_once_resolved() {
        let context = ctx(json!({"a": {"b": "done"}}));
        let first = interpolate_value(&json!("${a.b}"), &context);
        let second = interpolate_value(&first, &context);
        assert_eq!(first, second);
    }

    #[test]
    fn interpolates_argument_maps() {
        let context = ctx(json!({"stored": {"id": 9}}));
        let args = ctx(json!({"sql": "SELECT ${stored.id}", "limit": 1}));
        let out = interpolate_args(&args, &context);
        assert_eq!(out.get("sql"), Some(&json!("SELECT 9")));
        assert_eq!(out.get("limit"), Some(&json!(1)));
    }
}
