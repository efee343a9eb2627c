//! Configuration layering
//!
//! Every layer is turned into a JSON value and folded together:
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::{Map, Value};

/// Deep merge two JSON values; `overlay` wins on conflict.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

/// Convert a parsed TOML document into a JSON layer
pub fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Build the environment layer from `KYPER_HOST` and `KYPER_TOKEN`.
///
/// Empty variables are treated as unset.
pub fn env_layer<F>(lookup: F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    let mut layer = Map::new();
    let set = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(host) = set("KYPER_HOST") {
        layer.insert("host".to_string(), Value::String(host));
    }
    if let Some(token) = set("KYPER_TOKEN") {
        layer.insert("api_token".to_string(), Value::String(token));
    }
    Value::Object(layer)
}
