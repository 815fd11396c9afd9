//! Conversions between the CEL value space and JSON.

use std::collections::HashMap;
use std::sync::Arc;

use cel::Value as CelValue;
use cel::objects::{Key, Map};
use serde_json::Value as JsonValue;

/// Convert a JSON value into a CEL value.
///
/// JSON integers become `Int` whenever they fit in an `i64`, so that
/// arithmetic and comparisons against integer literals stay within one
/// numeric type.
pub fn json_to_cel(value: &JsonValue) -> CelValue {
	match value {
		JsonValue::Null => CelValue::Null,
		JsonValue::Bool(b) => CelValue::Bool(*b),
		JsonValue::Number(n) => {
			if let Some(i) = n.as_i64() {
				CelValue::Int(i)
			} else if let Some(u) = n.as_u64() {
				CelValue::UInt(u)
			} else {
				CelValue::Float(n.as_f64().unwrap_or_default())
			}
		},
		JsonValue::String(s) => CelValue::String(Arc::new(s.clone())),
		JsonValue::Array(items) => CelValue::List(Arc::new(items.iter().map(json_to_cel).collect())),
		JsonValue::Object(fields) => {
			let map: HashMap<Key, CelValue> = fields
				.iter()
				.map(|(k, v)| (Key::String(Arc::new(k.clone())), json_to_cel(v)))
				.collect();
			CelValue::Map(Map { map: Arc::new(map) })
		},
	}
}

/// Convert an evaluated CEL value into JSON. Total: values with no JSON
/// counterpart (functions, non-finite floats) become null.
pub fn cel_to_json(value: &CelValue) -> JsonValue {
	match value {
		CelValue::Null => JsonValue::Null,
		CelValue::Bool(b) => JsonValue::Bool(*b),
		CelValue::Int(i) => JsonValue::from(*i),
		CelValue::UInt(u) => JsonValue::from(*u),
		CelValue::Float(f) => JsonValue::from(*f),
		CelValue::String(s) => JsonValue::String(s.as_ref().clone()),
		CelValue::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
		CelValue::List(items) => JsonValue::Array(items.iter().map(cel_to_json).collect()),
		CelValue::Map(map) => {
			let mut object = serde_json::Map::new();
			for (key, item) in map.map.iter() {
				object.insert(key_to_string(key), cel_to_json(item));
			}
			JsonValue::Object(object)
		},
		CelValue::Duration(d) => JsonValue::String(format!("{}s", d.num_seconds())),
		CelValue::Timestamp(t) => JsonValue::String(t.to_rfc3339()),
		_ => JsonValue::Null,
	}
}

/// Render a CEL value as it should appear inside template text. Strings
/// render bare (no quotes) and floats keep a trailing `.0`, so a
/// whole-number float survives the scalar coercion applied after
/// rendering.
pub fn value_as_string(value: &CelValue) -> String {
	match value {
		CelValue::String(s) => s.as_ref().clone(),
		CelValue::Int(i) => i.to_string(),
		CelValue::UInt(u) => u.to_string(),
		CelValue::Float(f) => format!("{f:?}"),
		CelValue::Bool(b) => b.to_string(),
		CelValue::Null => "null".to_string(),
		CelValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
		CelValue::Duration(d) => format!("{}s", d.num_seconds()),
		CelValue::Timestamp(t) => t.to_rfc3339(),
		other => cel_to_json(other).to_string(),
	}
}

fn key_to_string(key: &Key) -> String {
	match key {
		Key::String(s) => s.as_ref().clone(),
		Key::Int(i) => i.to_string(),
		Key::Uint(u) => u.to_string(),
		Key::Bool(b) => b.to_string(),
	}
}
