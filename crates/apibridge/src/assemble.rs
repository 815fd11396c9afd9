//! Nested response assembly.
//!
//! Walks a document's field mappings in declaration order, resolves each
//! value from the collected upstream responses (direct read, template
//! transform, or stub), and writes it into the response object at the
//! dot-delimited destination path, creating intermediate objects along
//! the way.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::mapping::types::{FieldMapping, MappingDocument};
use crate::transform::{self, TransformationError};

#[cfg(test)]
#[path = "assemble_test.rs"]
mod tests;

#[derive(Debug, Error)]
pub enum AssemblyError {
	#[error("failed to map required field '{field}': {source}")]
	Field {
		field: String,
		#[source]
		source: TransformationError,
	},

	#[error("failed to build field '{field}': {source}")]
	Structure {
		field: String,
		#[source]
		source: PathError,
	},
}

/// Errors from writing into the assembled object.
#[derive(Debug, Error, PartialEq)]
pub enum PathError {
	#[error("empty destination path")]
	Empty,

	#[error("cannot set nested value at '{path}': '{segment}' is not an object")]
	Conflict { path: String, segment: String },
}

/// Assemble the response object for one document from the collected
/// upstream responses, keyed by call name.
pub fn build_response(
	document: &MappingDocument,
	responses: &HashMap<String, Value>,
) -> Result<Value, AssemblyError> {
	let mut assembled = Value::Object(serde_json::Map::new());

	for mapping in &document.field_mappings {
		let value = match resolve_field(mapping, responses) {
			Ok(value) => value,
			// A failing stub mapping is dropped from the response; every
			// other mapping is required.
			Err(err) if mapping.is_stub() => {
				error!(field = %mapping.v2_path, error = %err, "transformation failed, dropping stub field");
				continue;
			},
			Err(err) => {
				return Err(AssemblyError::Field {
					field: mapping.v2_path.clone(),
					source: err,
				});
			},
		};

		debug!(field = %mapping.v2_path, ?value, "mapped field");
		set_nested_value(&mut assembled, &mapping.v2_path, value).map_err(|err| {
			AssemblyError::Structure {
				field: mapping.v2_path.clone(),
				source: err,
			}
		})?;
	}

	Ok(assembled)
}

fn resolve_field(
	mapping: &FieldMapping,
	responses: &HashMap<String, Value>,
) -> Result<Value, TransformationError> {
	if mapping.is_stub() {
		return Ok(mapping.stub_value.clone().unwrap_or(Value::Null));
	}

	let source = responses
		.get(&mapping.source)
		.ok_or_else(|| TransformationError::MissingSource {
			source: mapping.source.clone(),
		})?;

	// Empty strings in either rule slot read as absent.
	if let Some(expression) = mapping.transform.as_deref()
		&& !expression.is_empty()
	{
		let context = transform::build_context(responses, source);
		return transform::evaluate(expression, &context, &mapping.v2_path);
	}

	if let Some(path) = mapping.v1_path.as_deref()
		&& !path.is_empty()
	{
		let value = get_nested_value(source, path)
			.cloned()
			.unwrap_or(Value::Null);
		if value.is_null() {
			warn!(v1_path = %path, source = %mapping.source, "v1 field not found in source response");
		}
		return Ok(value);
	}

	Err(TransformationError::MissingRule {
		field: mapping.v2_path.clone(),
	})
}

/// Read a dot-delimited path out of a response value. A leading dot and
/// empty segments are ignored; an empty path yields the whole value.
pub fn get_nested_value<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
	let path = path.strip_prefix('.').unwrap_or(path);
	let mut current = data;
	for segment in path.split('.').filter(|s| !s.is_empty()) {
		current = current.as_object()?.get(segment)?;
	}
	Some(current)
}

/// Write a value at a dot-delimited path, creating intermediate objects.
/// Fails when an intermediate position is already held by a non-object.
pub fn set_nested_value(target: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
	let full_path = path;
	let path = path.strip_prefix('.').unwrap_or(path);
	let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
	let Some((last, intermediate)) = segments.split_last() else {
		return Err(PathError::Empty);
	};

	let mut current = target;
	for segment in intermediate {
		let object = current
			.as_object_mut()
			.ok_or_else(|| PathError::Conflict {
				path: full_path.to_string(),
				segment: (*segment).to_string(),
			})?;
		let child = object
			.entry(*segment)
			.or_insert_with(|| Value::Object(serde_json::Map::new()));
		if !child.is_object() {
			return Err(PathError::Conflict {
				path: full_path.to_string(),
				segment: (*segment).to_string(),
			});
		}
		current = child;
	}

	let object = current
		.as_object_mut()
		.ok_or_else(|| PathError::Conflict {
			path: full_path.to_string(),
			segment: (*last).to_string(),
		})?;
	object.insert((*last).to_string(), value);
	Ok(())
}
