// Structural and referential validation for mapping documents
//
// The parse layer (serde) guarantees shape; this layer enforces the rules
// that span fields: method allow-list, call-name uniqueness, source
// resolution, transform delimiters. Errors are aggregated so authoring
// surfaces (the management API) can report every offense at once; the
// runtime load path treats any error as rejection.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::types::MappingDocument;

/// The five verbs a document may declare, inbound or upstream.
pub const ALLOWED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "DELETE", "PATCH"];

static CALL_NAME: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("call name pattern"));

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
	#[error("endpoint.v2_path must not be empty")]
	EmptyEndpointPath,

	#[error("{context}: unsupported method '{method}'")]
	UnsupportedMethod { context: String, method: String },

	#[error("v1_calls must declare at least one call")]
	NoCalls,

	#[error("field_mappings must declare at least one mapping")]
	NoFieldMappings,

	#[error("v1_calls[{index}]: name must be alphanumeric with underscores, got '{name}'")]
	InvalidCallName { index: usize, name: String },

	#[error("v1_calls[{index}] '{name}': endpoint must not be empty")]
	EmptyCallEndpoint { index: usize, name: String },

	#[error("duplicate v1 call name '{name}'")]
	DuplicateCallName { name: String },

	#[error("field mapping source '{source}' not found in v1_calls")]
	// r#source: the raw identifier keeps thiserror from treating this data
	// field as the error's source()
	UnknownSource { r#source: String },

	#[error("field_mappings[{index}] '{v2_path}': transform must contain {{{{ }}}} delimiters")]
	TransformNotTemplated { index: usize, v2_path: String },

	#[error("metadata.confidence_score must be within [0.0, 1.0], got {value}")]
	ConfidenceOutOfRange { value: f64 },
}

/// Outcome of validating one document.
#[derive(Debug, Default)]
pub struct ValidationResult {
	pub errors: Vec<ValidationError>,
	pub warnings: Vec<String>,
}

impl ValidationResult {
	pub fn ok() -> Self {
		Self::default()
	}

	pub fn is_ok(&self) -> bool {
		self.errors.is_empty()
	}

	pub fn add_error(&mut self, error: ValidationError) {
		self.errors.push(error);
	}

	pub fn add_warning(&mut self, warning: impl Into<String>) {
		self.warnings.push(warning.into());
	}

	/// All errors joined into one line, for log and envelope rendering
	pub fn error_summary(&self) -> String {
		self
			.errors
			.iter()
			.map(|e| e.to_string())
			.collect::<Vec<_>>()
			.join("; ")
	}
}

/// Validate one parsed document. Never mutates; methods and stub types are
/// already normalized at parse time.
pub fn validate_document(doc: &MappingDocument) -> ValidationResult {
	let mut result = ValidationResult::ok();

	if doc.endpoint.v2_path.trim().is_empty() {
		result.add_error(ValidationError::EmptyEndpointPath);
	}
	check_method(&mut result, "endpoint.v2_method", &doc.endpoint.v2_method);

	if doc.v1_calls.is_empty() {
		result.add_error(ValidationError::NoCalls);
	}
	if doc.field_mappings.is_empty() {
		result.add_error(ValidationError::NoFieldMappings);
	}

	let mut seen = std::collections::HashSet::new();
	for (index, call) in doc.v1_calls.iter().enumerate() {
		if !CALL_NAME.is_match(&call.name) {
			result.add_error(ValidationError::InvalidCallName {
				index,
				name: call.name.clone(),
			});
		}
		if call.endpoint.trim().is_empty() {
			result.add_error(ValidationError::EmptyCallEndpoint {
				index,
				name: call.name.clone(),
			});
		}
		check_method(&mut result, &format!("v1_calls[{index}].method"), &call.method);

		if !seen.insert(call.name.as_str()) {
			result.add_error(ValidationError::DuplicateCallName {
				name: call.name.clone(),
			});
		}
	}

	for (index, mapping) in doc.field_mappings.iter().enumerate() {
		if !mapping.is_stub() && doc.call(&mapping.source).is_none() {
			result.add_error(ValidationError::UnknownSource {
				source: mapping.source.clone(),
			});
		}

		if let Some(transform) = &mapping.transform
			&& (!transform.contains("{{") || !transform.contains("}}"))
		{
			result.add_error(ValidationError::TransformNotTemplated {
				index,
				v2_path: mapping.v2_path.clone(),
			});
		}

		if !mapping.is_stub() && mapping.v1_path.is_none() && mapping.transform.is_none() {
			result.add_warning(format!(
				"field_mappings[{index}] '{}': neither v1_path nor transform set; evaluation will fail",
				mapping.v2_path
			));
		}
	}

	if let Some(meta) = &doc.metadata
		&& !(0.0..=1.0).contains(&meta.confidence_score)
	{
		result.add_error(ValidationError::ConfidenceOutOfRange {
			value: meta.confidence_score,
		});
	}

	result
}

fn check_method(result: &mut ValidationResult, context: &str, method: &str) {
	if !ALLOWED_METHODS.contains(&method) {
		result.add_error(ValidationError::UnsupportedMethod {
			context: context.to_string(),
			method: method.to_string(),
		});
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::mapping::types::{EndpointSpec, FieldMapping, MappingDocument, UpstreamCall};

	fn valid_doc() -> MappingDocument {
		MappingDocument {
			version: "1.0".to_string(),
			endpoint: EndpointSpec::new("/v2/policies/{policy_id}", "GET"),
			v1_calls: vec![UpstreamCall::new("get_policy", "/v1/policy/{policy_id}")],
			field_mappings: vec![FieldMapping::from_v1(
				"policyNumber",
				"get_policy",
				"policy_num",
			)],
			metadata: None,
		}
	}

	#[test]
	fn test_valid_document_passes() {
		let result = validate_document(&valid_doc());
		assert!(result.is_ok(), "unexpected errors: {}", result.error_summary());
		assert!(result.warnings.is_empty());
	}

	#[test]
	fn test_unknown_source_rejected() {
		let mut doc = valid_doc();
		doc.field_mappings.push(FieldMapping::from_v1(
			"status",
			"get_status",
			"status",
		));

		let result = validate_document(&doc);
		assert!(!result.is_ok());
		assert!(result.errors.contains(&ValidationError::UnknownSource {
			source: "get_status".to_string()
		}));
	}

	#[test]
	fn test_stub_source_needs_no_call() {
		let mut doc = valid_doc();
		doc
			.field_mappings
			.push(FieldMapping::stub("currency", json!("SGD")));

		assert!(validate_document(&doc).is_ok());
	}

	#[test]
	fn test_duplicate_call_names_rejected() {
		let mut doc = valid_doc();
		doc
			.v1_calls
			.push(UpstreamCall::new("get_policy", "/v1/policy2"));

		let result = validate_document(&doc);
		assert!(result.errors.contains(&ValidationError::DuplicateCallName {
			name: "get_policy".to_string()
		}));
	}

	#[test]
	fn test_bad_call_name_rejected() {
		let mut doc = valid_doc();
		doc.v1_calls[0].name = "get-policy".to_string();
		// the mapping still references the old name; expect both errors
		let result = validate_document(&doc);

		assert_eq!(result.errors.len(), 2);
		assert!(matches!(
			result.errors[0],
			ValidationError::InvalidCallName { index: 0, .. }
		));
	}

	#[test]
	fn test_unsupported_method_rejected() {
		let mut doc = valid_doc();
		doc.endpoint.v2_method = "FETCH".to_string();

		let result = validate_document(&doc);
		assert!(result.errors.iter().any(|e| matches!(
			e,
			ValidationError::UnsupportedMethod { context, .. } if context == "endpoint.v2_method"
		)));
	}

	#[test]
	fn test_empty_sections_rejected() {
		let mut doc = valid_doc();
		doc.v1_calls.clear();
		doc.field_mappings.clear();

		let result = validate_document(&doc);
		assert!(result.errors.contains(&ValidationError::NoCalls));
		assert!(result.errors.contains(&ValidationError::NoFieldMappings));
	}

	#[test]
	fn test_transform_without_delimiters_rejected() {
		let mut doc = valid_doc();
		doc.field_mappings.push(FieldMapping::from_transform(
			"fullName",
			"get_policy",
			"first_name + last_name",
		));

		let result = validate_document(&doc);
		assert!(result.errors.iter().any(|e| matches!(
			e,
			ValidationError::TransformNotTemplated { index: 1, .. }
		)));
	}

	#[test]
	fn test_errors_aggregate() {
		let mut doc = valid_doc();
		doc.endpoint.v2_method = "FETCH".to_string();
		doc.v1_calls[0].endpoint = String::new();
		doc.field_mappings.push(FieldMapping::from_v1("x", "nope", "x"));

		let result = validate_document(&doc);
		assert!(result.errors.len() >= 3);
		let summary = result.error_summary();
		assert!(summary.contains("FETCH"));
		assert!(summary.contains("nope"));
	}

	#[test]
	fn test_missing_value_rule_warns() {
		let mut doc = valid_doc();
		doc.field_mappings[0].v1_path = None;

		let result = validate_document(&doc);
		assert!(result.is_ok());
		assert_eq!(result.warnings.len(), 1);
	}

	#[test]
	fn test_confidence_range_checked() {
		let mut doc = valid_doc();
		doc.metadata = Some(crate::mapping::types::DocumentMetadata {
			generated_at: None,
			confidence_score: 1.5,
			ambiguous_mappings: None,
			generator_version: "0.1.0".to_string(),
		});

		let result = validate_document(&doc);
		assert!(result.errors.contains(&ValidationError::ConfidenceOutOfRange {
			value: 1.5
		}));
	}
}
