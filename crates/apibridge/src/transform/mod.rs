//! Sandboxed template evaluation for field mappings.
//!
//! A transform expression is a template mixing literal text with `{{ … }}`
//! spans; each span holds one CEL expression evaluated against the
//! per-field context (upstream responses by call name, the source response
//! merged at top level, and the `source` alias). CEL gives the sandbox:
//! data lookup, arithmetic, comparisons, conditionals, and a registered
//! function set, with no I/O, no imports, and strict failure on undefined
//! references.
//!
//! A template that is exactly one span yields the span's typed value; any
//! literal text forces string rendering followed by the scalar coercion
//! ladder, so `"42"` still comes out as a number.

mod value;

use std::collections::HashMap;
use std::sync::Arc;

use cel::extractors::This;
use cel::{Context, ExecutionError, Program, Value as CelValue};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub use value::{cel_to_json, json_to_cel, value_as_string};

#[derive(Debug, Error)]
pub enum TransformationError {
	#[error("invalid transformation syntax for '{field}': {message}")]
	Syntax { field: String, message: String },

	#[error("undefined variable in transformation for '{field}': {message}")]
	UndefinedReference { field: String, message: String },

	#[error("transformation failed for '{field}': {message}")]
	Evaluation { field: String, message: String },

	#[error("v1 source '{source}' not found in responses")]
	// r#source: the raw identifier keeps thiserror from treating this data
	// field as the error's source()
	MissingSource { r#source: String },

	#[error("field mapping for '{field}' has no v1_path and no transform")]
	MissingRule { field: String },
}

/// Evaluate a transform expression against a prepared context.
///
/// `field` is the destination path of the mapping being evaluated, carried
/// for diagnostics only.
pub fn evaluate(
	expression: &str,
	context: &HashMap<String, JsonValue>,
	field: &str,
) -> Result<JsonValue, TransformationError> {
	let template = Template::parse(expression).map_err(|message| TransformationError::Syntax {
		field: field.to_string(),
		message,
	})?;

	let mut ctx = Context::default();
	register_functions(&mut ctx);
	for (name, value) in context {
		ctx.add_variable_from_value(name.as_str(), json_to_cel(value));
	}

	// A bare expression keeps its evaluated type; strings still run the
	// coercion ladder so quoted scalars behave like rendered ones.
	if let Some(expr) = template.as_single_expr() {
		let value = eval_expr(expr, &ctx, field)?;
		return Ok(match value {
			CelValue::String(s) => coerce_scalar(s.as_ref().clone()),
			other => cel_to_json(&other),
		});
	}

	let mut rendered = String::new();
	for segment in &template.segments {
		match segment {
			Segment::Literal(text) => rendered.push_str(text),
			Segment::Expr(expr) => {
				let value = eval_expr(expr, &ctx, field)?;
				rendered.push_str(&value_as_string(&value));
			},
		}
	}
	Ok(coerce_scalar(rendered))
}

/// Build the evaluation context for one field mapping: every response by
/// call name, the source response's own fields merged at top level, and the
/// whole source response under the `source` alias.
pub fn build_context(
	responses: &HashMap<String, JsonValue>,
	source: &JsonValue,
) -> HashMap<String, JsonValue> {
	let mut context: HashMap<String, JsonValue> = responses.clone();
	if let JsonValue::Object(fields) = source {
		for (key, value) in fields {
			context.insert(key.clone(), value.clone());
		}
	}
	context.insert("source".to_string(), source.clone());
	context
}

/// Best-effort scalar coercion of a rendered template string, in fixed
/// order: JSON container, integer, float, boolean, else the original
/// string untouched.
pub fn coerce_scalar(rendered: String) -> JsonValue {
	let trimmed = rendered.trim();

	if trimmed.starts_with('{') || trimmed.starts_with('[') {
		if let Ok(parsed) = serde_json::from_str::<JsonValue>(trimmed) {
			return parsed;
		}
	}

	if !trimmed.contains('.')
		&& let Ok(int) = trimmed.parse::<i64>()
	{
		return JsonValue::from(int);
	}

	if let Ok(float) = trimmed.parse::<f64>() {
		return JsonValue::from(float);
	}

	if trimmed.eq_ignore_ascii_case("true") {
		return JsonValue::Bool(true);
	}
	if trimmed.eq_ignore_ascii_case("false") {
		return JsonValue::Bool(false);
	}

	JsonValue::String(rendered)
}

fn eval_expr(expr: &str, ctx: &Context, field: &str) -> Result<CelValue, TransformationError> {
	let program = Program::compile(expr).map_err(|e| TransformationError::Syntax {
		field: field.to_string(),
		message: e.to_string(),
	})?;

	program.execute(ctx).map_err(|e| match e {
		ExecutionError::UndeclaredReference(name) => TransformationError::UndefinedReference {
			field: field.to_string(),
			message: format!("'{name}' is not defined"),
		},
		ExecutionError::NoSuchKey(key) => TransformationError::UndefinedReference {
			field: field.to_string(),
			message: format!("no such key '{key}'"),
		},
		other => TransformationError::Evaluation {
			field: field.to_string(),
			message: other.to_string(),
		},
	})
}

// The allow-listed function set available to expressions, beyond CEL's
// built-ins. All pure.
fn register_functions(ctx: &mut Context) {
	ctx.add_function("upper", |This(s): This<Arc<String>>| -> String {
		s.to_uppercase()
	});
	ctx.add_function("lower", |This(s): This<Arc<String>>| -> String {
		s.to_lowercase()
	});
}

enum Segment {
	Literal(String),
	Expr(String),
}

struct Template {
	segments: Vec<Segment>,
}

impl Template {
	fn parse(raw: &str) -> Result<Template, String> {
		let mut segments = Vec::new();
		let mut rest = raw;

		while let Some(start) = rest.find("{{") {
			let (literal, tail) = rest.split_at(start);
			if !literal.is_empty() {
				segments.push(Segment::Literal(literal.to_string()));
			}

			let tail = &tail[2..];
			let Some(end) = tail.find("}}") else {
				return Err("unclosed '{{' delimiter".to_string());
			};
			let expr = tail[..end].trim();
			if expr.is_empty() {
				return Err("empty expression".to_string());
			}
			segments.push(Segment::Expr(expr.to_string()));
			rest = &tail[end + 2..];
		}

		if !rest.is_empty() {
			segments.push(Segment::Literal(rest.to_string()));
		}
		Ok(Template { segments })
	}

	fn as_single_expr(&self) -> Option<&str> {
		match self.segments.as_slice() {
			[Segment::Expr(expr)] => Some(expr),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use serde_json::json;

	use super::*;

	fn ctx(pairs: &[(&str, JsonValue)]) -> HashMap<String, JsonValue> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.clone()))
			.collect()
	}

	#[test]
	fn test_simple_field_reference() {
		let context = ctx(&[("policy_num", json!("POL-12345"))]);
		let result = evaluate("{{ policy_num }}", &context, "policyNumber").unwrap();
		assert_eq!(result, json!("POL-12345"));
	}

	#[test]
	fn test_nested_field_reference() {
		let context = ctx(&[("get_policy", json!({"premium": {"amount": 150}}))]);
		let result = evaluate("{{ get_policy.premium.amount }}", &context, "premium").unwrap();
		assert_eq!(result, json!(150));
	}

	#[test]
	fn test_concatenation_with_literal_space() {
		let context = ctx(&[
			("first_name", json!("John")),
			("last_name", json!("Doe")),
		]);
		let result = evaluate("{{ first_name }} {{ last_name }}", &context, "name").unwrap();
		assert_eq!(result, json!("John Doe"));
	}

	#[test]
	fn test_concatenation_with_operator() {
		let context = ctx(&[(
			"get_customer",
			json!({"first_name": "John", "last_name": "Doe"}),
		)]);
		let result = evaluate(
			"{{ get_customer.first_name + ' ' + get_customer.last_name }}",
			&context,
			"customerName",
		)
		.unwrap();
		assert_eq!(result, json!("John Doe"));
	}

	#[test]
	fn test_arithmetic_yields_number() {
		let context = ctx(&[("annual_premium", json!(150))]);
		let result = evaluate("{{ annual_premium * 12 }}", &context, "total").unwrap();
		assert_eq!(result, json!(1800));
	}

	#[test]
	fn test_conditional_expression() {
		let context = ctx(&[("status", json!("A"))]);
		let result = evaluate(
			"{{ status == 'A' ? 'active' : 'inactive' }}",
			&context,
			"status",
		)
		.unwrap();
		assert_eq!(result, json!("active"));
	}

	#[test]
	fn test_upper_and_lower_functions() {
		let context = ctx(&[("name", json!("John Doe"))]);
		assert_eq!(
			evaluate("{{ name.upper() }}", &context, "f").unwrap(),
			json!("JOHN DOE")
		);
		assert_eq!(
			evaluate("{{ name.lower() }}", &context, "f").unwrap(),
			json!("john doe")
		);
	}

	#[test]
	fn test_undefined_variable_fails() {
		let context = ctx(&[("present", json!(1))]);
		let err = evaluate("{{ missing }}", &context, "myField").unwrap_err();
		assert_matches!(err, TransformationError::UndefinedReference { ref field, .. } if field == "myField");
	}

	#[test]
	fn test_missing_key_fails() {
		let context = ctx(&[("source", json!({"a": 1}))]);
		let err = evaluate("{{ source.missing_key }}", &context, "f").unwrap_err();
		assert_matches!(err, TransformationError::UndefinedReference { .. });
	}

	#[test]
	fn test_syntax_error_reported() {
		let context = ctx(&[]);
		let err = evaluate("{{ 1 + }}", &context, "f").unwrap_err();
		assert_matches!(err, TransformationError::Syntax { .. });
	}

	#[test]
	fn test_unclosed_delimiter_is_syntax_error() {
		let context = ctx(&[("x", json!(1))]);
		let err = evaluate("{{ x", &context, "f").unwrap_err();
		assert_matches!(err, TransformationError::Syntax { .. });
	}

	#[test]
	fn test_coercion_table() {
		assert_eq!(coerce_scalar("42".to_string()), json!(42));
		assert_eq!(coerce_scalar("3.14".to_string()), json!(3.14));
		assert_eq!(coerce_scalar("true".to_string()), json!(true));
		assert_eq!(coerce_scalar("False".to_string()), json!(false));
		assert_eq!(coerce_scalar("hello".to_string()), json!("hello"));
		assert_eq!(coerce_scalar("{\"x\": 1}".to_string()), json!({"x": 1}));
		assert_eq!(coerce_scalar("[1, 2]".to_string()), json!([1, 2]));
	}

	#[test]
	fn test_coercion_leaves_invalid_json_alone() {
		assert_eq!(
			coerce_scalar("{not json".to_string()),
			json!("{not json")
		);
	}

	#[test]
	fn test_coercion_keeps_original_whitespace_for_strings() {
		assert_eq!(
			coerce_scalar("  spaced  ".to_string()),
			json!("  spaced  ")
		);
		// but numeric parsing works on the trimmed form
		assert_eq!(coerce_scalar(" 42 ".to_string()), json!(42));
	}

	#[test]
	fn test_rendered_string_through_template_coerces() {
		// quoted scalar from an expression behaves like rendered text
		let context = ctx(&[("n", json!("42"))]);
		assert_eq!(evaluate("{{ n }}", &context, "f").unwrap(), json!(42));

		// mixed template renders then coerces as a whole
		let context = ctx(&[("major", json!(1)), ("minor", json!(5))]);
		assert_eq!(
			evaluate("{{ major }}.{{ minor }}", &context, "f").unwrap(),
			json!(1.5)
		);
	}

	#[test]
	fn test_literal_prefix_blocks_number_coercion() {
		let context = ctx(&[("get_policy", json!({"policy_num": "POL1"}))]);
		let result = evaluate("Policy: {{ get_policy.policy_num }}", &context, "f").unwrap();
		assert_eq!(result, json!("Policy: POL1"));
	}

	#[test]
	fn test_typed_map_result_bypasses_rendering() {
		let context = ctx(&[("source", json!({"obj": {"x": 1}}))]);
		let result = evaluate("{{ source.obj }}", &context, "f").unwrap();
		assert_eq!(result, json!({"x": 1}));
	}

	#[test]
	fn test_build_context_merges_source_at_top_level() {
		let responses = HashMap::from([
			("get_policy".to_string(), json!({"policy_num": "P1"})),
			("get_coverage".to_string(), json!({"amount": 5})),
		]);
		let context = build_context(&responses, &json!({"policy_num": "P1"}));

		assert_eq!(context["get_policy"], json!({"policy_num": "P1"}));
		assert_eq!(context["get_coverage"], json!({"amount": 5}));
		assert_eq!(context["policy_num"], json!("P1"));
		assert_eq!(context["source"], json!({"policy_num": "P1"}));
	}

	#[test]
	fn test_build_context_with_array_source() {
		let responses = HashMap::from([("list_items".to_string(), json!([1, 2, 3]))]);
		let context = build_context(&responses, &json!([1, 2, 3]));

		// nothing to merge at top level; alias still present
		assert_eq!(context["source"], json!([1, 2, 3]));
		assert_eq!(context.len(), 2);
	}
}
