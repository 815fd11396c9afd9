// Mapping document types
//
// One document per exposed V2 endpoint:
// - endpoint: the inbound route (templated path + method)
// - v1_calls: ordered upstream calls with parameter mappings
// - field_mappings: how upstream responses become the V2 response
// - metadata: generation provenance, not consumed by the request pipeline

use serde::{Deserialize, Serialize};

/// Root mapping document, parsed from one YAML file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingDocument {
	/// Document format version, informational
	#[serde(default = "default_version")]
	pub version: String,

	/// Inbound V2 route this document implements
	pub endpoint: EndpointSpec,

	/// Upstream calls, executed sequentially in declaration order
	pub v1_calls: Vec<UpstreamCall>,

	/// Response field rules, applied in declaration order
	pub field_mappings: Vec<FieldMapping>,

	/// Generation provenance (confidence, ambiguities)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<DocumentMetadata>,
}

fn default_version() -> String {
	"1.0".to_string()
}

impl MappingDocument {
	/// Look up an upstream call by name
	pub fn call(&self, name: &str) -> Option<&UpstreamCall> {
		self.v1_calls.iter().find(|c| c.name == name)
	}

	/// Number of field mappings marked approved
	pub fn approved_count(&self) -> usize {
		self.field_mappings.iter().filter(|m| m.approved).count()
	}

	/// Whether the metadata carries ambiguous-mapping annotations
	pub fn has_ambiguous_mappings(&self) -> bool {
		self
			.metadata
			.as_ref()
			.and_then(|m| m.ambiguous_mappings.as_ref())
			.is_some_and(|a| !a.is_empty())
	}
}

/// Inbound V2 route: templated path ("{param}" placeholders) plus method.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointSpec {
	pub v2_path: String,

	#[serde(default = "default_method", deserialize_with = "de_method")]
	pub v2_method: String,
}

impl EndpointSpec {
	pub fn new(v2_path: impl Into<String>, v2_method: impl Into<String>) -> Self {
		Self {
			v2_path: v2_path.into(),
			v2_method: v2_method.into().to_uppercase(),
		}
	}
}

/// One upstream (V1) HTTP call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamCall {
	/// Unique name within the document; response-set key
	pub name: String,

	/// Upstream path template; placeholders as "{id}" or ":id"
	pub endpoint: String,

	#[serde(default = "default_method", deserialize_with = "de_method")]
	pub method: String,

	/// Parameter mappings grouped by upstream destination
	#[serde(default, skip_serializing_if = "CallParams::is_empty")]
	pub params: CallParams,
}

fn default_method() -> String {
	"GET".to_string()
}

// Methods are uppercased on the way in so the validator and the
// orchestrator never see mixed-case values.
fn de_method<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: serde::Deserializer<'de>,
{
	Ok(String::deserialize(deserializer)?.to_uppercase())
}

impl UpstreamCall {
	pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			endpoint: endpoint.into(),
			method: default_method(),
			params: CallParams::default(),
		}
	}

	pub fn with_method(mut self, method: impl Into<String>) -> Self {
		self.method = method.into().to_uppercase();
		self
	}

	pub fn with_path_params(mut self, params: Vec<ParamMapping>) -> Self {
		self.params.path = params;
		self
	}

	pub fn with_query_params(mut self, params: Vec<ParamMapping>) -> Self {
		self.params.query = params;
		self
	}

	pub fn with_body_params(mut self, params: Vec<ParamMapping>) -> Self {
		self.params.body = params;
		self
	}
}

/// Parameter mappings keyed by where they land in the upstream request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CallParams {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub path: Vec<ParamMapping>,

	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub query: Vec<ParamMapping>,

	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub body: Vec<ParamMapping>,
}

impl CallParams {
	pub fn is_empty(&self) -> bool {
		self.path.is_empty() && self.query.is_empty() && self.body.is_empty()
	}
}

/// Single parameter translation: read `v2_param` from the unified inbound
/// bag, send it upstream as `v1_param`.
///
/// `location` records where the value conceptually originates in the V2
/// request. Extraction deliberately ignores it and keys by `v2_param` alone;
/// see the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParamMapping {
	pub v2_param: String,

	pub v1_param: String,

	#[serde(default)]
	pub location: ParamLocation,
}

impl ParamMapping {
	pub fn new(
		v2_param: impl Into<String>,
		v1_param: impl Into<String>,
		location: ParamLocation,
	) -> Self {
		Self {
			v2_param: v2_param.into(),
			v1_param: v1_param.into(),
			location,
		}
	}
}

/// Where a parameter originates in the V2 request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
	Path,
	#[default]
	Query,
	Body,
}

/// One output field rule: produce the value at `v2_path` from an upstream
/// response (`v1_path` or `transform`) or from a fixed stub.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldMapping {
	/// Dot-delimited destination path in the V2 response
	pub v2_path: String,

	/// Name of the upstream call supplying the value, or "stub"
	pub source: String,

	/// Dot-delimited path into the source response
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub v1_path: Option<String>,

	/// Template expression evaluated against the response set
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transform: Option<String>,

	/// Literal value emitted when source is "stub"
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stub_value: Option<serde_json::Value>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stub_type: Option<StubType>,

	#[serde(default)]
	pub approved: bool,

	#[serde(default)]
	pub edited: bool,
}

impl FieldMapping {
	/// Mapping that copies a field out of an upstream response
	pub fn from_v1(
		v2_path: impl Into<String>,
		source: impl Into<String>,
		v1_path: impl Into<String>,
	) -> Self {
		Self {
			v2_path: v2_path.into(),
			source: source.into(),
			v1_path: Some(v1_path.into()),
			transform: None,
			stub_value: None,
			stub_type: None,
			approved: false,
			edited: false,
		}
	}

	/// Mapping that evaluates a template expression
	pub fn from_transform(
		v2_path: impl Into<String>,
		source: impl Into<String>,
		transform: impl Into<String>,
	) -> Self {
		Self {
			v2_path: v2_path.into(),
			source: source.into(),
			v1_path: None,
			transform: Some(transform.into()),
			stub_value: None,
			stub_type: None,
			approved: false,
			edited: false,
		}
	}

	/// Mapping that emits a fixed literal
	pub fn stub(v2_path: impl Into<String>, stub_value: serde_json::Value) -> Self {
		Self {
			v2_path: v2_path.into(),
			source: "stub".to_string(),
			v1_path: None,
			transform: None,
			stub_value: Some(stub_value),
			stub_type: None,
			approved: false,
			edited: false,
		}
	}

	pub fn is_stub(&self) -> bool {
		self.source == "stub"
	}
}

/// Stub value categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StubType {
	Null,
	ConfigurableDefault,
	EmptyString,
	EmptyArray,
}

// Unrecognized stub types normalize to `configurable_default` instead of
// failing the parse. Documents in the wild carry free-form values here.
impl<'de> Deserialize<'de> for StubType {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		Ok(match raw.as_str() {
			"null" => StubType::Null,
			"empty_string" => StubType::EmptyString,
			"empty_array" => StubType::EmptyArray,
			_ => StubType::ConfigurableDefault,
		})
	}
}

/// Provenance recorded by the document generator. Informational only; the
/// management API surfaces it, the request pipeline never reads it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentMetadata {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub generated_at: Option<String>,

	/// Overall mapping confidence in [0.0, 1.0]
	#[serde(default)]
	pub confidence_score: f64,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ambiguous_mappings: Option<Vec<AmbiguousMapping>>,

	#[serde(default = "default_generator_version")]
	pub generator_version: String,
}

fn default_generator_version() -> String {
	"0.1.0".to_string()
}

/// A field the generator could not map with confidence, with the proposals
/// it considered.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AmbiguousMapping {
	pub v2_field: String,

	#[serde(default)]
	pub proposals: Vec<serde_json::Value>,
}
