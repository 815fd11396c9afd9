//! Upstream call orchestration.
//!
//! Executes a document's v1 calls in declaration order against the legacy
//! base URL, substituting path parameters, forwarding mapped query and
//! body parameters, and collecting the decoded JSON responses by call
//! name. The first failing call aborts the whole orchestration.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use http::{Method, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::mapping::types::{MappingDocument, UpstreamCall};

#[cfg(test)]
#[path = "orchestrate_test.rs"]
mod tests;

/// Decoded upstream responses, keyed by call name.
pub type ResponseSet = HashMap<String, Value>;

#[derive(Debug, Error)]
pub enum OrchestrationError {
	#[error("missing required path parameter: {name}")]
	MissingPathParam { name: String },

	#[error("resource not found in v1 api: {call}")]
	NotFound { call: String, body: String },

	#[error("v1 api server error: {call}")]
	ServerError {
		call: String,
		status: StatusCode,
		body: String,
	},

	#[error("v1 api client error: {call}")]
	ClientError {
		call: String,
		status: StatusCode,
		body: String,
	},

	#[error("v1 api timeout: {call}")]
	Timeout { call: String },

	#[error("v1 api network error: {call}: {source}")]
	Network {
		call: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("v1 api returned invalid json: {call}: {source}")]
	Decode {
		call: String,
		#[source]
		source: reqwest::Error,
	},
}

impl OrchestrationError {
	/// Status the adapter surfaces for this failure. Upstream 5xx and
	/// network failures become 502; timeouts become 504; other upstream
	/// client errors pass through unchanged.
	pub fn status(&self) -> StatusCode {
		match self {
			Self::MissingPathParam { .. } => StatusCode::BAD_REQUEST,
			Self::NotFound { .. } => StatusCode::NOT_FOUND,
			Self::ServerError { .. } | Self::Network { .. } => StatusCode::BAD_GATEWAY,
			Self::ClientError { status, .. } => *status,
			Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
			Self::Decode { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Extra payload attached to the error envelope.
	pub fn details(&self) -> Value {
		match self {
			Self::NotFound { body, .. } | Self::ClientError { body, .. } => {
				json!({"v1_response": body})
			},
			Self::ServerError { status, body, .. } => {
				json!({"v1_status": status.as_u16(), "v1_response": body})
			},
			Self::Network { source, .. } => json!({"error": source.to_string()}),
			_ => json!({}),
		}
	}
}

/// Drives the sequence of upstream calls for one request.
pub struct Orchestrator {
	client: reqwest::Client,
	base_url: String,
}

impl Orchestrator {
	pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
		let client = reqwest::Client::builder().timeout(timeout).build()?;
		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}

	/// Execute every call in the document against the collected request
	/// parameters, failing fast on the first error.
	pub async fn orchestrate(
		&self,
		document: &MappingDocument,
		params: &HashMap<String, Value>,
	) -> Result<ResponseSet, OrchestrationError> {
		let request_id = Uuid::new_v4();
		info!(
			%request_id,
			method = %document.endpoint.v2_method,
			path = %document.endpoint.v2_path,
			calls = document.v1_calls.len(),
			"orchestrating upstream calls"
		);

		let mut responses = ResponseSet::new();
		for call in &document.v1_calls {
			let data = self.execute_call(call, params, request_id).await?;
			responses.insert(call.name.clone(), data);
		}

		info!(%request_id, completed = responses.len(), "all upstream calls succeeded");
		Ok(responses)
	}

	async fn execute_call(
		&self,
		call: &UpstreamCall,
		params: &HashMap<String, Value>,
		request_id: Uuid,
	) -> Result<Value, OrchestrationError> {
		let url = self.build_url(call, params)?;
		let query = build_query(call, params);
		let body = build_body(call, params);

		info!(%request_id, call = %call.name, method = %call.method, %url, "executing upstream call");
		let started = Instant::now();

		let mut request = self.client.request(request_method(&call.method), &url).query(&query);
		if let Some(body) = &body {
			request = request.json(body);
		}

		let response = request.send().await.map_err(|e| {
			if e.is_timeout() {
				error!(%request_id, call = %call.name, "upstream call timed out");
				OrchestrationError::Timeout {
					call: call.name.clone(),
				}
			} else {
				error!(%request_id, call = %call.name, error = %e, "upstream call failed");
				OrchestrationError::Network {
					call: call.name.clone(),
					source: e,
				}
			}
		})?;

		let status = response.status();
		if status == StatusCode::NOT_FOUND {
			let body = response.text().await.unwrap_or_default();
			error!(%request_id, call = %call.name, "upstream resource not found");
			return Err(OrchestrationError::NotFound {
				call: call.name.clone(),
				body,
			});
		}
		if status.is_server_error() {
			let body = response.text().await.unwrap_or_default();
			error!(%request_id, call = %call.name, status = status.as_u16(), "upstream server error");
			return Err(OrchestrationError::ServerError {
				call: call.name.clone(),
				status,
				body,
			});
		}
		if status.is_client_error() {
			let body = response.text().await.unwrap_or_default();
			error!(%request_id, call = %call.name, status = status.as_u16(), "upstream client error");
			return Err(OrchestrationError::ClientError {
				call: call.name.clone(),
				status,
				body,
			});
		}

		let data = response.json::<Value>().await.map_err(|e| {
			if e.is_timeout() {
				OrchestrationError::Timeout {
					call: call.name.clone(),
				}
			} else {
				error!(%request_id, call = %call.name, error = %e, "upstream response is not valid json");
				OrchestrationError::Decode {
					call: call.name.clone(),
					source: e,
				}
			}
		})?;

		info!(
			%request_id,
			call = %call.name,
			status = status.as_u16(),
			duration_ms = started.elapsed().as_millis() as u64,
			"upstream call succeeded"
		);
		Ok(data)
	}

	/// Substitute mapped path parameters into the call's endpoint, in both
	/// `{name}` and `:name` placeholder styles, and prepend the base URL.
	fn build_url(
		&self,
		call: &UpstreamCall,
		params: &HashMap<String, Value>,
	) -> Result<String, OrchestrationError> {
		let mut path = call.endpoint.clone();
		for param in &call.params.path {
			let value = params
				.get(&param.v2_param)
				.filter(|v| !v.is_null())
				.ok_or_else(|| OrchestrationError::MissingPathParam {
					name: param.v2_param.clone(),
				})?;
			let rendered = param_to_string(value);
			path = path.replace(&format!("{{{}}}", param.v1_param), &rendered);
			path = path.replace(&format!(":{}", param.v1_param), &rendered);
		}
		Ok(format!("{}{}", self.base_url, path))
	}
}

fn request_method(method: &str) -> Method {
	match method {
		"POST" => Method::POST,
		"PUT" => Method::PUT,
		"PATCH" => Method::PATCH,
		"DELETE" => Method::DELETE,
		_ => Method::GET,
	}
}

fn build_query(call: &UpstreamCall, params: &HashMap<String, Value>) -> Vec<(String, String)> {
	let mut query = Vec::new();
	for param in &call.params.query {
		if let Some(value) = params.get(&param.v2_param)
			&& !value.is_null()
		{
			query.push((param.v1_param.clone(), param_to_string(value)));
		}
	}
	query
}

// Absent body mappings mean no request body at all; present mappings with
// no matching parameters still send an empty object.
fn build_body(call: &UpstreamCall, params: &HashMap<String, Value>) -> Option<Value> {
	if call.params.body.is_empty() {
		return None;
	}
	let mut body = serde_json::Map::new();
	for param in &call.params.body {
		if let Some(value) = params.get(&param.v2_param)
			&& !value.is_null()
		{
			body.insert(param.v1_param.clone(), value.clone());
		}
	}
	Some(Value::Object(body))
}

fn param_to_string(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}
