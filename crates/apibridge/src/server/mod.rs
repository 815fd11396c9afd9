// HTTP surface: dynamic V2 dispatch plus health and management routes
//
// Mapping documents are not registered as individual axum routes. Fixed
// routes (health, service info, management API) are declared normally;
// everything else falls through to the dispatch handler, which matches
// the request against the current registry snapshot and runs the
// extract -> orchestrate -> assemble pipeline.

pub mod admin;
pub mod binding;

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{Value, json};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::assemble;
use crate::mapping::store::{RegistryStore, RouteMatch};
use crate::orchestrate::{OrchestrationError, Orchestrator};

pub const SERVICE_NAME: &str = "apibridge";

#[derive(Clone)]
pub struct AppState {
	pub registry: Arc<RegistryStore>,
	pub orchestrator: Arc<Orchestrator>,
}

pub fn build_router(state: AppState, cors_origin: &str) -> Router {
	let mut cors = CorsLayer::new()
		.allow_methods(AllowMethods::mirror_request())
		.allow_headers(AllowHeaders::mirror_request())
		.allow_credentials(true);
	match cors_origin.parse::<HeaderValue>() {
		Ok(origin) => cors = cors.allow_origin(origin),
		Err(_) => warn!(origin = cors_origin, "invalid cors origin, cross-origin requests disabled"),
	}

	Router::new()
		.route("/health", get(health))
		.route("/", get(service_info))
		.route("/configs", get(admin::list_configs))
		.route(
			"/configs/{id}",
			get(admin::get_config)
				.put(admin::update_config)
				.delete(admin::delete_config),
		)
		.route("/configs/{id}/export", get(admin::export_config))
		.fallback(dispatch)
		.layer(cors)
		.with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
	Json(json!({
		"status": "healthy",
		"service": SERVICE_NAME,
		"version": env!("CARGO_PKG_VERSION"),
		"endpoints_loaded": state.registry.loaded_count(),
		"timestamp": Utc::now().to_rfc3339(),
	}))
}

async fn service_info(State(state): State<AppState>) -> Json<Value> {
	let endpoints: Vec<Value> = state
		.registry
		.get_arc()
		.map(|snapshot| {
			snapshot
				.documents
				.values()
				.map(|doc| json!({ "path": doc.endpoint.v2_path, "method": doc.endpoint.v2_method }))
				.collect()
		})
		.unwrap_or_default();

	Json(json!({
		"service": SERVICE_NAME,
		"version": env!("CARGO_PKG_VERSION"),
		"endpoints": endpoints,
	}))
}

/// Generic handler for every adapter endpoint: match the request against
/// the snapshot's route bindings, merge parameters, run the pipeline.
async fn dispatch(State(state): State<AppState>, method: Method, uri: Uri, body: Bytes) -> Response {
	let request_id = Uuid::new_v4();
	let path = uri.path();

	let Some(snapshot) = state.registry.get_arc() else {
		return route_miss(StatusCode::NOT_FOUND);
	};
	let (document, path_params) = match snapshot.resolve(method.as_str(), path) {
		RouteMatch::Found { document, params } => (document, params),
		RouteMatch::MethodMismatch => return route_miss(StatusCode::METHOD_NOT_ALLOWED),
		RouteMatch::NotFound => return route_miss(StatusCode::NOT_FOUND),
	};

	info!(%request_id, %method, path, "handling adapter request");

	let params = match collect_params(&method, &uri, path_params, &body) {
		Ok(params) => params,
		Err(()) => {
			warn!(%request_id, path, "request body is json but not an object");
			return ApiError::invalid_request(request_id).into_response();
		},
	};

	let responses = match state.orchestrator.orchestrate(&document, &params).await {
		Ok(responses) => responses,
		Err(OrchestrationError::Decode { call, source }) => {
			error!(%request_id, call, error = %source, "upstream response is not valid json");
			return ApiError::internal(request_id).into_response();
		},
		Err(e) => {
			warn!(%request_id, error = %e, "orchestration failed");
			return ApiError::orchestration(&e, request_id).into_response();
		},
	};

	let assembled = match assemble::build_response(&document, &responses) {
		Ok(assembled) => assembled,
		Err(e) => {
			error!(%request_id, error = %e, "response assembly failed");
			return ApiError::transformation(request_id).into_response();
		},
	};

	info!(%request_id, path, "adapter request complete");
	(
		[("x-request-id", request_id.to_string())],
		Json(assembled),
	)
		.into_response()
}

/// Merge path, query, and body parameters into the unified bag, later
/// entries overriding earlier ones. Body parameters apply only to
/// POST/PUT/PATCH; a body that does not parse as JSON contributes
/// nothing, while valid JSON that is not an object is rejected.
fn collect_params(
	method: &Method,
	uri: &Uri,
	path_params: HashMap<String, String>,
	body: &Bytes,
) -> Result<HashMap<String, Value>, ()> {
	let mut params: HashMap<String, Value> = path_params
		.into_iter()
		.map(|(name, value)| (name, Value::String(value)))
		.collect();

	if let Some(query) = uri.query() {
		for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
			params.insert(name.into_owned(), Value::String(value.into_owned()));
		}
	}

	let accepts_body =
		*method == Method::POST || *method == Method::PUT || *method == Method::PATCH;
	if accepts_body && !body.is_empty() {
		match serde_json::from_slice::<Value>(body) {
			Ok(Value::Object(fields)) => {
				for (name, value) in fields {
					params.insert(name, value);
				}
			},
			Ok(_) => return Err(()),
			Err(_) => {},
		}
	}

	Ok(params)
}

/// Unmatched requests get the plain framework-style body, not the
/// adapter error envelope; they never entered the pipeline.
fn route_miss(status: StatusCode) -> Response {
	let detail = if status == StatusCode::METHOD_NOT_ALLOWED {
		"Method Not Allowed"
	} else {
		"Not Found"
	};
	(status, Json(json!({ "detail": detail }))).into_response()
}

/// Error envelope for the dynamic dispatch surface:
/// `{error, code, request_id, details?}`.
struct ApiError {
	status: StatusCode,
	message: String,
	code: String,
	details: Option<Value>,
	request_id: Uuid,
}

impl ApiError {
	fn invalid_request(request_id: Uuid) -> Self {
		Self {
			status: StatusCode::BAD_REQUEST,
			message: "Invalid request parameters".to_string(),
			code: "INVALID_REQUEST".to_string(),
			details: None,
			request_id,
		}
	}

	fn transformation(request_id: Uuid) -> Self {
		Self {
			status: StatusCode::INTERNAL_SERVER_ERROR,
			message: "Failed to transform response".to_string(),
			code: "TRANSFORMATION_ERROR".to_string(),
			details: None,
			request_id,
		}
	}

	fn internal(request_id: Uuid) -> Self {
		Self {
			status: StatusCode::INTERNAL_SERVER_ERROR,
			message: "Internal server error".to_string(),
			code: "INTERNAL_ERROR".to_string(),
			details: None,
			request_id,
		}
	}

	/// Upstream failures carry a `V1_ERROR_{status}` code and always a
	/// details object, possibly empty.
	fn orchestration(error: &OrchestrationError, request_id: Uuid) -> Self {
		let status = error.status();
		let message = match status.as_u16() {
			404 => "Resource not found in legacy system",
			502 => "Legacy system error",
			504 => "Legacy system timeout",
			_ => "API error",
		};
		Self {
			status,
			message: message.to_string(),
			code: format!("V1_ERROR_{}", status.as_u16()),
			details: Some(error.details()),
			request_id,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let mut body = json!({
			"error": self.message,
			"code": self.code,
			"request_id": self.request_id.to_string(),
		});
		if let Some(details) = self.details
			&& let Some(fields) = body.as_object_mut()
		{
			fields.insert("details".to_string(), details);
		}
		(self.status, Json(body)).into_response()
	}
}
