// Management API for mapping documents
//
// Serves the authoring UI: list, inspect, edit, delete, and export the
// YAML documents behind the adapter endpoints. Responses use a
// `{success, data|error|message}` envelope and report failures in-band
// with HTTP 200, except export which returns raw YAML.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::mapping::types::MappingDocument;
use crate::mapping::validation::validate_document;
use crate::server::AppState;

pub async fn list_configs(State(state): State<AppState>) -> Json<Value> {
	// Authoring view: read the directory fresh rather than the serving
	// snapshot, so unsaved-on-disk edits show up immediately.
	let documents = match state.registry.loader().load_all().await {
		Ok(documents) => documents,
		Err(e) => {
			error!(error = %e, "failed to list configurations");
			Default::default()
		},
	};

	let summaries: Vec<Value> = documents
		.iter()
		.map(|(id, document)| summarize(id, document))
		.collect();
	success_data(json!(summaries))
}

pub async fn get_config(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
	if !valid_id(&id) {
		return failure("Configuration not found");
	}

	match state.registry.loader().load(&id).await {
		Ok(document) => return success_data(document_json(&document)),
		Err(e) => debug!(id, error = %e, "disk read missed, trying serving snapshot"),
	}
	if let Some(snapshot) = state.registry.get_arc()
		&& let Some(document) = snapshot.documents.get(&id)
	{
		return success_data(document_json(document));
	}
	failure("Configuration not found")
}

pub async fn update_config(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(document): Json<MappingDocument>,
) -> Json<Value> {
	if !valid_id(&id) || !in_registry(&state, &id) {
		return failure("Configuration not found");
	}

	let result = validate_document(&document);
	if !result.is_ok() {
		return failure(format!("Invalid configuration: {}", result.error_summary()));
	}

	// The serving snapshot picks up the edit immediately; the file is
	// rewritten only when it still exists on disk.
	state.registry.upsert(&id, document.clone());
	if state.registry.loader().exists(&id).await
		&& let Err(e) = state.registry.loader().write(&id, &document).await
	{
		error!(id, error = %e, "failed to persist configuration");
		return failure(format!("Failed to update configuration: {e}"));
	}

	info!(id, "configuration updated");
	success_message("Configuration updated successfully")
}

pub async fn delete_config(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
	if !valid_id(&id) || !in_registry(&state, &id) {
		return failure("Configuration not found");
	}

	state.registry.remove(&id);
	if let Err(e) = state.registry.loader().delete(&id).await {
		error!(id, error = %e, "failed to delete configuration file");
		return failure(format!("Failed to delete configuration: {e}"));
	}

	info!(id, "configuration deleted");
	success_message(format!("Configuration '{id}' deleted successfully"))
}

pub async fn export_config(State(state): State<AppState>, Path(id): Path<String>) -> Response {
	let Some(document) = (valid_id(&id))
		.then(|| state.registry.get_arc())
		.flatten()
		.and_then(|snapshot| snapshot.documents.get(&id).cloned())
	else {
		return failure("Configuration not found").into_response();
	};

	match serde_yaml::to_string(document.as_ref()) {
		Ok(yaml) => ([(header::CONTENT_TYPE, "application/x-yaml")], yaml).into_response(),
		Err(e) => {
			error!(id, error = %e, "failed to serialize configuration");
			failure(format!("Failed to export configuration: {e}")).into_response()
		},
	}
}

fn summarize(id: &str, document: &MappingDocument) -> Value {
	let metadata = document.metadata.as_ref();
	json!({
		"id": id,
		"endpoint": format!("{} {}", document.endpoint.v2_method, document.endpoint.v2_path),
		"total_mappings": document.field_mappings.len(),
		"approved_mappings": document.approved_count(),
		"confidence_score": metadata.map_or(0.0, |m| m.confidence_score),
		"generated_at": metadata.and_then(|m| m.generated_at.clone()),
		"v1_calls_count": document.v1_calls.len(),
		"has_ambiguous": document.has_ambiguous_mappings(),
	})
}

// Path capture percent-decodes, so an id can arrive containing
// separators; those must never reach the filesystem layer.
fn valid_id(id: &str) -> bool {
	!id.is_empty() && !id.contains(['/', '\\']) && !id.contains("..")
}

fn in_registry(state: &AppState, id: &str) -> bool {
	state
		.registry
		.get_arc()
		.is_some_and(|snapshot| snapshot.documents.contains_key(id))
}

fn document_json(document: &MappingDocument) -> Value {
	serde_json::to_value(document).unwrap_or(Value::Null)
}

fn success_data(data: Value) -> Json<Value> {
	Json(json!({ "success": true, "data": data }))
}

fn success_message(message: impl Into<String>) -> Json<Value> {
	Json(json!({ "success": true, "message": message.into() }))
}

fn failure(error: impl Into<String>) -> Json<Value> {
	Json(json!({ "success": false, "error": error.into() }))
}
