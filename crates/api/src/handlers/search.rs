use axum::{extract::State, response::Json};
use medlens_types::{AggregatedResponse, Query, SourceKey};
use serde::Deserialize;
use tracing::{info, warn};

use crate::handlers::common::{ApiError, ErrorResponse};
use crate::state::AppState;

/// Search request body
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchRequest {
	#[serde(default)]
	pub query: String,
	/// "drug" (default) or "disease"
	#[serde(rename = "type", default)]
	pub kind: Option<String>,
	/// Source names to query; omitted or empty means every source, unknown names are skipped
	#[serde(default)]
	pub sources: Vec<String>,
}

/// Fan a query out to the requested sources
#[cfg_attr(feature = "openapi", utoipa::path(
	post,
	path = "/api/search",
	request_body = SearchRequest,
	responses(
		(status = 200, description = "One entry per requested source: records or {\"error\": ...}"),
		(status = 400, description = "Invalid request", body = ErrorResponse)
	),
	tag = "search"
))]
pub async fn post_search(
	State(state): State<AppState>,
	Json(request): Json<SearchRequest>,
) -> Result<Json<AggregatedResponse>, ApiError> {
	let query = Query::parse(&request.query, request.kind.as_deref())
		.map_err(|e| ErrorResponse::validation(e.to_string()))?;
	let selection = SourceKey::select(&request.sources);
	for name in &selection.unknown {
		warn!("Ignoring unknown source: {}", name);
	}
	// Every requested name was unknown: nothing to query
	if selection.keys.is_empty() {
		return Ok(Json(AggregatedResponse::default()));
	}

	info!("Search for {} across {} source(s)", query, selection.keys.len());

	let response = state.aggregator.aggregate(&query, &selection.keys).await;
	Ok(Json(response))
}
