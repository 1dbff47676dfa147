use axum::{extract::State, response::Json};
use medlens_types::{AggregatedResponse, Query, Summary};
use serde::Deserialize;
use tracing::info;

use crate::handlers::common::{ApiError, ErrorResponse};
use crate::state::AppState;

/// Summarize request body: a previous search response plus its query
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizeRequest {
	pub data: Option<AggregatedResponse>,
	pub query: Option<String>,
	#[serde(rename = "type", default)]
	pub kind: Option<String>,
}

/// Summarize aggregated results with the configured LLM
///
/// LLM failures are reported inside the body as `{"error": ...}` with status 200.
#[cfg_attr(feature = "openapi", utoipa::path(
	post,
	path = "/api/summarize",
	responses(
		(status = 200, description = "Sectioned summary or {\"error\": ...}"),
		(status = 400, description = "Missing data or query", body = ErrorResponse)
	),
	tag = "search"
))]
pub async fn post_summarize(
	State(state): State<AppState>,
	Json(request): Json<SummarizeRequest>,
) -> Result<Json<Summary>, ApiError> {
	let (Some(data), Some(text)) = (request.data, request.query) else {
		return Err(ErrorResponse::validation("Both data and query parameters are required"));
	};
	let query = Query::parse(&text, request.kind.as_deref())
		.map_err(|e| ErrorResponse::validation(e.to_string()))?;

	info!("Summarizing {} source result(s) for {}", data.len(), query);

	Ok(Json(state.summarizer.summarize(&data, &query).await))
}
