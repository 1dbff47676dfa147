use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
	pub status: String,
	pub version: String,
}

/// Health check endpoint
#[cfg_attr(feature = "openapi", utoipa::path(
	get,
	path = "/health",
	responses((status = 200, description = "Service healthy", body = HealthResponse)),
	tag = "health"
))]
pub async fn health() -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "healthy".to_string(),
		version: env!("CARGO_PKG_VERSION").to_string(),
	})
}

/// Readiness response
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReadinessResponse {
	pub status: String,
	pub sources: BTreeMap<String, bool>,
}

/// GET /ready - Readiness probe over every registered adapter
#[cfg_attr(feature = "openapi", utoipa::path(
	get,
	path = "/ready",
	responses(
		(status = 200, description = "All sources healthy", body = ReadinessResponse),
		(status = 503, description = "At least one source unhealthy", body = ReadinessResponse)
	),
	tag = "health"
))]
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
	let sources: BTreeMap<String, bool> = state
		.aggregator
		.health_check_all()
		.await
		.into_iter()
		.map(|(key, healthy)| (key.to_string(), healthy))
		.collect();
	let healthy = sources.values().all(|v| *v);

	let status = if healthy { "ready" } else { "degraded" };
	let code = if healthy {
		StatusCode::OK
	} else {
		StatusCode::SERVICE_UNAVAILABLE
	};
	(
		code,
		Json(ReadinessResponse {
			status: status.to_string(),
			sources,
		}),
	)
}
