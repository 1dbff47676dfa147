use utoipa::OpenApi;

use crate::handlers::common::ErrorResponse;
use crate::handlers::health::{HealthResponse, ReadinessResponse};
use crate::handlers::search::SearchRequest;
use crate::handlers::{health, search, sources, summarize};

#[derive(OpenApi)]
#[openapi(
	paths(
		health::health,
		health::ready,
		sources::get_sources,
		search::post_search,
		summarize::post_summarize,
	),
	components(schemas(ErrorResponse, HealthResponse, ReadinessResponse, SearchRequest)),
	tags(
		(name = "search", description = "Aggregated search and summarization"),
		(name = "sources", description = "Available data sources"),
		(name = "health", description = "Health and readiness endpoints")
	)
)]
pub struct ApiDoc;
