use std::collections::BTreeMap;

use axum::response::Json;
use medlens_types::SourceKey;

/// GET /api/sources - Source keys and their display labels
#[cfg_attr(feature = "openapi", utoipa::path(
	get,
	path = "/api/sources",
	responses((status = 200, description = "Source key to label")),
	tag = "sources"
))]
pub async fn get_sources() -> Json<BTreeMap<String, String>> {
	Json(
		SourceKey::ALL
			.iter()
			.map(|key| (key.to_string(), key.label().to_string()))
			.collect(),
	)
}
