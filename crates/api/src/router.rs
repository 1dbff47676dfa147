use axum::{
	routing::{get, post},
	Router,
};
use tower::ServiceBuilder;
use tower_http::{
	compression::CompressionLayer,
	cors::CorsLayer,
	limit::RequestBodyLimitLayer,
	request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
	trace::TraceLayer,
};
use tracing::Level;

use crate::handlers::{get_sources, health, post_search, post_summarize, ready};
use crate::security::add_security_headers;
use crate::state::AppState;
#[cfg(feature = "openapi")]
use crate::openapi::ApiDoc;
#[cfg(feature = "openapi")]
use utoipa::OpenApi;
#[cfg(feature = "openapi")]
use utoipa_swagger_ui::SwaggerUi;

pub fn create_router() -> Router<AppState> {
	let cors = CorsLayer::permissive();
	let body_limit = RequestBodyLimitLayer::new(1024 * 1024);
	let trace = TraceLayer::new_for_http()
		.make_span_with(|req: &axum::http::Request<_>| {
			let req_id = req
				.headers()
				.get("x-request-id")
				.and_then(|v| v.to_str().ok())
				.unwrap_or("-");
			tracing::info_span!(
				"http_request",
				method = %req.method(),
				uri = %req.uri(),
				req_id
			)
		})
		.on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
		.on_response(
			tower_http::trace::DefaultOnResponse::new()
				.level(Level::INFO)
				.latency_unit(tower_http::LatencyUnit::Millis),
		);
	let req_id = ServiceBuilder::new()
		.layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
		.layer(PropagateRequestIdLayer::x_request_id());

	let base_router = Router::new()
		.route("/health", get(health))
		.route("/health/", get(health))
		.route("/ready", get(ready))
		.route("/api/sources", get(get_sources))
		.route("/api/sources/", get(get_sources))
		.route("/api/search", post(post_search))
		.route("/api/search/", post(post_search))
		.route("/api/summarize", post(post_summarize))
		.route("/api/summarize/", post(post_summarize));

	#[cfg(feature = "openapi")]
	let router = base_router
		.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

	#[cfg(not(feature = "openapi"))]
	let router = base_router;

	let router = router
		.layer(cors)
		.layer(CompressionLayer::new())
		.layer(trace)
		.layer(req_id)
		.layer(body_limit);

	add_security_headers(router)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeMap;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	use async_trait::async_trait;
	use axum::body::{to_bytes, Body};
	use axum::http::{Request, StatusCode};
	use medlens_service::{AggregationStats, AggregatorTrait, Summarizer};
	use medlens_types::{AggregatedResponse, Query, SourceKey, SourceResult, Summary};
	use serde_json::{json, Value};
	use tower::ServiceExt;

	#[derive(Default)]
	struct EchoAggregator {
		calls: AtomicUsize,
	}

	#[async_trait]
	impl AggregatorTrait for EchoAggregator {
		async fn aggregate(&self, query: &Query, requested: &[SourceKey]) -> AggregatedResponse {
			self.calls.fetch_add(1, Ordering::SeqCst);
			AggregatedResponse::from_entries(requested.iter().map(|key| {
				(
					*key,
					SourceResult::failure(format!("{} not reachable for {}", key, query.text())),
				)
			}))
		}

		fn available_sources(&self) -> Vec<SourceKey> {
			SourceKey::ALL.to_vec()
		}

		async fn health_check_all(&self) -> BTreeMap<SourceKey, bool> {
			SourceKey::ALL.iter().map(|key| (*key, true)).collect()
		}

		fn get_stats(&self) -> AggregationStats {
			AggregationStats {
				registered_sources: 6,
				global_timeout_ms: 30_000,
				per_source_timeout_ms: 20_000,
				total_aggregations: self.calls.load(Ordering::SeqCst) as u64,
			}
		}
	}

	struct CannedSummarizer;

	#[async_trait]
	impl Summarizer for CannedSummarizer {
		async fn summarize(&self, data: &AggregatedResponse, query: &Query) -> Summary {
			let mut sections = BTreeMap::new();
			sections.insert(
				"summary".to_string(),
				format!("{} sources for {}", data.len(), query.text()),
			);
			Summary::Sections(sections)
		}
	}

	fn app() -> (Router, Arc<EchoAggregator>) {
		let aggregator = Arc::new(EchoAggregator::default());
		let state = AppState {
			aggregator: aggregator.clone(),
			summarizer: Arc::new(CannedSummarizer),
		};
		(create_router().with_state(state), aggregator)
	}

	async fn send(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
		let builder = Request::builder().method(method).uri(uri);
		let request = match body {
			Some(body) => builder
				.header("content-type", "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
			None => builder.body(Body::empty()).unwrap(),
		};
		let response = router.oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
		(status, value)
	}

	#[tokio::test]
	async fn test_health() {
		let (router, _) = app();
		let (status, body) = send(router, "GET", "/health", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "healthy");
		assert!(body["version"].is_string());
	}

	#[tokio::test]
	async fn test_sources_lists_six_labels() {
		let (router, _) = app();
		let (status, body) = send(router, "GET", "/api/sources", None).await;
		assert_eq!(status, StatusCode::OK);
		let map = body.as_object().unwrap();
		assert_eq!(map.len(), 6);
		assert_eq!(map["trials"], "Clinical Trials");
	}

	#[tokio::test]
	async fn test_search_defaults_to_every_source() {
		let (router, aggregator) = app();
		let (status, body) =
			send(router, "POST", "/api/search", Some(json!({"query": "aspirin"}))).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body.as_object().unwrap().len(), 6);
		assert_eq!(body["news"]["error"], "news not reachable for aspirin");
		assert_eq!(aggregator.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_search_validation_never_reaches_aggregator() {
		for body in [
			json!({"query": "   "}),
			json!({"query": "aspirin", "type": "device"}),
		] {
			let (router, aggregator) = app();
			let (status, response) = send(router, "POST", "/api/search", Some(body)).await;
			assert_eq!(status, StatusCode::BAD_REQUEST);
			assert_eq!(response["error"], "VALIDATION_ERROR");
			assert_eq!(aggregator.calls.load(Ordering::SeqCst), 0);
		}
	}

	#[tokio::test]
	async fn test_search_skips_unknown_sources() {
		let (router, aggregator) = app();
		let request = json!({"query": "  aspirin ", "sources": ["label_data", "weather"]});
		let (status, body) = send(router, "POST", "/api/search", Some(request)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body.as_object().unwrap().len(), 1);
		assert_eq!(body["label_data"]["error"], "label_data not reachable for   aspirin ");
		assert_eq!(aggregator.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_summarize_requires_data_and_query() {
		let (router, _) = app();
		let (status, body) =
			send(router, "POST", "/api/summarize", Some(json!({"query": "aspirin"}))).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["message"], "Both data and query parameters are required");
	}

	#[tokio::test]
	async fn test_summarize_returns_sections() {
		let (router, _) = app();
		let request = json!({
			"query": "aspirin",
			"type": "drug",
			"data": {"label_data": [{"brand_name": "Bayer"}], "trials": {"error": "rate limited"}}
		});
		let (status, body) = send(router, "POST", "/api/summarize", Some(request)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["summary"], "2 sources for aspirin");
	}

	#[tokio::test]
	async fn test_security_headers_present() {
		let (router, _) = app();
		let response = router
			.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.headers()["x-content-type-options"], "nosniff");
		assert!(response.headers().contains_key("x-request-id"));
	}
}
