//! Fan-out aggregation across source adapters
//!
//! Every requested source gets its own task. Each task is bounded by the
//! per-source timeout, and the whole fan-in by the global deadline. Whatever
//! happens inside a task (error, timeout, panic) ends up as a `Failure` in
//! that source's slot, so a response always has exactly one entry per
//! requested source.

use async_trait::async_trait;
use futures::future::join_all;
use medlens_adapters::AdapterRegistry;
use medlens_types::{AggregatedResponse, FetchOptions, Query, SourceKey, SourceResult};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{timeout, timeout_at, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_GLOBAL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PER_SOURCE_TIMEOUT_MS: u64 = 20_000;

/// Timeouts and fetch options applied to every aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConfig {
	pub global_timeout_ms: u64,
	pub per_source_timeout_ms: u64,
	pub fetch_options: FetchOptions,
}

impl Default for AggregationConfig {
	fn default() -> Self {
		Self {
			global_timeout_ms: DEFAULT_GLOBAL_TIMEOUT_MS,
			per_source_timeout_ms: DEFAULT_PER_SOURCE_TIMEOUT_MS,
			fetch_options: FetchOptions::default(),
		}
	}
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AggregatorTrait: Send + Sync {
	/// Query the requested sources; an empty slice means every source
	async fn aggregate(&self, query: &Query, requested: &[SourceKey]) -> AggregatedResponse;

	/// Sources with a registered adapter
	fn available_sources(&self) -> Vec<SourceKey>;

	async fn health_check_all(&self) -> BTreeMap<SourceKey, bool>;

	fn get_stats(&self) -> AggregationStats;
}

/// Service aggregating records from every registered source
pub struct AggregatorService {
	adapter_registry: Arc<AdapterRegistry>,
	config: AggregationConfig,
	total_aggregations: AtomicU64,
}

impl AggregatorService {
	pub fn new(adapter_registry: Arc<AdapterRegistry>, config: AggregationConfig) -> Self {
		Self {
			adapter_registry,
			config,
			total_aggregations: AtomicU64::new(0),
		}
	}

	pub fn config(&self) -> &AggregationConfig {
		&self.config
	}

	fn spawn_fetch(&self, key: SourceKey, query: &Query) -> JoinHandle<SourceResult> {
		let adapter = self.adapter_registry.get(key);
		let query = query.clone();
		let options = self.config.fetch_options.clone();
		let per_source_ms = self.config.per_source_timeout_ms;

		tokio::spawn(async move {
			let Some(adapter) = adapter else {
				warn!("No adapter registered for source {}", key);
				return SourceResult::failure(format!("no adapter registered for {}", key));
			};

			debug!("Starting fetch from {} for {}", key, query);
			let started = Instant::now();
			match timeout(
				Duration::from_millis(per_source_ms),
				adapter.fetch(&query, &options),
			)
			.await
			{
				Ok(Ok(records)) => {
					debug!(
						"{} returned {} records in {}ms",
						key,
						records.len(),
						started.elapsed().as_millis()
					);
					SourceResult::Success(records)
				},
				Ok(Err(e)) => {
					warn!("Source {} failed: {}", key, e);
					SourceResult::failure(e.to_string())
				},
				Err(_) => {
					warn!("Source {} timed out after {}ms", key, per_source_ms);
					SourceResult::failure(format!("timed out after {}ms", per_source_ms))
				},
			}
		})
	}
}

/// Requested keys in first-seen order, or every source when none are given
fn resolve_requested(requested: &[SourceKey]) -> Vec<SourceKey> {
	if requested.is_empty() {
		return SourceKey::ALL.to_vec();
	}
	let mut keys = Vec::with_capacity(requested.len());
	for key in requested {
		if !keys.contains(key) {
			keys.push(*key);
		}
	}
	keys
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(|s| s.to_string())
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "unknown panic".to_string())
}

fn join_failure(key: SourceKey, error: JoinError) -> SourceResult {
	if error.is_panic() {
		let payload = error.into_panic();
		let message = panic_message(&*payload);
		warn!("Source {} panicked: {}", key, message);
		SourceResult::failure(format!("adapter panicked: {}", message))
	} else {
		SourceResult::failure("adapter task was cancelled")
	}
}

#[async_trait]
impl AggregatorTrait for AggregatorService {
	async fn aggregate(&self, query: &Query, requested: &[SourceKey]) -> AggregatedResponse {
		let aggregation_id = Uuid::new_v4();
		let keys = resolve_requested(requested);
		self.total_aggregations.fetch_add(1, Ordering::Relaxed);
		info!(
			"[{}] Aggregating {} from {} sources",
			aggregation_id,
			query,
			keys.len()
		);

		let global_ms = self.config.global_timeout_ms;
		let deadline = Instant::now() + Duration::from_millis(global_ms);
		let tasks = keys.into_iter().map(|key| {
			let mut handle = self.spawn_fetch(key, query);
			async move {
				let result = match timeout_at(deadline, &mut handle).await {
					Ok(Ok(result)) => result,
					Ok(Err(join_error)) => join_failure(key, join_error),
					Err(_) => {
						handle.abort();
						warn!(
							"[{}] Global deadline reached before {} finished",
							aggregation_id, key
						);
						SourceResult::failure(format!("timed out after {}ms", global_ms))
					},
				};
				(key, result)
			}
		});

		let response = AggregatedResponse::from_entries(join_all(tasks).await);
		info!(
			"[{}] Aggregation completed: {} succeeded, {} failed",
			aggregation_id,
			response.success_count(),
			response.failure_count()
		);
		response
	}

	fn available_sources(&self) -> Vec<SourceKey> {
		self.adapter_registry.keys().collect()
	}

	async fn health_check_all(&self) -> BTreeMap<SourceKey, bool> {
		let checks = self.adapter_registry.adapters().map(|adapter| async move {
			let healthy = match adapter.health_check().await {
				Ok(healthy) => healthy,
				Err(e) => {
					debug!("Health check for {} failed: {}", adapter.source(), e);
					false
				},
			};
			(adapter.source(), healthy)
		});
		join_all(checks).await.into_iter().collect()
	}

	fn get_stats(&self) -> AggregationStats {
		AggregationStats {
			registered_sources: self.adapter_registry.len(),
			global_timeout_ms: self.config.global_timeout_ms,
			per_source_timeout_ms: self.config.per_source_timeout_ms,
			total_aggregations: self.total_aggregations.load(Ordering::Relaxed),
		}
	}
}

/// Aggregation service statistics
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationStats {
	pub registered_sources: usize,
	pub global_timeout_ms: u64,
	pub per_source_timeout_ms: u64,
	pub total_aggregations: u64,
}

#[cfg(test)]
mod tests {
	use super::*;
	use medlens_types::{
		AdapterError, AdapterInfo, AdapterResult, FieldValue, Record, SourceAdapter,
	};
	use std::sync::atomic::AtomicUsize;

	#[derive(Debug, Clone, Copy)]
	enum Behavior {
		Records(usize),
		Fail,
		Hang,
		Panic,
	}

	#[derive(Debug)]
	struct StubAdapter {
		info: AdapterInfo,
		behavior: Behavior,
		calls: Arc<AtomicUsize>,
	}

	impl StubAdapter {
		fn new(source: SourceKey, behavior: Behavior) -> Self {
			Self {
				info: AdapterInfo::new(source, format!("stub {}", source), "http://stub"),
				behavior,
				calls: Arc::new(AtomicUsize::new(0)),
			}
		}
	}

	#[async_trait]
	impl SourceAdapter for StubAdapter {
		fn adapter_info(&self) -> &AdapterInfo {
			&self.info
		}

		async fn fetch(&self, query: &Query, _options: &FetchOptions) -> AdapterResult<Vec<Record>> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			match self.behavior {
				Behavior::Records(n) => Ok((0..n)
					.map(|i| {
						Record::from([
							("query".to_string(), FieldValue::from(query.text())),
							("index".to_string(), FieldValue::Integer(i as i64)),
						])
					})
					.collect()),
				Behavior::Fail => Err(AdapterError::from_http_failure(503)),
				Behavior::Hang => {
					tokio::time::sleep(Duration::from_secs(3600)).await;
					Ok(vec![])
				},
				Behavior::Panic => panic!("stub adapter exploded"),
			}
		}

		async fn health_check(&self) -> AdapterResult<bool> {
			match self.behavior {
				Behavior::Fail => Err(AdapterError::from_http_failure(503)),
				_ => Ok(true),
			}
		}
	}

	fn service(behaviors: &[(SourceKey, Behavior)], config: AggregationConfig) -> AggregatorService {
		let mut registry = AdapterRegistry::new();
		for (source, behavior) in behaviors {
			registry
				.register(Arc::new(StubAdapter::new(*source, *behavior)))
				.unwrap();
		}
		AggregatorService::new(Arc::new(registry), config)
	}

	fn all_ok() -> Vec<(SourceKey, Behavior)> {
		SourceKey::ALL
			.iter()
			.map(|k| (*k, Behavior::Records(2)))
			.collect()
	}

	fn aspirin() -> Query {
		Query::drug("aspirin").unwrap()
	}

	#[tokio::test]
	async fn test_empty_request_queries_every_source() {
		let service = service(&all_ok(), AggregationConfig::default());
		let response = service.aggregate(&aspirin(), &[]).await;
		assert_eq!(response.keys().collect::<Vec<_>>(), SourceKey::ALL.to_vec());
		assert_eq!(response.success_count(), 6);
		assert_eq!(service.get_stats().total_aggregations, 1);
	}

	#[tokio::test]
	async fn test_subset_returns_only_requested_keys() {
		let service = service(&all_ok(), AggregationConfig::default());
		let requested = [SourceKey::News, SourceKey::LabelData, SourceKey::News];
		let response = service.aggregate(&aspirin(), &requested).await;
		assert_eq!(
			response.keys().collect::<Vec<_>>(),
			vec![SourceKey::LabelData, SourceKey::News]
		);
	}

	#[tokio::test]
	async fn test_failure_is_isolated() {
		let mut behaviors = all_ok();
		behaviors[2].1 = Behavior::Fail;
		let service = service(&behaviors, AggregationConfig::default());
		let response = service.aggregate(&aspirin(), &[]).await;

		assert_eq!(response.len(), 6);
		let failed = response.get(SourceKey::Filings).unwrap();
		assert!(failed.is_failure());
		assert!(failed.records().is_none());
		assert_eq!(response.records(SourceKey::Trials).len(), 2);
		assert_eq!(response.success_count(), 5);
	}

	#[tokio::test]
	async fn test_panic_becomes_failure() {
		let service = service(
			&[
				(SourceKey::Trials, Behavior::Panic),
				(SourceKey::News, Behavior::Records(1)),
			],
			AggregationConfig::default(),
		);
		let response = service
			.aggregate(&aspirin(), &[SourceKey::Trials, SourceKey::News])
			.await;
		let error = response.get(SourceKey::Trials).unwrap().error().unwrap();
		assert!(error.contains("stub adapter exploded"));
		assert!(response.get(SourceKey::News).unwrap().is_success());
	}

	#[tokio::test]
	async fn test_unregistered_source_is_failure() {
		let service = service(
			&[(SourceKey::News, Behavior::Records(1))],
			AggregationConfig::default(),
		);
		let response = service
			.aggregate(&aspirin(), &[SourceKey::News, SourceKey::Terminology])
			.await;
		assert_eq!(response.len(), 2);
		assert_eq!(
			response.get(SourceKey::Terminology).unwrap().error(),
			Some("no adapter registered for terminology")
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_per_source_timeout() {
		let config = AggregationConfig {
			global_timeout_ms: 10_000,
			per_source_timeout_ms: 50,
			..AggregationConfig::default()
		};
		let service = service(
			&[
				(SourceKey::Literature, Behavior::Hang),
				(SourceKey::LabelData, Behavior::Records(3)),
			],
			config,
		);
		let response = service
			.aggregate(&aspirin(), &[SourceKey::Literature, SourceKey::LabelData])
			.await;
		assert_eq!(
			response.get(SourceKey::Literature).unwrap().error(),
			Some("timed out after 50ms")
		);
		assert_eq!(response.records(SourceKey::LabelData).len(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_global_deadline_keeps_finished_sources() {
		let config = AggregationConfig {
			global_timeout_ms: 100,
			per_source_timeout_ms: 60_000,
			..AggregationConfig::default()
		};
		let service = service(
			&[
				(SourceKey::News, Behavior::Hang),
				(SourceKey::Trials, Behavior::Records(1)),
			],
			config,
		);
		let response = service.aggregate(&aspirin(), &[]).await;
		assert_eq!(response.len(), 6);
		assert_eq!(
			response.get(SourceKey::News).unwrap().error(),
			Some("timed out after 100ms")
		);
		assert!(response.get(SourceKey::Trials).unwrap().is_success());
	}

	#[tokio::test]
	async fn test_health_check_all() {
		let service = service(
			&[
				(SourceKey::News, Behavior::Fail),
				(SourceKey::Trials, Behavior::Records(1)),
			],
			AggregationConfig::default(),
		);
		let health = service.health_check_all().await;
		assert_eq!(health.get(&SourceKey::News), Some(&false));
		assert_eq!(health.get(&SourceKey::Trials), Some(&true));
		assert_eq!(service.available_sources(), vec![SourceKey::Trials, SourceKey::News]);
	}

	#[tokio::test]
	async fn test_mock_aggregator_through_trait_object() {
		let mut mock = MockAggregatorTrait::new();
		mock.expect_aggregate().times(1).returning(|_, requested| {
			AggregatedResponse::from_entries(
				requested
					.iter()
					.map(|k| (*k, SourceResult::failure("offline"))),
			)
		});
		let aggregator: Arc<dyn AggregatorTrait> = Arc::new(mock);
		let response = aggregator.aggregate(&aspirin(), &[SourceKey::News]).await;
		assert_eq!(response.failure_count(), 1);
	}
}
