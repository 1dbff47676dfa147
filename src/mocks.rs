//! Mock adapters for demos and testing
//!
//! Scriptable stand-ins for the six source adapters. Each mock counts its
//! calls so tests can assert whether the aggregator reached it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use medlens_types::{
	AdapterError, AdapterInfo, AdapterResult, AggregatedResponse, FetchOptions, FieldValue, Query,
	Record, SourceAdapter, SourceKey, Summary,
};
use medlens_service::Summarizer;

use crate::AdapterRegistry;

/// What a [`MockSourceAdapter`] does when fetched
#[derive(Debug, Clone)]
pub enum MockBehavior {
	/// Return these records
	Records(Vec<Record>),
	/// Fail with this message, reported verbatim
	Fail(String),
	/// Sleep, then return the records
	Delayed(Duration, Vec<Record>),
	/// Panic inside the fetch
	Panic(String),
}

#[derive(Debug)]
pub struct MockSourceAdapter {
	info: AdapterInfo,
	behavior: MockBehavior,
	calls: Arc<AtomicUsize>,
	healthy: bool,
}

impl MockSourceAdapter {
	pub fn new(source: SourceKey, behavior: MockBehavior) -> Self {
		Self {
			info: AdapterInfo::new(source, format!("Mock {}", source.label()), "mock://local")
				.with_description("Scripted adapter for demos and tests"),
			behavior,
			calls: Arc::new(AtomicUsize::new(0)),
			healthy: true,
		}
	}

	/// One sample record tagged with the source name
	pub fn succeeding(source: SourceKey) -> Self {
		Self::new(source, MockBehavior::Records(vec![sample_record(source)]))
	}

	pub fn failing(source: SourceKey, message: impl Into<String>) -> Self {
		Self::new(source, MockBehavior::Fail(message.into()))
	}

	pub fn delayed(source: SourceKey, delay: Duration) -> Self {
		Self::new(
			source,
			MockBehavior::Delayed(delay, vec![sample_record(source)]),
		)
	}

	pub fn panicking(source: SourceKey) -> Self {
		Self::new(
			source,
			MockBehavior::Panic(format!("{} adapter exploded", source)),
		)
	}

	pub fn unhealthy(mut self) -> Self {
		self.healthy = false;
		self
	}

	/// Shared handle to the call counter; stays valid after the adapter is moved into a registry
	pub fn call_tracker(&self) -> Arc<AtomicUsize> {
		Arc::clone(&self.calls)
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl SourceAdapter for MockSourceAdapter {
	fn adapter_info(&self) -> &AdapterInfo {
		&self.info
	}

	async fn fetch(&self, _query: &Query, _options: &FetchOptions) -> AdapterResult<Vec<Record>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		match &self.behavior {
			MockBehavior::Records(records) => Ok(records.clone()),
			MockBehavior::Fail(message) => Err(AdapterError::Upstream(message.clone())),
			MockBehavior::Delayed(delay, records) => {
				tokio::time::sleep(*delay).await;
				Ok(records.clone())
			},
			MockBehavior::Panic(message) => panic!("{}", message),
		}
	}

	async fn health_check(&self) -> AdapterResult<bool> {
		Ok(self.healthy)
	}
}

/// Minimal record carrying the source key and label
pub fn sample_record(source: SourceKey) -> Record {
	let mut record = Record::new();
	record.insert("source".to_string(), FieldValue::from(source.as_str()));
	record.insert("title".to_string(), FieldValue::from(source.label()));
	record
}

/// Registry with a succeeding mock for every source
pub fn mock_registry() -> AdapterRegistry {
	let mut registry = AdapterRegistry::new();
	for source in SourceKey::ALL {
		// keys are distinct, registration cannot collide
		let _ = registry.register(Arc::new(MockSourceAdapter::succeeding(source)));
	}
	registry
}

/// Summarizer that echoes which sources succeeded
#[derive(Debug, Default, Clone, Copy)]
pub struct MockSummarizer;

#[async_trait]
impl Summarizer for MockSummarizer {
	async fn summarize(&self, data: &AggregatedResponse, query: &Query) -> Summary {
		let mut sections = BTreeMap::new();
		sections.insert(
			"overview".to_string(),
			format!(
				"{}: {} of {} sources returned data",
				query.text(),
				data.success_count(),
				data.len()
			),
		);
		Summary::Sections(sections)
	}
}
