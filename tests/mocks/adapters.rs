//! Registry fixtures built from scripted mock adapters

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use medlens_aggregator::mocks::MockSourceAdapter;
use medlens_aggregator::{
	AdapterRegistry, AggregationConfig, AggregatorService, SourceAdapter, SourceKey,
};

/// A registry of mocks plus a call counter per source
pub struct ScriptedSources {
	registry: AdapterRegistry,
	trackers: Vec<(SourceKey, Arc<AtomicUsize>)>,
}

#[allow(dead_code)]
impl ScriptedSources {
	pub fn new() -> Self {
		Self {
			registry: AdapterRegistry::new(),
			trackers: Vec::new(),
		}
	}

	/// Every source succeeds except those listed in `failing`
	pub fn all_succeeding_except(failing: &[SourceKey]) -> Self {
		SourceKey::ALL.iter().fold(Self::new(), |sources, key| {
			if failing.contains(key) {
				sources.with(MockSourceAdapter::failing(*key, format!("{} is down", key)))
			} else {
				sources.with(MockSourceAdapter::succeeding(*key))
			}
		})
	}

	pub fn with(mut self, adapter: MockSourceAdapter) -> Self {
		self.trackers.push((adapter.source(), adapter.call_tracker()));
		self.registry
			.register(Arc::new(adapter))
			.expect("each source registered once");
		self
	}

	pub fn calls(&self, source: SourceKey) -> usize {
		self.trackers
			.iter()
			.filter(|(key, _)| *key == source)
			.map(|(_, calls)| calls.load(Ordering::SeqCst))
			.sum()
	}

	pub fn total_calls(&self) -> usize {
		self.trackers
			.iter()
			.map(|(_, calls)| calls.load(Ordering::SeqCst))
			.sum()
	}

	/// Hand the registry over; call counters stay readable through `self`
	pub fn take_registry(&mut self) -> AdapterRegistry {
		std::mem::take(&mut self.registry)
	}

	pub fn aggregator(&mut self, global_ms: u64, per_source_ms: u64) -> AggregatorService {
		AggregatorService::new(
			Arc::new(self.take_registry()),
			AggregationConfig {
				global_timeout_ms: global_ms,
				per_source_timeout_ms: per_source_ms,
				..Default::default()
			},
		)
	}
}
