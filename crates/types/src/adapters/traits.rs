//! Core adapter traits for source implementations

use super::{AdapterInfo, AdapterResult, FetchOptions};
use crate::{Query, Record, SourceKey};
use async_trait::async_trait;
use std::fmt::Debug;

/// Uniform contract every source adapter implements.
///
/// `fetch` either yields normalized records or an error; it never returns
/// partial records alongside a failure. The aggregator turns the error into
/// a failure entry for this adapter's source.
#[async_trait]
pub trait SourceAdapter: Send + Sync + Debug {
	/// Get adapter metadata
	fn adapter_info(&self) -> &AdapterInfo;

	/// Source this adapter serves
	fn source(&self) -> SourceKey {
		self.adapter_info().source
	}

	fn name(&self) -> &str {
		&self.adapter_info().name
	}

	fn version(&self) -> &str {
		&self.adapter_info().version
	}

	/// Fetch normalized records for a query
	async fn fetch(&self, query: &Query, options: &FetchOptions) -> AdapterResult<Vec<Record>>;

	/// Lightweight reachability check
	///
	/// Default implementation reports healthy. Adapters with a cheap probe
	/// endpoint override this.
	async fn health_check(&self) -> AdapterResult<bool> {
		Ok(true)
	}
}
