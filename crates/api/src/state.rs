use std::sync::Arc;

use medlens_service::{AggregatorTrait, Summarizer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
	pub aggregator: Arc<dyn AggregatorTrait>,
	pub summarizer: Arc<dyn Summarizer>,
}
