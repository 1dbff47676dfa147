//! Test server for integration tests

use medlens_aggregator::mocks::MockSummarizer;
use medlens_aggregator::{AggregatorBuilder, Settings};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::ScriptedSources;

/// Aggregator served on an ephemeral local port
pub struct TestServer {
	pub base_url: String,
	pub handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
	/// Serve the given mocks with the echoing mock summarizer
	pub async fn spawn_with(sources: &mut ScriptedSources) -> Result<Self, Box<dyn std::error::Error>> {
		let mut settings = Settings::default();
		settings.aggregation.global_timeout_ms = 2_000;
		settings.aggregation.per_source_timeout_ms = 1_000;

		let (app, _state) = AggregatorBuilder::new()
			.with_settings(settings)
			.with_adapter_registry(sources.take_registry())
			.with_summarizer(Arc::new(MockSummarizer))
			.start()
			.await?;

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
		let addr = listener.local_addr()?;
		let handle = tokio::spawn(async move {
			let _ = axum::serve(listener, app).await;
		});

		Ok(Self {
			base_url: format!("http://{}", addr),
			handle,
		})
	}

	pub fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	pub fn abort(&self) {
		self.handle.abort();
	}
}
