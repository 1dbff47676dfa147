//! MedLens Aggregator Library
//!
//! Concurrent aggregation of drug and disease information from six upstream
//! sources (drug labels, clinical trials, SEC filings, PubMed, news and
//! SNOMED-CT terminology), with LLM summarization of the combined result.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

// Core domain types
pub use medlens_types::{
	chrono, serde_json, AdapterError, AdapterInfo, AdapterResult, AggregatedResponse,
	FetchOptions, FieldValue, Query, QueryKind, Record, SecretString, SourceAdapter, SourceKey,
	SourceResult, SourceRuntimeConfig, Summary,
};

// Service layer
pub use medlens_service::{
	AggregationConfig, AggregatorService, AggregatorTrait, LlmConfig, LlmSummarizer, Summarizer,
	SummarizerError,
};

// API layer
pub use medlens_api::{create_router, AppState};

// Adapters
pub use medlens_adapters::{AdapterRegistry, TermCache};

// Config
pub use medlens_config::{
	load_config, log_service_info, log_startup_complete, ConfigurableValue, Settings,
};

pub mod models {
	pub use medlens_types::*;
}

pub mod config {
	pub use medlens_config::*;
}

pub mod adapters {
	pub use medlens_adapters::*;
}

pub mod api {
	pub use medlens_api::*;
}

pub mod service {
	pub use medlens_service::*;
}

pub mod mocks;

// Re-export external dependencies for demos
pub use async_trait;
pub use reqwest;

/// Fan-out settings for the aggregator service
pub fn aggregation_config(settings: &Settings) -> AggregationConfig {
	AggregationConfig {
		global_timeout_ms: settings.aggregation.global_timeout_ms,
		per_source_timeout_ms: settings.aggregation.per_source_timeout_ms,
		fetch_options: FetchOptions {
			max_results: settings.aggregation.default_max_results,
			days_back: settings.aggregation.default_days_back,
		},
	}
}

/// Chat completion settings with the API key resolved
pub fn llm_config(settings: &Settings) -> LlmConfig {
	let llm = &settings.llm;
	let api_key = llm.api_key.resolve_optional_secret();
	if api_key.is_none() {
		warn!(
			"LLM API key not found ({}); summaries will report an error",
			llm.api_key.description()
		);
	}
	LlmConfig {
		base_url: llm.base_url.clone(),
		model: llm.model.clone(),
		max_tokens: llm.max_tokens,
		temperature: llm.temperature,
		max_retries: llm.max_retries,
		timeout_ms: llm.timeout_ms,
		api_key,
	}
}

/// Shared terminology cache, if enabled
pub fn term_cache(settings: &Settings) -> Option<Arc<TermCache>> {
	let cache = &settings.terminology_cache;
	cache.enabled.then(|| {
		Arc::new(TermCache::new(
			cache.capacity,
			cache.ttl_secs.map(Duration::from_secs),
		))
	})
}

/// Summarizer used when `llm.enabled` is false
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSummarizer;

#[async_trait::async_trait]
impl Summarizer for DisabledSummarizer {
	async fn summarize(&self, _data: &AggregatedResponse, _query: &Query) -> Summary {
		Summary::error("Summarization is disabled")
	}
}

/// Builder pattern for configuring the aggregator
#[derive(Default)]
pub struct AggregatorBuilder {
	settings: Option<Settings>,
	adapter_registry: Option<AdapterRegistry>,
	adapters: Vec<Arc<dyn SourceAdapter>>,
	summarizer: Option<Arc<dyn Summarizer>>,
}

impl AggregatorBuilder {
	/// Create a new builder; settings are loaded lazily by `start_server`
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a builder from the config file and environment, falling back to defaults
	pub fn from_config() -> Self {
		let settings = match load_config() {
			Ok(settings) => settings,
			Err(e) => {
				warn!("Using default settings: {}", e);
				Settings::default()
			},
		};
		Self::new().with_settings(settings)
	}

	/// Set custom settings
	pub fn with_settings(mut self, settings: Settings) -> Self {
		self.settings = Some(settings);
		self
	}

	/// Get the current settings
	pub fn settings(&self) -> Option<&Settings> {
		self.settings.as_ref()
	}

	/// Use a prebuilt registry instead of building adapters from settings
	pub fn with_adapter_registry(mut self, registry: AdapterRegistry) -> Self {
		self.adapter_registry = Some(registry);
		self
	}

	/// Register an extra adapter
	///
	/// When only individual adapters are supplied, the registry contains
	/// exactly those adapters.
	pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
		self.adapters.push(adapter);
		self
	}

	pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
		self.summarizer = Some(summarizer);
		self
	}

	/// Initialize tracing with configuration-based settings
	fn init_tracing_from_settings(
		&self,
		settings: &Settings,
	) -> Result<(), Box<dyn std::error::Error>> {
		use medlens_config::LogFormat;

		// RUST_LOG wins over the configured level
		let log_level = &settings.logging.level;
		let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
			.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

		let structured = settings.logging.structured;
		let initialized = match settings.logging.format {
			LogFormat::Json => tracing_subscriber::fmt()
				.json()
				.with_env_filter(env_filter)
				.with_target(structured)
				.with_thread_ids(structured)
				.try_init(),
			LogFormat::Pretty => tracing_subscriber::fmt()
				.pretty()
				.with_env_filter(env_filter)
				.with_target(structured)
				.with_thread_ids(structured)
				.try_init(),
			LogFormat::Compact => tracing_subscriber::fmt()
				.compact()
				.with_env_filter(env_filter)
				.with_target(structured)
				.with_thread_ids(structured)
				.try_init(),
		};
		initialized.map_err(|e| format!("Failed to initialize tracing: {}", e))?;

		info!(
			"Logging configuration applied: level={}, format={:?}, structured={}",
			settings.logging.level, settings.logging.format, settings.logging.structured
		);

		Ok(())
	}

	fn build_registry(
		&mut self,
		settings: &Settings,
	) -> Result<AdapterRegistry, Box<dyn std::error::Error>> {
		let mut registry = match self.adapter_registry.take() {
			Some(registry) => registry,
			None if !self.adapters.is_empty() => AdapterRegistry::new(),
			None => AdapterRegistry::from_configs(settings.runtime_configs(), term_cache(settings))?,
		};
		for adapter in self.adapters.drain(..) {
			registry.register(adapter)?;
		}
		Ok(registry)
	}

	/// Build services and return the configured router with state
	pub async fn start(mut self) -> Result<(axum::Router, AppState), Box<dyn std::error::Error>> {
		let settings = self.settings.take().unwrap_or_default();
		let registry = self.build_registry(&settings)?;
		if registry.is_empty() {
			return Err("no source adapters registered".into());
		}
		info!("Successfully initialized with {} source(s)", registry.len());

		let aggregator =
			AggregatorService::new(Arc::new(registry), aggregation_config(&settings));

		let summarizer: Arc<dyn Summarizer> = match self.summarizer.take() {
			Some(summarizer) => summarizer,
			None if settings.llm.enabled => {
				Arc::new(LlmSummarizer::from_config(llm_config(&settings))?)
			},
			None => {
				info!("LLM summarization disabled");
				Arc::new(DisabledSummarizer)
			},
		};

		let app_state = AppState {
			aggregator: Arc::new(aggregator) as Arc<dyn AggregatorTrait>,
			summarizer,
		};

		let router = create_router().with_state(app_state.clone());

		Ok((router, app_state))
	}

	/// Start the complete server: `.env`, configuration, tracing, bind and serve
	pub async fn start_server(mut self) -> Result<(), Box<dyn std::error::Error>> {
		dotenvy::dotenv().ok();

		let (settings, source) = match self.settings.take() {
			Some(settings) => (settings, "provided settings"),
			None => match load_config() {
				Ok(settings) => (settings, "config file and environment"),
				Err(e) => {
					eprintln!("Falling back to default settings: {}", e);
					(Settings::default(), "defaults")
				},
			},
		};

		self.init_tracing_from_settings(&settings)?;
		log_service_info();
		info!("Using configuration from {}", source);
		medlens_config::log_source_summary(&settings);

		let bind_addr = settings.bind_address();
		let addr: SocketAddr = bind_addr
			.parse()
			.map_err(|e| format!("Invalid bind address '{}': {}", bind_addr, e))?;

		let rate_cfg = settings.environment.rate_limiting.clone();
		self.settings = Some(settings);
		let (app, _) = self.start().await?;

		let listener = tokio::net::TcpListener::bind(addr).await?;

		log_startup_complete(&bind_addr);
		info!("API endpoints available:");
		info!("  GET  /health");
		info!("  GET  /ready");
		info!("  GET  /api/sources");
		info!("  POST /api/search");
		info!("  POST /api/summarize");
		if cfg!(feature = "openapi") {
			info!("  GET  /swagger-ui");
			info!("  GET  /api-docs/openapi.json");
		}

		// Global rate limit applies at the make_service level
		if rate_cfg.enabled {
			use tower::limit::RateLimitLayer;
			use tower::ServiceBuilder;
			let make_svc = ServiceBuilder::new()
				.layer(RateLimitLayer::new(
					rate_cfg.requests_per_minute as u64,
					Duration::from_secs(60),
				))
				.service(app.into_make_service());
			axum::serve(listener, make_svc).await?;
		} else {
			axum::serve(listener, app).await?;
		}

		medlens_config::log_service_shutdown();
		Ok(())
	}
}
