//! MedLens source adapters
//!
//! One adapter per upstream data source, plus the shared HTTP plumbing,
//! tiered resolver and terminology cache they are built on.

pub mod cache;
pub mod client_cache;
pub mod filings;
pub mod http;
pub mod label_data;
pub mod literature;
pub mod news;
pub mod resolver;
pub mod terminology;
pub mod trials;

pub use cache::{CacheKey, CacheStats, ResolutionCache, TermCache};
pub use client_cache::{global_client_cache, ClientCache, ClientConfig};
pub use filings::FilingsAdapter;
pub use http::{with_retry, RateLimiter, RetryConfig};
pub use label_data::LabelDataAdapter;
pub use literature::LiteratureAdapter;
pub use news::{category_summaries, NewsAdapter, NewsCategory};
pub use resolver::{Resolution, ResolverStrategy, TieredResolver};
pub use terminology::TerminologyAdapter;
pub use trials::TrialsAdapter;

pub use medlens_types::{
	AdapterError, AdapterFactoryError, AdapterFactoryResult, AdapterResult, SourceAdapter,
	SourceKey, SourceRuntimeConfig,
};

use medlens_types::SecretString;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Runtime config for `source` using the conventional environment variables
/// for its credentials
pub fn runtime_config_from_env(source: SourceKey) -> SourceRuntimeConfig {
	let config = SourceRuntimeConfig::new(source);
	let with_key = |config: SourceRuntimeConfig, var: &str| match SecretString::from_env(var) {
		Some(key) => config.with_api_key(key),
		None => config,
	};
	match source {
		SourceKey::LabelData => with_key(config, "FDA_API_KEY"),
		SourceKey::Trials => config,
		SourceKey::Filings => match std::env::var("SEC_USER_AGENT") {
			Ok(agent) if !agent.trim().is_empty() => config.with_contact(agent),
			_ => config,
		},
		SourceKey::Literature => {
			let config = with_key(config, "NCBI_API_KEY");
			match std::env::var("NCBI_EMAIL") {
				Ok(email) if !email.trim().is_empty() => config.with_contact(email),
				_ => config,
			}
		},
		SourceKey::News => with_key(config, "SERPER_API_KEY"),
		SourceKey::Terminology => {
			let config = with_key(config, "SNOMED_API_KEY");
			match SecretString::from_env("UMLS_API_KEY") {
				Some(key) => config.with_secondary_key(key),
				None => config,
			}
		},
	}
}

/// Build the concrete adapter for one source
pub fn build_adapter(
	config: SourceRuntimeConfig,
	term_cache: Option<Arc<TermCache>>,
) -> AdapterFactoryResult<Arc<dyn SourceAdapter>> {
	let source = config.source;
	let built: AdapterResult<Arc<dyn SourceAdapter>> = match source {
		SourceKey::LabelData => LabelDataAdapter::new(config).map(|a| Arc::new(a) as _),
		SourceKey::Trials => TrialsAdapter::new(config).map(|a| Arc::new(a) as _),
		SourceKey::Filings => FilingsAdapter::new(config).map(|a| Arc::new(a) as _),
		SourceKey::Literature => LiteratureAdapter::new(config).map(|a| Arc::new(a) as _),
		SourceKey::News => NewsAdapter::new(config).map(|a| Arc::new(a) as _),
		SourceKey::Terminology => {
			TerminologyAdapter::new(config, term_cache).map(|a| Arc::new(a) as _)
		},
	};
	built.map_err(|e| AdapterFactoryError::BuildFailed {
		source_name: source.to_string(),
		reason: e.to_string(),
	})
}

/// The set of adapters available to the aggregator, at most one per source
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
	adapters: BTreeMap<SourceKey, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// All six production adapters configured from the environment
	pub fn with_defaults(term_cache: Option<Arc<TermCache>>) -> AdapterFactoryResult<Self> {
		Self::from_configs(
			SourceKey::ALL.iter().map(|source| runtime_config_from_env(*source)),
			term_cache,
		)
	}

	pub fn from_configs(
		configs: impl IntoIterator<Item = SourceRuntimeConfig>,
		term_cache: Option<Arc<TermCache>>,
	) -> AdapterFactoryResult<Self> {
		let mut registry = Self::new();
		for config in configs {
			registry.register(build_adapter(config, term_cache.clone())?)?;
		}
		info!(
			"Registered {} source adapters: {}",
			registry.len(),
			registry
				.keys()
				.map(|k| k.as_str())
				.collect::<Vec<_>>()
				.join(", ")
		);
		Ok(registry)
	}

	pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> AdapterFactoryResult<()> {
		let source = adapter.source();
		if self.adapters.contains_key(&source) {
			return Err(AdapterFactoryError::DuplicateSource {
				source_name: source.to_string(),
			});
		}
		self.adapters.insert(source, adapter);
		Ok(())
	}

	/// Builder-style [`register`](Self::register)
	pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> AdapterFactoryResult<Self> {
		self.register(adapter)?;
		Ok(self)
	}

	pub fn get(&self, source: SourceKey) -> Option<Arc<dyn SourceAdapter>> {
		self.adapters.get(&source).cloned()
	}

	pub fn contains(&self, source: SourceKey) -> bool {
		self.adapters.contains_key(&source)
	}

	pub fn keys(&self) -> impl Iterator<Item = SourceKey> + '_ {
		self.adapters.keys().copied()
	}

	pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn SourceAdapter>> {
		self.adapters.values()
	}

	pub fn len(&self) -> usize {
		self.adapters.len()
	}

	pub fn is_empty(&self) -> bool {
		self.adapters.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_cover_every_source() {
		let registry = AdapterRegistry::with_defaults(None).unwrap();
		assert_eq!(registry.len(), 6);
		assert_eq!(registry.keys().collect::<Vec<_>>(), SourceKey::ALL.to_vec());
		assert_eq!(
			registry.get(SourceKey::Filings).unwrap().name(),
			"SEC EDGAR"
		);
	}

	#[test]
	fn test_duplicate_source_rejected() {
		let adapter = build_adapter(SourceRuntimeConfig::new(SourceKey::Trials), None).unwrap();
		let err = AdapterRegistry::new()
			.with_adapter(Arc::clone(&adapter))
			.unwrap()
			.with_adapter(adapter)
			.unwrap_err();
		assert!(matches!(err, AdapterFactoryError::DuplicateSource { .. }));
	}

	#[test]
	fn test_base_url_override_reaches_adapter() {
		let adapter = build_adapter(
			SourceRuntimeConfig::new(SourceKey::LabelData).with_base_url("http://localhost:9999/"),
			None,
		)
		.unwrap();
		assert_eq!(adapter.adapter_info().base_url, "http://localhost:9999");
	}
}
