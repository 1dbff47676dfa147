//! Source adapter domain model

pub mod errors;
pub mod traits;

use crate::{SecretString, SourceKey};
use serde::Serialize;

pub use errors::{AdapterError, AdapterFactoryError};
pub use traits::SourceAdapter;

/// Result types for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;
pub type AdapterFactoryResult<T> = Result<T, AdapterFactoryError>;

/// Descriptive metadata for an adapter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterInfo {
	/// Source served by the adapter
	pub source: SourceKey,

	/// Human-readable name
	pub name: String,

	pub description: Option<String>,

	/// Version of the adapter implementation
	pub version: String,

	/// Base URL of the upstream API
	pub base_url: String,
}

impl AdapterInfo {
	pub fn new(source: SourceKey, name: impl Into<String>, base_url: impl Into<String>) -> Self {
		Self {
			source,
			name: name.into(),
			description: None,
			version: env!("CARGO_PKG_VERSION").to_string(),
			base_url: base_url.into(),
		}
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}
}

/// Runtime configuration handed to an adapter at construction
///
/// Only the fields an adapter actually needs; the settings layer owns the
/// richer per-source configuration and converts into this.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRuntimeConfig {
	pub source: SourceKey,

	/// Overrides the adapter's built-in endpoint when set
	pub base_url: Option<String>,

	/// Per-request HTTP timeout in milliseconds
	pub timeout_ms: u64,

	/// Retries on transient failures, not counting the first attempt
	pub max_retries: u32,

	/// Primary credential for the upstream API
	pub api_key: Option<SecretString>,

	/// Secondary credential (UMLS key for terminology lookups)
	pub secondary_key: Option<SecretString>,

	/// Contact identity sent upstream (SEC user agent, NCBI email)
	pub contact: Option<String>,
}

impl SourceRuntimeConfig {
	pub fn new(source: SourceKey) -> Self {
		Self {
			source,
			base_url: None,
			timeout_ms: 10_000,
			max_retries: 3,
			api_key: None,
			secondary_key: None,
			contact: None,
		}
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = Some(base_url.into());
		self
	}

	pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
		self.timeout_ms = timeout_ms;
		self
	}

	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;
		self
	}

	pub fn with_api_key(mut self, api_key: SecretString) -> Self {
		self.api_key = Some(api_key);
		self
	}

	pub fn with_secondary_key(mut self, key: SecretString) -> Self {
		self.secondary_key = Some(key);
		self
	}

	pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
		self.contact = Some(contact.into());
		self
	}

	/// Configured endpoint or the adapter's default
	pub fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
		self.base_url
			.as_deref()
			.map(|url| url.trim_end_matches('/'))
			.unwrap_or(default)
	}
}

/// Per-call tuning knobs.
///
/// Unset fields fall back to each adapter's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
	/// Upper bound on records requested from the upstream API
	pub max_results: Option<usize>,

	/// Look-back window for date-bounded sources
	pub days_back: Option<u32>,
}

impl FetchOptions {
	pub fn with_max_results(mut self, max_results: usize) -> Self {
		self.max_results = Some(max_results);
		self
	}

	pub fn with_days_back(mut self, days_back: u32) -> Self {
		self.days_back = Some(days_back);
		self
	}

	pub fn max_results_or(&self, default: usize) -> usize {
		self.max_results.unwrap_or(default)
	}

	pub fn days_back_or(&self, default: u32) -> u32 {
		self.days_back.unwrap_or(default)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fetch_options_defaults() {
		let options = FetchOptions::default();
		assert_eq!(options.max_results_or(20), 20);
		assert_eq!(options.days_back_or(90), 90);

		let options = options.with_max_results(5).with_days_back(7);
		assert_eq!(options.max_results_or(20), 5);
		assert_eq!(options.days_back_or(90), 7);
	}

	#[test]
	fn test_runtime_config_base_url_override() {
		let config = SourceRuntimeConfig::new(SourceKey::LabelData);
		assert_eq!(config.base_url_or("https://api.fda.gov"), "https://api.fda.gov");

		let config = config.with_base_url("http://localhost:9000/");
		assert_eq!(config.base_url_or("https://api.fda.gov"), "http://localhost:9000");
	}

	#[test]
	fn test_adapter_info_builder() {
		let info = AdapterInfo::new(SourceKey::News, "Serper News", "https://google.serper.dev")
			.with_description("News search");
		assert_eq!(info.source, SourceKey::News);
		assert_eq!(info.description.as_deref(), Some("News search"));
	}
}
