//! Configuration settings structures

use crate::configurable_value::ConfigurableValue;
use medlens_types::{SourceKey, SourceRuntimeConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Main application settings
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
	pub server: ServerSettings,
	pub sources: SourcesSettings,
	pub aggregation: AggregationSettings,
	pub terminology_cache: TermCacheSettings,
	pub llm: LlmSettings,
	pub environment: EnvironmentSettings,
	pub logging: LoggingSettings,
}

/// Server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
	pub host: String,
	pub port: u16,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			host: "0.0.0.0".to_string(),
			port: 3000,
		}
	}
}

/// Per-source configuration, one table for each of the six sources
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SourcesSettings {
	pub label_data: SourceSettings,
	pub trials: SourceSettings,
	pub filings: SourceSettings,
	pub literature: SourceSettings,
	pub news: SourceSettings,
	pub terminology: SourceSettings,
}

impl SourcesSettings {
	pub fn get(&self, source: SourceKey) -> &SourceSettings {
		match source {
			SourceKey::LabelData => &self.label_data,
			SourceKey::Trials => &self.trials,
			SourceKey::Filings => &self.filings,
			SourceKey::Literature => &self.literature,
			SourceKey::News => &self.news,
			SourceKey::Terminology => &self.terminology,
		}
	}

	pub fn get_mut(&mut self, source: SourceKey) -> &mut SourceSettings {
		match source {
			SourceKey::LabelData => &mut self.label_data,
			SourceKey::Trials => &mut self.trials,
			SourceKey::Filings => &mut self.filings,
			SourceKey::Literature => &mut self.literature,
			SourceKey::News => &mut self.news,
			SourceKey::Terminology => &mut self.terminology,
		}
	}

	/// Sources with `enabled = true`, in canonical order
	pub fn enabled(&self) -> Vec<SourceKey> {
		SourceKey::ALL
			.iter()
			.copied()
			.filter(|source| self.get(*source).enabled)
			.collect()
	}
}

/// Settings for a single upstream source
///
/// Credentials left unset fall back to the conventional environment
/// variable for that source (see [`default_credentials`]).
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SourceSettings {
	pub enabled: bool,
	pub timeout_ms: u64,
	pub max_retries: u32,
	/// Overrides the adapter's built-in endpoint
	pub base_url: Option<String>,
	pub api_key: Option<ConfigurableValue>,
	/// UMLS key for terminology lookups
	pub secondary_key: Option<ConfigurableValue>,
	/// SEC user agent or NCBI contact email
	pub contact: Option<ConfigurableValue>,
}

impl Default for SourceSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			timeout_ms: 10_000,
			max_retries: 3,
			base_url: None,
			api_key: None,
			secondary_key: None,
			contact: None,
		}
	}
}

/// Environment variables consulted when a source has no explicit credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DefaultCredentials {
	pub api_key: Option<&'static str>,
	pub secondary_key: Option<&'static str>,
	pub contact: Option<&'static str>,
}

pub fn default_credentials(source: SourceKey) -> DefaultCredentials {
	match source {
		SourceKey::LabelData => DefaultCredentials {
			api_key: Some("FDA_API_KEY"),
			..Default::default()
		},
		SourceKey::Trials => DefaultCredentials::default(),
		SourceKey::Filings => DefaultCredentials {
			contact: Some("SEC_USER_AGENT"),
			..Default::default()
		},
		SourceKey::Literature => DefaultCredentials {
			api_key: Some("NCBI_API_KEY"),
			contact: Some("NCBI_EMAIL"),
			..Default::default()
		},
		SourceKey::News => DefaultCredentials {
			api_key: Some("SERPER_API_KEY"),
			..Default::default()
		},
		SourceKey::Terminology => DefaultCredentials {
			api_key: Some("SNOMED_API_KEY"),
			secondary_key: Some("UMLS_API_KEY"),
			..Default::default()
		},
	}
}

fn resolve_credential(
	source: SourceKey,
	configured: Option<&ConfigurableValue>,
	fallback_env: Option<&'static str>,
) -> Option<String> {
	match configured {
		Some(value) => match value.resolve() {
			Ok(resolved) if !resolved.trim().is_empty() => Some(resolved),
			Ok(_) => None,
			Err(e) => {
				warn!("{}: {} ({})", source, e, value.description());
				None
			},
		},
		None => fallback_env
			.and_then(|var| std::env::var(var).ok())
			.filter(|value| !value.trim().is_empty()),
	}
}

impl SourceSettings {
	/// Resolve credentials and build the adapter's runtime configuration
	///
	/// Unresolvable credentials are left unset; the adapter decides whether
	/// it can run without them.
	pub fn to_runtime_config(&self, source: SourceKey) -> SourceRuntimeConfig {
		let defaults = default_credentials(source);
		let mut config = SourceRuntimeConfig::new(source)
			.with_timeout_ms(self.timeout_ms)
			.with_max_retries(self.max_retries);

		if let Some(base_url) = self.base_url.as_deref().filter(|url| !url.is_empty()) {
			config = config.with_base_url(base_url);
		}
		if let Some(key) = resolve_credential(source, self.api_key.as_ref(), defaults.api_key) {
			config = config.with_api_key(key.into());
		}
		if let Some(key) =
			resolve_credential(source, self.secondary_key.as_ref(), defaults.secondary_key)
		{
			config = config.with_secondary_key(key.into());
		}
		if let Some(contact) = resolve_credential(source, self.contact.as_ref(), defaults.contact) {
			config = config.with_contact(contact);
		}
		config
	}
}

/// Fan-out timing and default fetch knobs
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AggregationSettings {
	/// Deadline for the whole aggregation
	pub global_timeout_ms: u64,
	/// Deadline for each adapter call
	pub per_source_timeout_ms: u64,
	pub default_max_results: Option<usize>,
	pub default_days_back: Option<u32>,
}

impl Default for AggregationSettings {
	fn default() -> Self {
		Self {
			global_timeout_ms: 30_000,
			per_source_timeout_ms: 20_000,
			default_max_results: None,
			default_days_back: None,
		}
	}
}

/// Shared terminology cache
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TermCacheSettings {
	pub enabled: bool,
	pub capacity: usize,
	/// Entries never expire when unset
	pub ttl_secs: Option<u64>,
}

impl Default for TermCacheSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			capacity: 1024,
			ttl_secs: Some(3600),
		}
	}
}

/// Chat-completion endpoint used by the summarizer
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LlmSettings {
	pub enabled: bool,
	pub base_url: String,
	pub model: String,
	pub max_tokens: u32,
	pub temperature: f32,
	pub max_retries: u32,
	pub timeout_ms: u64,
	pub api_key: ConfigurableValue,
}

impl Default for LlmSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			base_url: "https://api.groq.com/openai/v1".to_string(),
			model: "llama3-70b-8192".to_string(),
			max_tokens: 1024,
			temperature: 0.7,
			max_retries: 2,
			timeout_ms: 60_000,
			api_key: ConfigurableValue::from_env("GROQ_API_KEY"),
		}
	}
}

/// Environment-specific settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EnvironmentSettings {
	pub profile: EnvironmentProfile,
	pub debug: bool,
	pub rate_limiting: RateLimitSettings,
}

impl Default for EnvironmentSettings {
	fn default() -> Self {
		Self {
			profile: EnvironmentProfile::Development,
			debug: true,
			rate_limiting: RateLimitSettings::default(),
		}
	}
}

/// Environment profiles
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentProfile {
	Development,
	Staging,
	Production,
}

/// Rate limiting configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitSettings {
	pub enabled: bool,
	pub requests_per_minute: u32,
	pub burst_size: u32,
}

impl Default for RateLimitSettings {
	fn default() -> Self {
		Self {
			enabled: false,
			requests_per_minute: 100,
			burst_size: 10,
		}
	}
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
	pub level: String,
	pub format: LogFormat,
	pub structured: bool,
}

impl Default for LoggingSettings {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
			format: LogFormat::Pretty,
			structured: false,
		}
	}
}

/// Log format options
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	Json,
	Pretty,
	Compact,
}

/// Settings that deserialize fine but cannot be run
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigValidationError {
	#[error("server port must be non-zero")]
	InvalidPort,
	#[error("{field} must be greater than zero")]
	ZeroValue { field: &'static str },
	#[error("per-source timeout ({per_source_ms}ms) exceeds the global timeout ({global_ms}ms)")]
	TimeoutOrdering { per_source_ms: u64, global_ms: u64 },
	#[error("llm temperature {0} is outside 0.0..=2.0")]
	InvalidTemperature(f32),
	#[error("no sources are enabled")]
	NoSourcesEnabled,
}

impl Settings {
	/// Get server bind address
	pub fn bind_address(&self) -> String {
		format!("{}:{}", self.server.host, self.server.port)
	}

	/// Check if running in production
	pub fn is_production(&self) -> bool {
		self.environment.profile == EnvironmentProfile::Production
	}

	/// Check if debug mode is enabled
	pub fn is_debug(&self) -> bool {
		self.environment.debug && !self.is_production()
	}

	/// Runtime configuration for every enabled source
	pub fn runtime_configs(&self) -> Vec<SourceRuntimeConfig> {
		self.sources
			.enabled()
			.into_iter()
			.map(|source| self.sources.get(source).to_runtime_config(source))
			.collect()
	}

	pub fn validate(&self) -> Result<(), ConfigValidationError> {
		if self.server.port == 0 {
			return Err(ConfigValidationError::InvalidPort);
		}
		let aggregation = &self.aggregation;
		if aggregation.global_timeout_ms == 0 {
			return Err(ConfigValidationError::ZeroValue {
				field: "aggregation.global_timeout_ms",
			});
		}
		if aggregation.per_source_timeout_ms == 0 {
			return Err(ConfigValidationError::ZeroValue {
				field: "aggregation.per_source_timeout_ms",
			});
		}
		if aggregation.per_source_timeout_ms > aggregation.global_timeout_ms {
			return Err(ConfigValidationError::TimeoutOrdering {
				per_source_ms: aggregation.per_source_timeout_ms,
				global_ms: aggregation.global_timeout_ms,
			});
		}
		if self.terminology_cache.enabled && self.terminology_cache.capacity == 0 {
			return Err(ConfigValidationError::ZeroValue {
				field: "terminology_cache.capacity",
			});
		}
		if !(0.0..=2.0).contains(&self.llm.temperature) {
			return Err(ConfigValidationError::InvalidTemperature(self.llm.temperature));
		}
		if self.sources.enabled().is_empty() {
			return Err(ConfigValidationError::NoSourcesEnabled);
		}
		Ok(())
	}
}
