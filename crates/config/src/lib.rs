//! MedLens Configuration
//!
//! Settings, configuration loading and startup logging for the MedLens aggregator.

pub mod configurable_value;
pub mod loader;
pub mod settings;
pub mod startup_logger;

pub use configurable_value::{ConfigurableValue, ConfigurableValueError, ValueType};
pub use loader::{load_config, load_config_from, ConfigLoadError};
pub use settings::{
	default_credentials, AggregationSettings, ConfigValidationError, EnvironmentProfile,
	LlmSettings, LogFormat, LoggingSettings, Settings, SourceSettings, SourcesSettings,
	TermCacheSettings,
};
pub use startup_logger::{
	log_service_info, log_service_shutdown, log_source_summary, log_startup_complete,
};
