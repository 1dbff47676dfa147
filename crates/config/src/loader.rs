//! Configuration loading utilities

use crate::{settings::ConfigValidationError, Settings};
use config::{Config, ConfigError, Environment, File};

/// Config file consulted when `CONFIG_PATH` is unset (any supported extension)
pub const DEFAULT_CONFIG_PATH: &str = "config/config";

/// Prefix for environment overrides, e.g. `MEDLENS__SERVER__PORT=8080`
pub const ENV_PREFIX: &str = "MEDLENS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
	#[error("failed to load configuration: {0}")]
	Load(#[from] ConfigError),
	#[error("invalid configuration: {0}")]
	Invalid(#[from] ConfigValidationError),
}

/// Load configuration from the config file plus `MEDLENS__` environment overrides
pub fn load_config() -> Result<Settings, ConfigLoadError> {
	let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
	load_config_from(&path, environment_overrides())
}

pub fn environment_overrides() -> Environment {
	Environment::with_prefix(ENV_PREFIX)
		.separator("__")
		.try_parsing(true)
}

/// Load from an explicit file path and environment source, then validate
pub fn load_config_from(path: &str, env: Environment) -> Result<Settings, ConfigLoadError> {
	let settings: Settings = Config::builder()
		.add_source(File::with_name(path).required(false))
		.add_source(env)
		.build()?
		.try_deserialize()?;

	settings.validate()?;
	Ok(settings)
}

#[cfg(test)]
mod tests {
	use super::*;
	use config::Map;
	use std::io::Write;

	fn env_from(pairs: &[(&str, &str)]) -> Environment {
		let map: Map<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		environment_overrides().source(Some(map))
	}

	#[test]
	fn test_missing_file_yields_defaults() {
		let settings = load_config_from("config/does-not-exist", env_from(&[])).unwrap();
		assert_eq!(settings.server.port, 3000);
		assert_eq!(settings.aggregation.per_source_timeout_ms, 20_000);
	}

	#[test]
	fn test_environment_overrides() {
		let settings = load_config_from(
			"config/does-not-exist",
			env_from(&[
				("MEDLENS__SERVER__PORT", "8081"),
				("MEDLENS__AGGREGATION__GLOBAL_TIMEOUT_MS", "45000"),
				("MEDLENS__SOURCES__NEWS__ENABLED", "false"),
			]),
		)
		.unwrap();
		assert_eq!(settings.server.port, 8081);
		assert_eq!(settings.aggregation.global_timeout_ms, 45_000);
		assert!(!settings.sources.news.enabled);
	}

	#[test]
	fn test_file_values_and_validation() {
		let dir = std::env::temp_dir().join(format!("medlens-config-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let file = dir.join("config.json");
		let mut handle = std::fs::File::create(&file).unwrap();
		write!(
			handle,
			r#"{{"aggregation": {{"global_timeout_ms": 1000, "per_source_timeout_ms": 5000}}}}"#
		)
		.unwrap();

		let path = dir.join("config");
		let result = load_config_from(path.to_str().unwrap(), env_from(&[]));
		assert!(matches!(
			result,
			Err(ConfigLoadError::Invalid(ConfigValidationError::TimeoutOrdering { .. }))
		));

		std::fs::remove_dir_all(&dir).ok();
	}
}
