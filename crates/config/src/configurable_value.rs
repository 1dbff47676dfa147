//! Configurable value types that can load from environment variables or plain values

use medlens_types::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A configurable value that can be loaded from environment variables or used as plain text
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConfigurableValue {
	/// Type of value: "env" for environment variable, "plain" for direct value
	#[serde(rename = "type")]
	pub value_type: ValueType,
	/// The value: either environment variable name or the actual value
	pub value: String,
}

/// Type of configurable value
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
	/// Load value from environment variable (name specified in `value` field)
	Env,
	/// Use the value directly from the `value` field
	Plain,
}

impl ConfigurableValue {
	/// Create a new environment variable reference
	pub fn from_env(env_var_name: &str) -> Self {
		Self {
			value_type: ValueType::Env,
			value: env_var_name.to_string(),
		}
	}

	/// Create a new plain value
	pub fn from_plain(plain_value: &str) -> Self {
		Self {
			value_type: ValueType::Plain,
			value: plain_value.to_string(),
		}
	}

	/// Resolve the actual value based on the type
	///
	/// For `Env` type, reads from environment variable.
	/// For `Plain` type, returns the value directly.
	pub fn resolve(&self) -> Result<String, ConfigurableValueError> {
		match self.value_type {
			ValueType::Env => std::env::var(&self.value).map_err(|_| {
				ConfigurableValueError::EnvironmentVariableNotFound(self.value.clone())
			}),
			ValueType::Plain => Ok(self.value.clone()),
		}
	}

	pub fn resolve_for_secret(&self) -> Result<SecretString, ConfigurableValueError> {
		let resolved_value = self.resolve()?;
		Ok(SecretString::new(resolved_value))
	}

	/// Secret if one is available; unset variables and blank values count as absent
	pub fn resolve_optional_secret(&self) -> Option<SecretString> {
		self.resolve_for_secret().ok().filter(|secret| !secret.is_empty())
	}

	/// Credentials written inline in a config file rather than referenced from the environment
	pub fn is_inline(&self) -> bool {
		matches!(self.value_type, ValueType::Plain)
	}

	/// Get a description of this configurable value for logging
	pub fn description(&self) -> String {
		match self.value_type {
			ValueType::Env => format!("environment variable '{}'", self.value),
			ValueType::Plain => "configured plain value".to_string(),
		}
	}
}

/// Errors that can occur when resolving configurable values
#[derive(Debug, thiserror::Error)]
pub enum ConfigurableValueError {
	#[error("Environment variable '{0}' not found")]
	EnvironmentVariableNotFound(String),
}

// Never print plain values, they are usually API keys
impl fmt::Display for ConfigurableValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.value_type {
			ValueType::Env => write!(f, "env:{}", self.value),
			ValueType::Plain => write!(f, "plain:[REDACTED]"),
		}
	}
}

/// `"env:NAME"` references an environment variable, anything else is plain
impl From<&str> for ConfigurableValue {
	fn from(value: &str) -> Self {
		if let Some(env_var) = value.strip_prefix("env:") {
			Self::from_env(env_var)
		} else {
			Self::from_plain(value)
		}
	}
}

impl From<String> for ConfigurableValue {
	fn from(value: String) -> Self {
		ConfigurableValue::from(value.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::env;

	#[test]
	fn test_plain_value() {
		let config = ConfigurableValue::from_plain("test-secret");
		assert_eq!(config.value_type, ValueType::Plain);
		assert_eq!(config.value, "test-secret");
		assert_eq!(config.resolve().unwrap(), "test-secret");
		assert!(config.is_inline());
	}

	#[test]
	fn test_env_value() {
		env::set_var("MEDLENS_TEST_SECRET", "secret-from-env");

		let config = ConfigurableValue::from_env("MEDLENS_TEST_SECRET");
		assert_eq!(config.value_type, ValueType::Env);
		assert_eq!(config.resolve().unwrap(), "secret-from-env");
		assert_eq!(
			config.resolve_optional_secret().unwrap().expose_secret(),
			"secret-from-env"
		);

		env::remove_var("MEDLENS_TEST_SECRET");
	}

	#[test]
	fn test_env_value_not_found() {
		let config = ConfigurableValue::from_env("MEDLENS_NON_EXISTENT_VAR");
		assert!(config.resolve().is_err());
		assert!(config.resolve_optional_secret().is_none());
	}

	#[test]
	fn test_blank_plain_value_is_absent() {
		assert!(ConfigurableValue::from_plain("").resolve_optional_secret().is_none());
	}

	#[test]
	fn test_from_string_conversion() {
		let plain_config = ConfigurableValue::from("plain-value");
		assert_eq!(plain_config.value_type, ValueType::Plain);
		assert_eq!(plain_config.value, "plain-value");

		let env_config = ConfigurableValue::from("env:SERPER_API_KEY".to_string());
		assert_eq!(env_config.value_type, ValueType::Env);
		assert_eq!(env_config.value, "SERPER_API_KEY");
	}

	#[test]
	fn test_display_redacts_plain_values() {
		assert_eq!(ConfigurableValue::from_plain("sk-123").to_string(), "plain:[REDACTED]");
		assert_eq!(ConfigurableValue::from_env("FDA_API_KEY").to_string(), "env:FDA_API_KEY");
		assert_eq!(
			ConfigurableValue::from_env("FDA_API_KEY").description(),
			"environment variable 'FDA_API_KEY'"
		);
	}

	#[test]
	fn test_serde_serialization() {
		let config = ConfigurableValue::from_env("NCBI_API_KEY");

		let json = serde_json::to_string(&config).unwrap();
		assert!(json.contains("\"type\":\"env\""));
		assert!(json.contains("\"value\":\"NCBI_API_KEY\""));

		let deserialized: ConfigurableValue = serde_json::from_str(&json).unwrap();
		assert_eq!(deserialized, config);
	}
}
