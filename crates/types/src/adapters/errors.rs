//! Error types for adapter operations

use thiserror::Error;

/// Adapter operation errors
#[derive(Error, Debug)]
pub enum AdapterError {
	#[error("HTTP request failed: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("timed out after {timeout_ms}ms")]
	Timeout { timeout_ms: u64 },

	#[error("Invalid response format: {reason}")]
	InvalidResponse { reason: String },

	#[error("HTTP {status_code}: {reason}")]
	HttpStatusError { status_code: u16, reason: String },

	#[error("rate limited by {source_name}")]
	RateLimitExceeded { source_name: String },

	#[error("{source_name} API key is not configured")]
	MissingCredential { source_name: String },

	#[error("no data from any strategy for '{subject}'")]
	Exhausted { subject: String },

	#[error("Configuration error: {reason}")]
	ConfigError { reason: String },

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Connection error: {0}")]
	Connection(String),

	#[error("Not found: {0}")]
	NotFound(String),

	/// Failure message reported verbatim
	#[error("{0}")]
	Upstream(String),
}

impl AdapterError {
	/// Extract HTTP status code from the error if available
	pub fn status_code(&self) -> Option<u16> {
		match self {
			AdapterError::HttpStatusError { status_code, .. } => Some(*status_code),
			AdapterError::HttpError(reqwest_error) => {
				reqwest_error.status().map(|status| status.as_u16())
			},
			AdapterError::RateLimitExceeded { .. } => Some(429),
			_ => None,
		}
	}

	/// Create an HTTP failure error with the given status code and reason
	pub fn http_failure(status_code: u16, reason: impl Into<String>) -> Self {
		Self::HttpStatusError {
			status_code,
			reason: reason.into(),
		}
	}

	/// Create an HTTP failure error from response status with default reason
	pub fn from_http_failure(status_code: u16) -> Self {
		let reason = match status_code {
			400 => "Bad Request".to_string(),
			401 => "Unauthorized".to_string(),
			403 => "Forbidden".to_string(),
			404 => "Not Found".to_string(),
			408 => "Request Timeout".to_string(),
			429 => "Too Many Requests".to_string(),
			500 => "Internal Server Error".to_string(),
			502 => "Bad Gateway".to_string(),
			503 => "Service Unavailable".to_string(),
			504 => "Gateway Timeout".to_string(),
			_ => format!("HTTP Error {}", status_code),
		};

		Self::HttpStatusError {
			status_code,
			reason,
		}
	}

	pub fn invalid_response(reason: impl Into<String>) -> Self {
		Self::InvalidResponse {
			reason: reason.into(),
		}
	}

	/// Whether a retry has a chance of succeeding.
	///
	/// Timeouts, connection failures, throttling and 5xx responses are
	/// transient. Malformed payloads and client errors are not.
	pub fn is_transient(&self) -> bool {
		match self {
			AdapterError::Timeout { .. }
			| AdapterError::Connection(_)
			| AdapterError::RateLimitExceeded { .. } => true,
			AdapterError::HttpStatusError { status_code, .. } => {
				*status_code == 408 || *status_code == 429 || *status_code >= 500
			},
			AdapterError::HttpError(e) => {
				if e.is_timeout() || e.is_connect() {
					return true;
				}
				if e.is_decode() || e.is_builder() {
					return false;
				}
				e.status()
					.map(|s| s.as_u16() == 429 || s.is_server_error())
					.unwrap_or(e.is_request())
			},
			_ => false,
		}
	}
}

/// Errors raised while wiring adapters together at startup
#[derive(Error, Debug)]
pub enum AdapterFactoryError {
	#[error("Adapter already registered for source: {source_name}")]
	DuplicateSource { source_name: String },

	#[error("Failed to build adapter for {source_name}: {reason}")]
	BuildFailed { source_name: String, reason: String },
}
