use axum::{http::StatusCode, response::Json};
use serde::Serialize;
#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Error response format shared by handlers
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
	pub timestamp: i64,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

impl ErrorResponse {
	pub fn new(error: &str, message: impl Into<String>) -> Self {
		Self {
			error: error.to_string(),
			message: message.into(),
			timestamp: chrono::Utc::now().timestamp(),
		}
	}

	/// 400 with the `VALIDATION_ERROR` code
	pub fn validation(message: impl Into<String>) -> ApiError {
		(
			StatusCode::BAD_REQUEST,
			Json(Self::new("VALIDATION_ERROR", message)),
		)
	}
}
