//! Error responses of the HTTP API.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::fmt;
use xswap_core::SwapError;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
}

/// API error with its HTTP status.
#[derive(Debug)]
pub enum ApiError {
	/// Malformed request (400)
	BadRequest { error_type: String, message: String },
	/// Well-formed request the engine refused (422)
	UnprocessableEntity { error_type: String, message: String },
	/// Engine halted (503)
	ServiceUnavailable { error_type: String, message: String },
}

impl ApiError {
	pub fn bad_request(error_type: &str, message: impl Into<String>) -> Self {
		ApiError::BadRequest {
			error_type: error_type.to_string(),
			message: message.into(),
		}
	}

	pub fn status_code(&self) -> StatusCode {
		match self {
			ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
			ApiError::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
			ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message) = match self {
			ApiError::BadRequest {
				error_type,
				message,
			}
			| ApiError::UnprocessableEntity {
				error_type,
				message,
			}
			| ApiError::ServiceUnavailable {
				error_type,
				message,
			} => (error_type, message),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
		}
	}
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let body = self.to_error_response();
		write!(f, "{}: {}", body.error, body.message)
	}
}

impl std::error::Error for ApiError {}

impl From<SwapError> for ApiError {
	fn from(err: SwapError) -> Self {
		let error_type = err.kind().to_string();
		let message = err.to_string();
		match err {
			SwapError::InvalidParams(_) => ApiError::BadRequest {
				error_type,
				message,
			},
			SwapError::OperationsHalted => ApiError::ServiceUnavailable {
				error_type,
				message,
			},
			_ => ApiError::UnprocessableEntity {
				error_type,
				message,
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status_code(), Json(self.to_error_response())).into_response()
	}
}
