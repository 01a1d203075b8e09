use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use mkutils_store::StoreError;
use serde::Serialize;

use crate::directory::PresenceError;
use crate::relay::RelayError;
use crate::validation::ValidationError;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: None,
    }
  }

  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  Store(StoreError),
  ValidationError(String),
  NotOwner(String),
  NotFound(String),
  /// The action was valid but this process does not take it over HTTP.
  Forbidden(String),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    match self {
      AppError::Store(store_err) => {
        let (status, message) = match &store_err {
          StoreError::NotInitialized => (StatusCode::SERVICE_UNAVAILABLE, "Store is not initialized"),
          err if err.is_transient() => {
            tracing::warn!(error = %err, "Store unavailable");
            (
              StatusCode::SERVICE_UNAVAILABLE,
              "Store is temporarily unavailable. Please try again later.",
            )
          }
          err => {
            // Don't expose internal store errors
            tracing::error!(error = ?err, "Internal store error");
            (
              StatusCode::INTERNAL_SERVER_ERROR,
              "An internal error occurred. Please try again later.",
            )
          }
        };
        (status, Json(ErrorResponse::new(message))).into_response()
      }
      AppError::ValidationError(msg) => {
        tracing::warn!(validation_error = %msg, "Validation failed");
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(msg))).into_response()
      }
      AppError::NotOwner(server) => (
        StatusCode::CONFLICT,
        Json(ErrorResponse::with_details(
          "Server is not owned by this process",
          server,
        )),
      )
        .into_response(),
      AppError::NotFound(what) => {
        (StatusCode::NOT_FOUND, Json(ErrorResponse::new(what))).into_response()
      }
      AppError::Forbidden(msg) => {
        (StatusCode::FORBIDDEN, Json(ErrorResponse::new(msg))).into_response()
      }
    }
  }
}

impl From<StoreError> for AppError {
  fn from(err: StoreError) -> Self {
    AppError::Store(err)
  }
}

impl From<ValidationError> for AppError {
  fn from(err: ValidationError) -> Self {
    AppError::ValidationError(err.to_string())
  }
}

impl From<PresenceError> for AppError {
  fn from(err: PresenceError) -> Self {
    match err {
      PresenceError::Store(err) => AppError::Store(err),
      PresenceError::Validation(err) => err.into(),
      PresenceError::NotOwner(server) => AppError::NotOwner(server),
    }
  }
}

impl From<RelayError> for AppError {
  fn from(err: RelayError) -> Self {
    match err {
      RelayError::Validation(err) => err.into(),
      RelayError::Store(err) => AppError::Store(err),
      RelayError::Presence(err) => err.into(),
      RelayError::Decode { channel, source } => {
        AppError::ValidationError(format!("malformed payload on '{}': {}", channel, source))
      }
    }
  }
}
