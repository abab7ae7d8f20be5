//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tutor_core::{ErrorKind, ItemError, error::StoreError};

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// A store or engine failure, classified by its [`ErrorKind`].
  #[error("{source}")]
  Store {
    kind:   ErrorKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

impl ApiError {
  pub fn store<E: StoreError>(err: E) -> Self {
    Self::Store { kind: err.kind(), source: Box::new(err) }
  }
}

/// A single rejected item becomes the whole response's error.
impl From<ItemError> for ApiError {
  fn from(err: ItemError) -> Self {
    Self::Store { kind: err.kind, source: err.message.into() }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Store { kind, source } => {
        let status = match kind {
          ErrorKind::Validation => StatusCode::BAD_REQUEST,
          ErrorKind::NotFound => StatusCode::NOT_FOUND,
          ErrorKind::Conflict => StatusCode::CONFLICT,
          ErrorKind::Internal => {
            tracing::error!(error = %source, "store failure");
            StatusCode::INTERNAL_SERVER_ERROR
          }
        };
        (status, source.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
