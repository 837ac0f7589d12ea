//! API error type rendering RFC 7807 problem responses.

use axum::{
  Json,
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler. Thin wrapper over the core taxonomy,
/// which already carries the status code, title, and detail.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pies_core::Error);

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = StatusCode::from_u16(self.0.status())
      .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
      tracing::error!(error = %self.0, "request failed");
    }
    let body = json!({
      "status": self.0.status(),
      "title":  self.0.title(),
      "detail": self.0.detail(),
    });
    (
      status,
      [(header::CONTENT_TYPE, "application/problem+json")],
      Json(body),
    )
      .into_response()
  }
}
