//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Client errors carry the governance error's stable `reason` and message.
//! Internal errors carry only an opaque incident id; the detail goes to the
//! log under the same id.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use docket_governance::Error as GovernanceError;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Governance(#[from] GovernanceError),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Governance(e) => match e {
        GovernanceError::SubjectNotFound(_)
        | GovernanceError::ConsentNotFound(_)
        | GovernanceError::ExportNotFound(_) => StatusCode::NOT_FOUND,
        GovernanceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        GovernanceError::Busy(_) | GovernanceError::ExportNotReady(_) => {
          StatusCode::CONFLICT
        }
        GovernanceError::ExportExpired(_) | GovernanceError::ExportUnavailable(_) => {
          StatusCode::GONE
        }
        GovernanceError::Store(_) | GovernanceError::AuditWrite(_) => {
          StatusCode::INTERNAL_SERVER_ERROR
        }
      },
    }
  }

  fn reason(&self) -> &'static str {
    match self {
      ApiError::BadRequest(_) => "bad_request",
      ApiError::Governance(e) => e.reason(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let reason = self.reason();

    if status.is_server_error() {
      let incident = Uuid::new_v4();
      tracing::error!(%incident, reason, error = ?self, "request failed");
      return (status, Json(json!({ "error": reason, "incident": incident })))
        .into_response();
    }

    (status, Json(json!({ "error": reason, "message": self.to_string() })))
      .into_response()
  }
}
