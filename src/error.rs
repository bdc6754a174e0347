//! Error taxonomy shared by the core modules and the HTTP surface.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::domain::SessionStatus;

#[derive(Debug, Error)]
pub enum AssessError {
  /// Caller-supplied parameters fail a precondition.
  #[error("Invalid request: {0}")]
  InvalidRequest(String),

  #[error("Cannot start an assessment without questions")]
  EmptyPaper,

  /// The external model replied with something that does not match the expected shape.
  #[error("Schema violation at `{path}`: {reason}")]
  SchemaViolation { path: String, reason: String },

  #[error("External call failed: {0}")]
  ExternalCallFailure(String),

  #[error("Grading failed: {0}")]
  GradingFailed(String),

  #[error("Cannot {action} a session that is {from}")]
  InvalidTransition { from: SessionStatus, action: &'static str },

  #[error("Not found: {0}")]
  NotFound(String),
}

impl AssessError {
  pub fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
    AssessError::SchemaViolation { path: path.into(), reason: reason.into() }
  }
}

impl IntoResponse for AssessError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      AssessError::InvalidRequest(_) | AssessError::EmptyPaper => (StatusCode::BAD_REQUEST, "Invalid request"),
      AssessError::NotFound(_) => (StatusCode::NOT_FOUND, "Resource not found"),
      AssessError::SchemaViolation { .. } | AssessError::ExternalCallFailure(_) => {
        (StatusCode::INTERNAL_SERVER_ERROR, "Model service returned an unusable response")
      }
      AssessError::GradingFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to grade assessment"),
      AssessError::InvalidTransition { .. } => {
        // Unreachable from well-behaved clients.
        error!(target: "session", error = %self, "Invalid session transition requested");
        (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred")
      }
    };

    let body = Json(json!({
      "error": {
        "message": message,
        "details": self.to_string(),
      }
    }));

    (status, body).into_response()
  }
}

pub type AssessResult<T> = Result<T, AssessError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_codes_follow_the_taxonomy() {
    let cases = [
      (AssessError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
      (AssessError::EmptyPaper, StatusCode::BAD_REQUEST),
      (AssessError::NotFound("s".into()), StatusCode::NOT_FOUND),
      (AssessError::schema("topics", "missing"), StatusCode::INTERNAL_SERVER_ERROR),
      (AssessError::GradingFailed("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
      (
        AssessError::InvalidTransition { from: SessionStatus::Graded, action: "submit" },
        StatusCode::INTERNAL_SERVER_ERROR,
      ),
    ];
    for (err, expected) in cases {
      assert_eq!(err.into_response().status(), expected);
    }
  }

  #[test]
  fn schema_violation_names_the_field_path() {
    let err = AssessError::schema("topics[0].questions[2].marks", "expected an integer in [1, 20]");
    assert_eq!(
      err.to_string(),
      "Schema violation at `topics[0].questions[2].marks`: expected an integer in [1, 20]"
    );
  }
}
