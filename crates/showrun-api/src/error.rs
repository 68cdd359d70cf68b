//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The request names a real resource whose current state refuses the
  /// operation (a pipeline gate).
  #[error("conflict: {0}")]
  Conflict(String),

  /// The generation backend failed; the pipeline itself is healthy.
  #[error("backend error: {0}")]
  Backend(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Backend(m) => (StatusCode::BAD_GATEWAY, m.clone()),
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

impl From<showrun_engine::Error> for ApiError {
  fn from(err: showrun_engine::Error) -> Self {
    use showrun_engine::Error as E;
    let message = err.to_string();
    match err {
      E::ProjectNotFound(_)
      | E::EpisodeNotFound(_)
      | E::ArtifactNotFound(_)
      | E::ChangeEventNotFound(_)
      | E::PatchRunNotFound(_) => ApiError::NotFound(message),

      E::EmptyTitle
      | E::EmptyName
      | E::EmptySummary
      | E::EmptyReason
      | E::DeleteReasonRequired(_)
      | E::ConfirmationRequired
      | E::EpisodeDeleted(_)
      | E::NoPatchTargets => ApiError::BadRequest(message),

      E::SnapshotMissing
      | E::SnapshotStale
      | E::PredecessorNotLocked { .. }
      | E::CannotGenerate { .. }
      | E::CannotLock { .. }
      | E::NoContent(_)
      | E::AuditBlocked { .. }
      | E::NotLocked(_)
      | E::NotSoftDeleted(_)
      | E::NotStuck(_)
      | E::NotAnalyzed(_)
      | E::PatchNotApplicable { .. }
      | E::BatchRunning
      | E::BatchNotRunning => ApiError::Conflict(message),

      E::AnalysisFailed(_) | E::ProposalMissing(_) => ApiError::Backend(message),

      E::Store(source) => ApiError::Store(source),
    }
  }
}
