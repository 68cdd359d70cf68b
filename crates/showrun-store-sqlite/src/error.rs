//! Error type for `showrun-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] showrun_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("project not found: {0}")]
  ProjectNotFound(Uuid),

  #[error("artifact not found: {0}")]
  ArtifactNotFound(Uuid),

  #[error("episode not found: {0}")]
  EpisodeNotFound(Uuid),

  #[error("change event not found: {0}")]
  ChangeEventNotFound(Uuid),

  #[error("patch run not found: {0}")]
  PatchRunNotFound(Uuid),

  /// A conditional episode update found a different status than it
  /// required. The update did not happen.
  #[error("episode {episode_id} is {actual}; expected {expected}")]
  EpisodeConflict {
    episode_id: Uuid,
    expected:   &'static str,
    actual:     String,
  },

  /// A conditional patch-run update found a different status than it
  /// required. The update did not happen.
  #[error("patch run {patch_run_id} is {actual}; expected {expected}")]
  PatchConflict {
    patch_run_id: Uuid,
    expected:     &'static str,
    actual:       String,
  },

  #[error("episode {0} is not locked")]
  NotLocked(Uuid),

  #[error("episode {0} is already soft-deleted")]
  AlreadyDeleted(Uuid),

  #[error("episode {0} is not soft-deleted")]
  NotDeleted(Uuid),

  #[error("a batch is already running for project {0}")]
  BatchRunning(Uuid),

  #[error("no batch is running for project {0}")]
  BatchNotRunning(Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
