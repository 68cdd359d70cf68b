//! Pipeline error type.
//!
//! Every refused transition names the invariant that blocked it, so callers
//! can distinguish operator mistakes from state conflicts without string
//! matching.

use showrun_core::{
  episode::EpisodeStatus,
  generate::AuditIssue,
  retcon::PatchStatus,
};
use thiserror::Error;
use uuid::Uuid;

/// An error returned by a pipeline operation.
#[derive(Debug, Error)]
pub enum Error {
  // ─── Missing records ────────────────────────────────────────────────────────
  #[error("project {0} not found")]
  ProjectNotFound(Uuid),

  #[error("episode {0} not found")]
  EpisodeNotFound(u32),

  #[error("episode {0} is soft-deleted")]
  EpisodeDeleted(u32),

  #[error("artifact {0} not found")]
  ArtifactNotFound(Uuid),

  #[error("change event {0} not found")]
  ChangeEventNotFound(Uuid),

  #[error("patch run {0} not found")]
  PatchRunNotFound(Uuid),

  // ─── Input validation ───────────────────────────────────────────────────────
  #[error("project title must not be empty")]
  EmptyTitle,

  #[error("artifact and context set names must not be empty")]
  EmptyName,

  #[error("change summary must not be empty")]
  EmptySummary,

  #[error("a rejection reason is required")]
  EmptyReason,

  #[error("episode {0} is locked; deleting it requires a reason")]
  DeleteReasonRequired(u32),

  #[error("destroying an episode requires explicit confirmation")]
  ConfirmationRequired,

  // ─── State-machine gates ────────────────────────────────────────────────────
  #[error("no canon snapshot exists; resolve one before generating")]
  SnapshotMissing,

  #[error("canon snapshot is stale; create a fresh snapshot to continue")]
  SnapshotStale,

  #[error("episode {index} cannot generate until episode {predecessor} is locked")]
  PredecessorNotLocked { index: u32, predecessor: u32 },

  #[error("episode {index} is {status}; generation cannot start")]
  CannotGenerate { index: u32, status: EpisodeStatus },

  #[error("episode {index} is {status}; only complete or needs_revision content can lock")]
  CannotLock { index: u32, status: EpisodeStatus },

  #[error("episode {0} has no drafted content")]
  NoContent(u32),

  #[error("audit blocked locking episode {index}")]
  AuditBlocked { index: u32, issues: Vec<AuditIssue> },

  #[error("episode {0} is not locked")]
  NotLocked(u32),

  #[error("episode {0} is not soft-deleted")]
  NotSoftDeleted(u32),

  #[error("episode {0} is not stuck in generating")]
  NotStuck(u32),

  // ─── Retcon gates ───────────────────────────────────────────────────────────
  #[error("change event {0} has not been analysed")]
  NotAnalyzed(Uuid),

  #[error("impact analysis failed: {0}")]
  AnalysisFailed(String),

  #[error("no locked episodes match the requested patch targets")]
  NoPatchTargets,

  #[error("patch run is {status}; expected {expected}")]
  PatchNotApplicable {
    status:   PatchStatus,
    expected: &'static str,
  },

  #[error("patch run {0} completed without proposed content")]
  ProposalMissing(Uuid),

  // ─── Batch gates ────────────────────────────────────────────────────────────
  #[error("a batch is already running for this project")]
  BatchRunning,

  #[error("no batch is running for this project")]
  BatchNotRunning,

  // ─── Persistence ────────────────────────────────────────────────────────────
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a store failure for propagation.
  pub(crate) fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
