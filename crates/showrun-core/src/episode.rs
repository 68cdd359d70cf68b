//! Episodes — the sequentially-numbered units of a season.
//!
//! Status transitions are owned by the pipeline engine; this module defines
//! the states, the pure transition predicates, and the records written at
//! lock time (lock events and continuity notes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle state of an episode.
///
/// `pending → generating → {complete | needs_revision | error}`;
/// `complete`/`needs_revision` lock or re-enter `generating`; any non-locked
/// state becomes `invalidated` when the owning snapshot goes stale. `locked`
/// is terminal except for patch amendments, which append versions without
/// ever leaving the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
  Pending,
  Generating,
  Complete,
  NeedsRevision,
  Error,
  Locked,
  Invalidated,
}

impl EpisodeStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      EpisodeStatus::Pending => "pending",
      EpisodeStatus::Generating => "generating",
      EpisodeStatus::Complete => "complete",
      EpisodeStatus::NeedsRevision => "needs_revision",
      EpisodeStatus::Error => "error",
      EpisodeStatus::Locked => "locked",
      EpisodeStatus::Invalidated => "invalidated",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(EpisodeStatus::Pending),
      "generating" => Ok(EpisodeStatus::Generating),
      "complete" => Ok(EpisodeStatus::Complete),
      "needs_revision" => Ok(EpisodeStatus::NeedsRevision),
      "error" => Ok(EpisodeStatus::Error),
      "locked" => Ok(EpisodeStatus::Locked),
      "invalidated" => Ok(EpisodeStatus::Invalidated),
      other => Err(Error::UnknownStatus(other.to_string())),
    }
  }

  /// May a generation attempt start from this state?
  ///
  /// `invalidated` is deliberately excluded: the remedy for staleness is a
  /// fresh snapshot (which resets the episode to `pending`), never a retry
  /// against the stale one.
  pub fn can_generate(&self) -> bool {
    matches!(
      self,
      EpisodeStatus::Pending
        | EpisodeStatus::Complete
        | EpisodeStatus::NeedsRevision
        | EpisodeStatus::Error
    )
  }

  /// May this state transition to `locked`?
  pub fn can_lock(&self) -> bool {
    matches!(self, EpisodeStatus::Complete | EpisodeStatus::NeedsRevision)
  }
}

impl std::fmt::Display for EpisodeStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One episode of a project's season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
  pub episode_id:    Uuid,
  pub project_id:    Uuid,
  /// The canon snapshot this episode is currently bound to.
  pub snapshot_id:   Uuid,
  /// 1-based position in the season. Unique per project.
  pub index:         u32,
  pub status:        EpisodeStatus,
  /// Set exactly once, at first lock; immutable afterwards.
  pub locked_at:     Option<DateTime<Utc>>,
  /// At most one episode per project carries this flag.
  pub is_template:   bool,
  /// Whether the last backend failure is worth retrying.
  pub retryable:     bool,
  pub last_error:    Option<String>,
  pub deleted_at:    Option<DateTime<Utc>>,
  pub delete_reason: Option<String>,
  pub created_at:    DateTime<Utc>,
}

impl Episode {
  pub fn is_locked(&self) -> bool {
    self.locked_at.is_some()
  }

  pub fn is_deleted(&self) -> bool {
    self.deleted_at.is_some()
  }
}

/// One immutable version of an episode's content. The latest version is the
/// episode's content pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeVersion {
  pub version_id: Uuid,
  pub episode_id: Uuid,
  pub seq:        i64,
  pub content:    String,
  pub created_at: DateTime<Utc>,
}

/// Why a lock event was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockSource {
  /// The operator's initial lock of generated content.
  Initial,
  /// An applied retcon patch re-locking amended content.
  Amendment,
}

impl LockSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      LockSource::Initial => "initial",
      LockSource::Amendment => "amendment",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "initial" => Ok(LockSource::Initial),
      "amendment" => Ok(LockSource::Amendment),
      other => Err(Error::UnknownLockSource(other.to_string())),
    }
  }
}

/// Append-only record of a lock or amendment. `content` is a frozen copy of
/// the version exactly as locked — the durable export of that lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
  pub lock_event_id: Uuid,
  pub episode_id:    Uuid,
  pub version_id:    Uuid,
  pub content:       String,
  pub source:        LockSource,
  pub patch_run_id:  Option<Uuid>,
  pub locked_at:     DateTime<Utc>,
}

/// Structured metadata carried by a continuity note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityMetadata {
  pub index:       u32,
  pub version_seq: i64,
  pub word_count:  usize,
  pub locked_at:   DateTime<Utc>,
}

/// Derived at lock time for the next episode's generation context: the tail
/// of the locked content plus structured metadata. One per episode, replaced
/// when an amendment re-locks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuityNote {
  pub episode_id:    Uuid,
  pub tail_excerpt:  String,
  pub metadata:      ContinuityMetadata,
  pub lock_event_id: Uuid,
  pub updated_at:    DateTime<Utc>,
}

/// Input for writing a lock event.
#[derive(Debug, Clone)]
pub struct NewLockEvent {
  pub episode_id:   Uuid,
  pub version_id:   Uuid,
  pub content:      String,
  pub source:       LockSource,
  pub patch_run_id: Option<Uuid>,
}
