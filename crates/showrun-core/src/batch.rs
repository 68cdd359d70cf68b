//! Batch cursor — persisted state of the tick-driven runner.
//!
//! The runner never lives in memory alone: its position and stop flag are a
//! row any process can read to resume or halt a batch. One cursor per
//! project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
  /// Ticks are advancing the cursor.
  Running,
  /// A stop request was honored before the next episode started.
  Stopped,
  /// The batch halted on something needing an operator: a failed or
  /// revision-flagged generation, an audit block, or a stale snapshot.
  Blocked,
  /// The cursor ran past the last episode.
  Done,
}

impl BatchStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      BatchStatus::Running => "running",
      BatchStatus::Stopped => "stopped",
      BatchStatus::Blocked => "blocked",
      BatchStatus::Done => "done",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "running" => Ok(BatchStatus::Running),
      "stopped" => Ok(BatchStatus::Stopped),
      "blocked" => Ok(BatchStatus::Blocked),
      "done" => Ok(BatchStatus::Done),
      other => Err(Error::UnknownStatus(other.to_string())),
    }
  }

  pub fn is_terminal(&self) -> bool {
    !matches!(self, BatchStatus::Running)
  }
}

/// The persisted runner state for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCursor {
  pub project_id:     Uuid,
  /// The next episode index a tick will attempt.
  pub next_index:     u32,
  pub stop_requested: bool,
  pub status:         BatchStatus,
  pub started_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}
