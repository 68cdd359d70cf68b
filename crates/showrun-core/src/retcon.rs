//! Retcons — declared narrative changes and their proposed amendments.
//!
//! A change event records what shifted in the story's canon. Analysis flags
//! which locked episodes are plausibly affected; each flagged episode gets a
//! patch run carrying proposed replacement content. Runs resolve only by
//! explicit operator action (apply or reject) — never automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A declared retroactive change to the story's canon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
  pub change_event_id: Uuid,
  pub project_id:      Uuid,
  pub summary:         String,
  /// Locked episode indices flagged by analysis. `None` until analysed.
  pub affected:        Option<Vec<u32>>,
  pub created_at:      DateTime<Utc>,
}

/// Lifecycle of a patch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
  /// Created; proposal content not yet generated.
  Pending,
  /// Proposal generation in flight.
  Running,
  /// Proposal ready for operator review.
  Complete,
  /// Operator applied the proposal; the episode was re-locked.
  Applied,
  /// Operator rejected the proposal; the episode is untouched.
  Rejected,
}

impl PatchStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      PatchStatus::Pending => "pending",
      PatchStatus::Running => "running",
      PatchStatus::Complete => "complete",
      PatchStatus::Applied => "applied",
      PatchStatus::Rejected => "rejected",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(PatchStatus::Pending),
      "running" => Ok(PatchStatus::Running),
      "complete" => Ok(PatchStatus::Complete),
      "applied" => Ok(PatchStatus::Applied),
      "rejected" => Ok(PatchStatus::Rejected),
      other => Err(Error::UnknownStatus(other.to_string())),
    }
  }

  /// Applied and rejected runs are settled; nothing further happens to them.
  pub fn is_resolved(&self) -> bool {
    matches!(self, PatchStatus::Applied | PatchStatus::Rejected)
  }
}

impl std::fmt::Display for PatchStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A proposed amendment to one locked episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRun {
  pub patch_run_id:     Uuid,
  pub change_event_id:  Uuid,
  pub episode_id:       Uuid,
  pub episode_index:    u32,
  pub status:           PatchStatus,
  pub proposed_content: Option<String>,
  pub reject_reason:    Option<String>,
  pub created_at:       DateTime<Utc>,
  pub resolved_at:      Option<DateTime<Utc>>,
}
