//! Canon snapshots — immutable anchors for generation runs.
//!
//! A snapshot binds the resolver hash to the artifact versions in context at
//! creation time. Exactly one snapshot per project is `active`; creating a
//! new one supersedes the old atomically. Superseded snapshots are kept for
//! audit, never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
  Active,
  Superseded,
}

impl SnapshotStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      SnapshotStatus::Active => "active",
      SnapshotStatus::Superseded => "superseded",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "active" => Ok(SnapshotStatus::Active),
      "superseded" => Ok(SnapshotStatus::Superseded),
      other => Err(Error::UnknownStatus(other.to_string())),
    }
  }
}

/// An immutable reference bundle: fact hash plus the artifact versions a
/// generation run reads. `seq` increases monotonically per project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonSnapshot {
  pub snapshot_id:       Uuid,
  pub project_id:        Uuid,
  pub seq:               i64,
  pub fact_hash:         String,
  pub episode_count:     u32,
  pub artifact_versions: Vec<Uuid>,
  pub status:            SnapshotStatus,
  pub created_at:        DateTime<Utc>,
}

impl CanonSnapshot {
  /// A snapshot is valid while its recorded hash still matches the
  /// resolver's current hash.
  pub fn is_valid(&self, current_hash: &str) -> bool {
    self.fact_hash == current_hash
  }
}
