//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Structured fields (project
//! settings, continuity metadata, id lists) are stored as compact JSON. UUIDs
//! are stored as hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use showrun_core::{
  artifact::{Artifact, ArtifactKind, ArtifactVersion},
  batch::{BatchCursor, BatchStatus},
  context::ContextSet,
  episode::{
    ContinuityNote, Episode, EpisodeStatus, EpisodeVersion, LockEvent, LockSource,
  },
  project::{Project, ProjectSettings},
  retcon::{ChangeEvent, PatchRun, PatchStatus},
  snapshot::{CanonSnapshot, SnapshotStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime ────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

// ─── Indices and id lists ────────────────────────────────────────────────────

pub fn decode_index(idx: i64) -> Result<u32> {
  u32::try_from(idx)
    .map_err(|_| showrun_core::Error::InvalidIndex(idx).into())
}

pub fn encode_uuid_list(ids: &[Uuid]) -> Result<String> {
  let strings: Vec<String> = ids.iter().copied().map(encode_uuid).collect();
  Ok(serde_json::to_string(&strings)?)
}

pub fn decode_uuid_list(s: &str) -> Result<Vec<Uuid>> {
  let strings: Vec<String> = serde_json::from_str(s)?;
  strings.iter().map(|s| decode_uuid(s)).collect()
}

pub fn encode_index_list(indices: &[u32]) -> Result<String> {
  Ok(serde_json::to_string(indices)?)
}

pub fn decode_index_list(s: &str) -> Result<Vec<u32>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Settings ────────────────────────────────────────────────────────────────

pub fn encode_settings(settings: &ProjectSettings) -> Result<String> {
  Ok(serde_json::to_string(settings)?)
}

pub fn decode_settings(s: &str) -> Result<ProjectSettings> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `projects` row.
pub struct RawProject {
  pub project_id: String,
  pub title:      String,
  pub created_at: String,
  pub settings:   String,
}

impl RawProject {
  pub const COLUMNS: &'static str = "project_id, title, created_at, settings";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      project_id: row.get(0)?,
      title:      row.get(1)?,
      created_at: row.get(2)?,
      settings:   row.get(3)?,
    })
  }

  pub fn into_project(self) -> Result<Project> {
    Ok(Project {
      project_id: decode_uuid(&self.project_id)?,
      title:      self.title,
      created_at: decode_dt(&self.created_at)?,
      settings:   decode_settings(&self.settings)?,
    })
  }
}

/// Raw strings read directly from an `artifacts` row.
pub struct RawArtifact {
  pub artifact_id: String,
  pub project_id:  String,
  pub kind:        String,
  pub name:        String,
  pub pinned:      bool,
  pub created_at:  String,
}

impl RawArtifact {
  pub const COLUMNS: &'static str =
    "artifact_id, project_id, kind, name, pinned, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      artifact_id: row.get(0)?,
      project_id:  row.get(1)?,
      kind:        row.get(2)?,
      name:        row.get(3)?,
      pinned:      row.get(4)?,
      created_at:  row.get(5)?,
    })
  }

  pub fn into_artifact(self) -> Result<Artifact> {
    Ok(Artifact {
      artifact_id: decode_uuid(&self.artifact_id)?,
      project_id:  decode_uuid(&self.project_id)?,
      kind:        ArtifactKind::parse(&self.kind),
      name:        self.name,
      pinned:      self.pinned,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `artifact_versions` row.
pub struct RawArtifactVersion {
  pub version_id:    String,
  pub artifact_id:   String,
  pub seq:           i64,
  pub content:       String,
  pub recorded_hash: Option<String>,
  pub created_at:    String,
}

impl RawArtifactVersion {
  pub const COLUMNS: &'static str =
    "version_id, artifact_id, seq, content, recorded_hash, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id:    row.get(0)?,
      artifact_id:   row.get(1)?,
      seq:           row.get(2)?,
      content:       row.get(3)?,
      recorded_hash: row.get(4)?,
      created_at:    row.get(5)?,
    })
  }

  pub fn into_version(self) -> Result<ArtifactVersion> {
    Ok(ArtifactVersion {
      version_id:    decode_uuid(&self.version_id)?,
      artifact_id:   decode_uuid(&self.artifact_id)?,
      seq:           self.seq,
      content:       self.content,
      recorded_hash: self.recorded_hash,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `context_sets` row.
pub struct RawContextSet {
  pub set_id:       String,
  pub project_id:   String,
  pub name:         String,
  pub is_default:   bool,
  pub artifact_ids: String,
  pub created_at:   String,
}

impl RawContextSet {
  pub const COLUMNS: &'static str =
    "set_id, project_id, name, is_default, artifact_ids, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      set_id:       row.get(0)?,
      project_id:   row.get(1)?,
      name:         row.get(2)?,
      is_default:   row.get(3)?,
      artifact_ids: row.get(4)?,
      created_at:   row.get(5)?,
    })
  }

  pub fn into_set(self) -> Result<ContextSet> {
    Ok(ContextSet {
      set_id:       decode_uuid(&self.set_id)?,
      project_id:   decode_uuid(&self.project_id)?,
      name:         self.name,
      is_default:   self.is_default,
      artifact_ids: decode_uuid_list(&self.artifact_ids)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `canon_snapshots` row.
pub struct RawSnapshot {
  pub snapshot_id:       String,
  pub project_id:        String,
  pub seq:               i64,
  pub fact_hash:         String,
  pub episode_count:     i64,
  pub artifact_versions: String,
  pub status:            String,
  pub created_at:        String,
}

impl RawSnapshot {
  pub const COLUMNS: &'static str = "snapshot_id, project_id, seq, fact_hash, \
                                     episode_count, artifact_versions, status, \
                                     created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id:       row.get(0)?,
      project_id:        row.get(1)?,
      seq:               row.get(2)?,
      fact_hash:         row.get(3)?,
      episode_count:     row.get(4)?,
      artifact_versions: row.get(5)?,
      status:            row.get(6)?,
      created_at:        row.get(7)?,
    })
  }

  pub fn into_snapshot(self) -> Result<CanonSnapshot> {
    Ok(CanonSnapshot {
      snapshot_id:       decode_uuid(&self.snapshot_id)?,
      project_id:        decode_uuid(&self.project_id)?,
      seq:               self.seq,
      fact_hash:         self.fact_hash,
      episode_count:     decode_index(self.episode_count)?,
      artifact_versions: decode_uuid_list(&self.artifact_versions)?,
      status:            SnapshotStatus::parse(&self.status)
        .map_err(Error::Core)?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `episodes` row.
pub struct RawEpisode {
  pub episode_id:    String,
  pub project_id:    String,
  pub snapshot_id:   String,
  pub idx:           i64,
  pub status:        String,
  pub locked_at:     Option<String>,
  pub is_template:   bool,
  pub retryable:     bool,
  pub last_error:    Option<String>,
  pub deleted_at:    Option<String>,
  pub delete_reason: Option<String>,
  pub created_at:    String,
}

impl RawEpisode {
  pub const COLUMNS: &'static str =
    "episode_id, project_id, snapshot_id, idx, status, locked_at, \
     is_template, retryable, last_error, deleted_at, delete_reason, \
     created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      episode_id:    row.get(0)?,
      project_id:    row.get(1)?,
      snapshot_id:   row.get(2)?,
      idx:           row.get(3)?,
      status:        row.get(4)?,
      locked_at:     row.get(5)?,
      is_template:   row.get(6)?,
      retryable:     row.get(7)?,
      last_error:    row.get(8)?,
      deleted_at:    row.get(9)?,
      delete_reason: row.get(10)?,
      created_at:    row.get(11)?,
    })
  }

  pub fn into_episode(self) -> Result<Episode> {
    Ok(Episode {
      episode_id:    decode_uuid(&self.episode_id)?,
      project_id:    decode_uuid(&self.project_id)?,
      snapshot_id:   decode_uuid(&self.snapshot_id)?,
      index:         decode_index(self.idx)?,
      status:        EpisodeStatus::parse(&self.status).map_err(Error::Core)?,
      locked_at:     decode_opt_dt(self.locked_at.as_deref())?,
      is_template:   self.is_template,
      retryable:     self.retryable,
      last_error:    self.last_error,
      deleted_at:    decode_opt_dt(self.deleted_at.as_deref())?,
      delete_reason: self.delete_reason,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `episode_versions` row.
pub struct RawEpisodeVersion {
  pub version_id: String,
  pub episode_id: String,
  pub seq:        i64,
  pub content:    String,
  pub created_at: String,
}

impl RawEpisodeVersion {
  pub const COLUMNS: &'static str =
    "version_id, episode_id, seq, content, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id: row.get(0)?,
      episode_id: row.get(1)?,
      seq:        row.get(2)?,
      content:    row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_version(self) -> Result<EpisodeVersion> {
    Ok(EpisodeVersion {
      version_id: decode_uuid(&self.version_id)?,
      episode_id: decode_uuid(&self.episode_id)?,
      seq:        self.seq,
      content:    self.content,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `lock_events` row.
pub struct RawLockEvent {
  pub lock_event_id: String,
  pub episode_id:    String,
  pub version_id:    String,
  pub content:       String,
  pub source:        String,
  pub patch_run_id:  Option<String>,
  pub locked_at:     String,
}

impl RawLockEvent {
  pub const COLUMNS: &'static str =
    "lock_event_id, episode_id, version_id, content, source, patch_run_id, \
     locked_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      lock_event_id: row.get(0)?,
      episode_id:    row.get(1)?,
      version_id:    row.get(2)?,
      content:       row.get(3)?,
      source:        row.get(4)?,
      patch_run_id:  row.get(5)?,
      locked_at:     row.get(6)?,
    })
  }

  pub fn into_event(self) -> Result<LockEvent> {
    Ok(LockEvent {
      lock_event_id: decode_uuid(&self.lock_event_id)?,
      episode_id:    decode_uuid(&self.episode_id)?,
      version_id:    decode_uuid(&self.version_id)?,
      content:       self.content,
      source:        LockSource::parse(&self.source).map_err(Error::Core)?,
      patch_run_id:  decode_opt_uuid(self.patch_run_id.as_deref())?,
      locked_at:     decode_dt(&self.locked_at)?,
    })
  }
}

/// Raw strings read directly from a `continuity_notes` row.
pub struct RawContinuityNote {
  pub episode_id:    String,
  pub tail_excerpt:  String,
  pub metadata:      String,
  pub lock_event_id: String,
  pub updated_at:    String,
}

impl RawContinuityNote {
  pub const COLUMNS: &'static str =
    "episode_id, tail_excerpt, metadata, lock_event_id, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      episode_id:    row.get(0)?,
      tail_excerpt:  row.get(1)?,
      metadata:      row.get(2)?,
      lock_event_id: row.get(3)?,
      updated_at:    row.get(4)?,
    })
  }

  pub fn into_note(self) -> Result<ContinuityNote> {
    Ok(ContinuityNote {
      episode_id:    decode_uuid(&self.episode_id)?,
      tail_excerpt:  self.tail_excerpt,
      metadata:      serde_json::from_str(&self.metadata)?,
      lock_event_id: decode_uuid(&self.lock_event_id)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `change_events` row.
pub struct RawChangeEvent {
  pub change_event_id: String,
  pub project_id:      String,
  pub summary:         String,
  pub affected:        Option<String>,
  pub created_at:      String,
}

impl RawChangeEvent {
  pub const COLUMNS: &'static str =
    "change_event_id, project_id, summary, affected, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      change_event_id: row.get(0)?,
      project_id:      row.get(1)?,
      summary:         row.get(2)?,
      affected:        row.get(3)?,
      created_at:      row.get(4)?,
    })
  }

  pub fn into_event(self) -> Result<ChangeEvent> {
    Ok(ChangeEvent {
      change_event_id: decode_uuid(&self.change_event_id)?,
      project_id:      decode_uuid(&self.project_id)?,
      summary:         self.summary,
      affected:        self.affected.as_deref().map(decode_index_list).transpose()?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `patch_runs` row.
pub struct RawPatchRun {
  pub patch_run_id:     String,
  pub change_event_id:  String,
  pub episode_id:       String,
  pub episode_idx:      i64,
  pub status:           String,
  pub proposed_content: Option<String>,
  pub reject_reason:    Option<String>,
  pub created_at:       String,
  pub resolved_at:      Option<String>,
}

impl RawPatchRun {
  pub const COLUMNS: &'static str =
    "patch_run_id, change_event_id, episode_id, episode_idx, status, \
     proposed_content, reject_reason, created_at, resolved_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      patch_run_id:     row.get(0)?,
      change_event_id:  row.get(1)?,
      episode_id:       row.get(2)?,
      episode_idx:      row.get(3)?,
      status:           row.get(4)?,
      proposed_content: row.get(5)?,
      reject_reason:    row.get(6)?,
      created_at:       row.get(7)?,
      resolved_at:      row.get(8)?,
    })
  }

  pub fn into_run(self) -> Result<PatchRun> {
    Ok(PatchRun {
      patch_run_id:     decode_uuid(&self.patch_run_id)?,
      change_event_id:  decode_uuid(&self.change_event_id)?,
      episode_id:       decode_uuid(&self.episode_id)?,
      episode_index:    decode_index(self.episode_idx)?,
      status:           PatchStatus::parse(&self.status).map_err(Error::Core)?,
      proposed_content: self.proposed_content,
      reject_reason:    self.reject_reason,
      created_at:       decode_dt(&self.created_at)?,
      resolved_at:      decode_opt_dt(self.resolved_at.as_deref())?,
    })
  }
}

/// Raw strings read directly from a `batch_cursors` row.
pub struct RawBatchCursor {
  pub project_id:     String,
  pub next_idx:       i64,
  pub stop_requested: bool,
  pub status:         String,
  pub started_at:     String,
  pub updated_at:     String,
}

impl RawBatchCursor {
  pub const COLUMNS: &'static str =
    "project_id, next_idx, stop_requested, status, started_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      project_id:     row.get(0)?,
      next_idx:       row.get(1)?,
      stop_requested: row.get(2)?,
      status:         row.get(3)?,
      started_at:     row.get(4)?,
      updated_at:     row.get(5)?,
    })
  }

  pub fn into_cursor(self) -> Result<BatchCursor> {
    Ok(BatchCursor {
      project_id:     decode_uuid(&self.project_id)?,
      next_index:     decode_index(self.next_idx)?,
      stop_requested: self.stop_requested,
      status:         BatchStatus::parse(&self.status).map_err(Error::Core)?,
      started_at:     decode_dt(&self.started_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}
