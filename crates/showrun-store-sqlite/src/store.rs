//! [`SqliteStore`] — the SQLite implementation of [`PipelineStore`].
//!
//! Conditional transitions are single `UPDATE … WHERE` statements that name
//! the expected current state; when no row matched, the current row is read
//! back inside the same call so the conflict error can say what the state
//! actually was. Multi-statement operations (snapshot supersession, template
//! moves, purges) run inside one transaction.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use showrun_core::{
  artifact::{Artifact, ArtifactKind, ArtifactVersion, ArtifactWithLatest},
  batch::{BatchCursor, BatchStatus},
  context::{ContextSet, NewContextSet},
  episode::{
    ContinuityNote, Episode, EpisodeStatus, EpisodeVersion, LockEvent,
    NewLockEvent,
  },
  project::{NewProject, Project, ProjectSettings},
  retcon::{ChangeEvent, PatchRun, PatchStatus},
  snapshot::{CanonSnapshot, SnapshotStatus},
  store::PipelineStore,
};

use crate::{
  encode::{
    RawArtifact, RawArtifactVersion, RawBatchCursor, RawChangeEvent,
    RawContextSet, RawContinuityNote, RawEpisode, RawEpisodeVersion,
    RawLockEvent, RawPatchRun, RawProject, RawSnapshot, decode_index,
    encode_dt, encode_index_list, encode_settings, encode_uuid,
    encode_uuid_list,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A showrun pipeline store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Closure-side helpers ────────────────────────────────────────────────────
//
// Free functions so they can be called from inside `conn.call` closures.

fn select_project(
  conn: &rusqlite::Connection,
  project_id: &str,
) -> rusqlite::Result<Option<RawProject>> {
  conn
    .query_row(
      &format!(
        "SELECT {} FROM projects WHERE project_id = ?1",
        RawProject::COLUMNS
      ),
      rusqlite::params![project_id],
      RawProject::from_row,
    )
    .optional()
}

fn select_episode(
  conn: &rusqlite::Connection,
  episode_id: &str,
) -> rusqlite::Result<Option<RawEpisode>> {
  conn
    .query_row(
      &format!(
        "SELECT {} FROM episodes WHERE episode_id = ?1",
        RawEpisode::COLUMNS
      ),
      rusqlite::params![episode_id],
      RawEpisode::from_row,
    )
    .optional()
}

fn select_patch_run(
  conn: &rusqlite::Connection,
  patch_run_id: &str,
) -> rusqlite::Result<Option<RawPatchRun>> {
  conn
    .query_row(
      &format!(
        "SELECT {} FROM patch_runs WHERE patch_run_id = ?1",
        RawPatchRun::COLUMNS
      ),
      rusqlite::params![patch_run_id],
      RawPatchRun::from_row,
    )
    .optional()
}

fn select_cursor(
  conn: &rusqlite::Connection,
  project_id: &str,
) -> rusqlite::Result<Option<RawBatchCursor>> {
  conn
    .query_row(
      &format!(
        "SELECT {} FROM batch_cursors WHERE project_id = ?1",
        RawBatchCursor::COLUMNS
      ),
      rusqlite::params![project_id],
      RawBatchCursor::from_row,
    )
    .optional()
}

/// Map a failed conditional episode update to a precise error.
fn episode_cas_error(
  episode_id: Uuid,
  expected: &'static str,
  raw: Option<RawEpisode>,
) -> Error {
  match raw {
    None => Error::EpisodeNotFound(episode_id),
    Some(raw) if raw.deleted_at.is_some() => Error::AlreadyDeleted(episode_id),
    Some(raw) => Error::EpisodeConflict {
      episode_id,
      expected,
      actual: raw.status,
    },
  }
}

/// Map a failed conditional patch-run update to a precise error.
fn patch_cas_error(
  patch_run_id: Uuid,
  expected: &'static str,
  raw: Option<RawPatchRun>,
) -> Error {
  match raw {
    None => Error::PatchRunNotFound(patch_run_id),
    Some(raw) => Error::PatchConflict {
      patch_run_id,
      expected,
      actual: raw.status,
    },
  }
}

// ─── PipelineStore impl ──────────────────────────────────────────────────────

impl PipelineStore for SqliteStore {
  type Error = Error;

  // ── Projects ──────────────────────────────────────────────────────────────

  async fn add_project(&self, input: NewProject) -> Result<Project> {
    let project = Project {
      project_id: Uuid::new_v4(),
      title:      input.title,
      created_at: Utc::now(),
      settings:   input.settings,
    };

    let id_str       = encode_uuid(project.project_id);
    let title        = project.title.clone();
    let at_str       = encode_dt(project.created_at);
    let settings_str = encode_settings(&project.settings)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO projects (project_id, title, created_at, settings)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, title, at_str, settings_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(project)
  }

  async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawProject> = self
      .conn
      .call(move |conn| Ok(select_project(conn, &id_str)?))
      .await?;

    raw.map(RawProject::into_project).transpose()
  }

  async fn list_projects(&self) -> Result<Vec<Project>> {
    let raws: Vec<RawProject> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM projects ORDER BY created_at",
          RawProject::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawProject::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProject::into_project).collect()
  }

  async fn update_settings(
    &self,
    id: Uuid,
    settings: ProjectSettings,
  ) -> Result<Project> {
    let id_str       = encode_uuid(id);
    let settings_str = encode_settings(&settings)?;

    let raw: Option<RawProject> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE projects SET settings = ?2 WHERE project_id = ?1",
          rusqlite::params![id_str, settings_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(select_project(conn, &id_str)?)
      })
      .await?;

    raw
      .ok_or(Error::ProjectNotFound(id))
      .and_then(RawProject::into_project)
  }

  // ── Artifacts ─────────────────────────────────────────────────────────────

  async fn upsert_artifact(
    &self,
    project_id: Uuid,
    kind: ArtifactKind,
    name: String,
  ) -> Result<Artifact> {
    let project_str = encode_uuid(project_id);
    let kind_str    = kind.as_str().to_owned();
    let new_id_str  = encode_uuid(Uuid::new_v4());
    let at_str      = encode_dt(Utc::now());
    let name_owned  = name.clone();

    let raw: RawArtifact = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let existing = tx
          .query_row(
            &format!(
              "SELECT {} FROM artifacts
               WHERE project_id = ?1 AND kind = ?2 AND name = ?3",
              RawArtifact::COLUMNS
            ),
            rusqlite::params![project_str, kind_str, name_owned],
            RawArtifact::from_row,
          )
          .optional()?;

        if let Some(found) = existing {
          return Ok(found);
        }

        tx.execute(
          "INSERT INTO artifacts (artifact_id, project_id, kind, name, pinned, created_at)
           VALUES (?1, ?2, ?3, ?4, 0, ?5)",
          rusqlite::params![new_id_str, project_str, kind_str, name_owned, at_str],
        )?;

        let inserted = tx.query_row(
          &format!(
            "SELECT {} FROM artifacts WHERE artifact_id = ?1",
            RawArtifact::COLUMNS
          ),
          rusqlite::params![new_id_str],
          RawArtifact::from_row,
        )?;
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    raw.into_artifact()
  }

  async fn add_artifact_version(
    &self,
    artifact_id: Uuid,
    content: String,
    recorded_hash: Option<String>,
  ) -> Result<ArtifactVersion> {
    let version = ArtifactVersion {
      version_id: Uuid::new_v4(),
      artifact_id,
      seq: 0, // assigned below
      content,
      recorded_hash,
      created_at: Utc::now(),
    };

    let id_str       = encode_uuid(version.version_id);
    let artifact_str = encode_uuid(artifact_id);
    let content_str  = version.content.clone();
    let hash_str     = version.recorded_hash.clone();
    let at_str       = encode_dt(version.created_at);

    let seq: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM artifacts WHERE artifact_id = ?1",
            rusqlite::params![artifact_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(None);
        }

        let seq: i64 = tx.query_row(
          "SELECT COALESCE(MAX(seq), 0) + 1 FROM artifact_versions
           WHERE artifact_id = ?1",
          rusqlite::params![artifact_str],
          |r| r.get(0),
        )?;
        tx.execute(
          "INSERT INTO artifact_versions
             (version_id, artifact_id, seq, content, recorded_hash, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, artifact_str, seq, content_str, hash_str, at_str],
        )?;
        tx.commit()?;
        Ok(Some(seq))
      })
      .await?;

    let seq = seq.ok_or(Error::ArtifactNotFound(artifact_id))?;
    Ok(ArtifactVersion { seq, ..version })
  }

  async fn get_artifact(&self, artifact_id: Uuid) -> Result<Option<Artifact>> {
    let id_str = encode_uuid(artifact_id);

    let raw: Option<RawArtifact> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM artifacts WHERE artifact_id = ?1",
                RawArtifact::COLUMNS
              ),
              rusqlite::params![id_str],
              RawArtifact::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawArtifact::into_artifact).transpose()
  }

  async fn get_artifact_version(
    &self,
    version_id: Uuid,
  ) -> Result<Option<ArtifactVersion>> {
    let id_str = encode_uuid(version_id);

    let raw: Option<RawArtifactVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM artifact_versions WHERE version_id = ?1",
                RawArtifactVersion::COLUMNS
              ),
              rusqlite::params![id_str],
              RawArtifactVersion::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawArtifactVersion::into_version).transpose()
  }

  async fn artifact_versions(
    &self,
    artifact_id: Uuid,
  ) -> Result<Vec<ArtifactVersion>> {
    let id_str = encode_uuid(artifact_id);

    let raws: Vec<RawArtifactVersion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM artifact_versions WHERE artifact_id = ?1 ORDER BY seq",
          RawArtifactVersion::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawArtifactVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawArtifactVersion::into_version)
      .collect()
  }

  async fn list_artifacts(
    &self,
    project_id: Uuid,
  ) -> Result<Vec<ArtifactWithLatest>> {
    let project_str = encode_uuid(project_id);

    let raws: Vec<(RawArtifact, Option<RawArtifactVersion>)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT
             a.artifact_id, a.project_id, a.kind, a.name, a.pinned, a.created_at,
             v.version_id, v.artifact_id, v.seq, v.content, v.recorded_hash,
             v.created_at
           FROM artifacts a
           LEFT JOIN artifact_versions v
             ON v.artifact_id = a.artifact_id
            AND v.seq = (SELECT MAX(seq) FROM artifact_versions
                         WHERE artifact_id = a.artifact_id)
           WHERE a.project_id = ?1
           ORDER BY a.kind, a.name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![project_str], |row| {
            let artifact = RawArtifact {
              artifact_id: row.get(0)?,
              project_id:  row.get(1)?,
              kind:        row.get(2)?,
              name:        row.get(3)?,
              pinned:      row.get(4)?,
              created_at:  row.get(5)?,
            };
            let version_id: Option<String> = row.get(6)?;
            let latest = match version_id {
              Some(version_id) => Some(RawArtifactVersion {
                version_id,
                artifact_id:   row.get(7)?,
                seq:           row.get(8)?,
                content:       row.get(9)?,
                recorded_hash: row.get(10)?,
                created_at:    row.get(11)?,
              }),
              None => None,
            };
            Ok((artifact, latest))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(artifact, latest)| {
        Ok(ArtifactWithLatest {
          artifact: artifact.into_artifact()?,
          latest:   latest.map(RawArtifactVersion::into_version).transpose()?,
        })
      })
      .collect()
  }

  async fn set_artifact_pinned(
    &self,
    artifact_id: Uuid,
    pinned: bool,
  ) -> Result<Artifact> {
    let id_str = encode_uuid(artifact_id);

    let raw: Option<RawArtifact> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE artifacts SET pinned = ?2 WHERE artifact_id = ?1",
          rusqlite::params![id_str, pinned],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM artifacts WHERE artifact_id = ?1",
                RawArtifact::COLUMNS
              ),
              rusqlite::params![id_str],
              RawArtifact::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .ok_or(Error::ArtifactNotFound(artifact_id))
      .and_then(RawArtifact::into_artifact)
  }

  // ── Context sets ──────────────────────────────────────────────────────────

  async fn save_context_set(&self, input: NewContextSet) -> Result<ContextSet> {
    let project_str = encode_uuid(input.project_id);
    let name        = input.name.clone();
    let ids_str     = encode_uuid_list(&input.artifact_ids)?;
    let is_default  = input.is_default;
    let new_id_str  = encode_uuid(Uuid::new_v4());
    let at_str      = encode_dt(Utc::now());

    let raw: RawContextSet = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if is_default {
          tx.execute(
            "UPDATE context_sets SET is_default = 0
             WHERE project_id = ?1 AND is_default = 1 AND name != ?2",
            rusqlite::params![project_str, name],
          )?;
        }

        let existing: Option<String> = tx
          .query_row(
            "SELECT set_id FROM context_sets WHERE project_id = ?1 AND name = ?2",
            rusqlite::params![project_str, name],
            |r| r.get(0),
          )
          .optional()?;

        match existing {
          Some(set_id) => {
            tx.execute(
              "UPDATE context_sets SET is_default = ?2, artifact_ids = ?3
               WHERE set_id = ?1",
              rusqlite::params![set_id, is_default, ids_str],
            )?;
          }
          None => {
            tx.execute(
              "INSERT INTO context_sets
                 (set_id, project_id, name, is_default, artifact_ids, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
              rusqlite::params![new_id_str, project_str, name, is_default, ids_str, at_str],
            )?;
          }
        }

        let saved = tx.query_row(
          &format!(
            "SELECT {} FROM context_sets WHERE project_id = ?1 AND name = ?2",
            RawContextSet::COLUMNS
          ),
          rusqlite::params![project_str, name],
          RawContextSet::from_row,
        )?;
        tx.commit()?;
        Ok(saved)
      })
      .await?;

    raw.into_set()
  }

  async fn default_context_set(
    &self,
    project_id: Uuid,
  ) -> Result<Option<ContextSet>> {
    let project_str = encode_uuid(project_id);

    let raw: Option<RawContextSet> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM context_sets
                 WHERE project_id = ?1 AND is_default = 1",
                RawContextSet::COLUMNS
              ),
              rusqlite::params![project_str],
              RawContextSet::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawContextSet::into_set).transpose()
  }

  async fn list_context_sets(&self, project_id: Uuid) -> Result<Vec<ContextSet>> {
    let project_str = encode_uuid(project_id);

    let raws: Vec<RawContextSet> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM context_sets WHERE project_id = ?1 ORDER BY name",
          RawContextSet::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![project_str], RawContextSet::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawContextSet::into_set).collect()
  }

  // ── Canon snapshots ───────────────────────────────────────────────────────

  async fn create_snapshot(
    &self,
    project_id: Uuid,
    fact_hash: String,
    episode_count: u32,
    artifact_versions: Vec<Uuid>,
  ) -> Result<CanonSnapshot> {
    let snapshot_id = Uuid::new_v4();
    let created_at  = Utc::now();

    let project_str   = encode_uuid(project_id);
    let id_str        = encode_uuid(snapshot_id);
    let hash          = fact_hash.clone();
    let count         = i64::from(episode_count);
    let versions_json = encode_uuid_list(&artifact_versions)?;
    let at_str        = encode_dt(created_at);

    let seq: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM projects WHERE project_id = ?1",
            rusqlite::params![project_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(None);
        }

        tx.execute(
          "UPDATE canon_snapshots SET status = 'superseded'
           WHERE project_id = ?1 AND status = 'active'",
          rusqlite::params![project_str],
        )?;

        let seq: i64 = tx.query_row(
          "SELECT COALESCE(MAX(seq), 0) + 1 FROM canon_snapshots
           WHERE project_id = ?1",
          rusqlite::params![project_str],
          |r| r.get(0),
        )?;

        tx.execute(
          "INSERT INTO canon_snapshots
             (snapshot_id, project_id, seq, fact_hash, episode_count,
              artifact_versions, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7)",
          rusqlite::params![id_str, project_str, seq, hash, count, versions_json, at_str],
        )?;

        // Rebind every non-locked, non-deleted episode to the new canon.
        // Invalidated episodes become generatable again; other statuses are
        // kept so the operator can still judge content produced under the
        // old canon. Locked episodes stay bound to the snapshot they were
        // locked under.
        tx.execute(
          "UPDATE episodes
           SET snapshot_id = ?1,
               status = CASE WHEN status = 'invalidated' THEN 'pending'
                             ELSE status END
           WHERE project_id = ?2 AND locked_at IS NULL AND deleted_at IS NULL",
          rusqlite::params![id_str, project_str],
        )?;

        tx.commit()?;
        Ok(Some(seq))
      })
      .await?;

    let seq = seq.ok_or(Error::ProjectNotFound(project_id))?;
    Ok(CanonSnapshot {
      snapshot_id,
      project_id,
      seq,
      fact_hash,
      episode_count,
      artifact_versions,
      status: SnapshotStatus::Active,
      created_at,
    })
  }

  async fn active_snapshot(
    &self,
    project_id: Uuid,
  ) -> Result<Option<CanonSnapshot>> {
    let project_str = encode_uuid(project_id);

    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM canon_snapshots
                 WHERE project_id = ?1 AND status = 'active'",
                RawSnapshot::COLUMNS
              ),
              rusqlite::params![project_str],
              RawSnapshot::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSnapshot::into_snapshot).transpose()
  }

  async fn get_snapshot(
    &self,
    snapshot_id: Uuid,
  ) -> Result<Option<CanonSnapshot>> {
    let id_str = encode_uuid(snapshot_id);

    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM canon_snapshots WHERE snapshot_id = ?1",
                RawSnapshot::COLUMNS
              ),
              rusqlite::params![id_str],
              RawSnapshot::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSnapshot::into_snapshot).transpose()
  }

  async fn list_snapshots(&self, project_id: Uuid) -> Result<Vec<CanonSnapshot>> {
    let project_str = encode_uuid(project_id);

    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM canon_snapshots WHERE project_id = ?1 ORDER BY seq DESC",
          RawSnapshot::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![project_str], RawSnapshot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  // ── Episodes ──────────────────────────────────────────────────────────────

  async fn append_episodes(
    &self,
    project_id: Uuid,
    snapshot_id: Uuid,
    count: u32,
  ) -> Result<Vec<Episode>> {
    let created_at = Utc::now();
    let episode_ids: Vec<Uuid> = (0..count).map(|_| Uuid::new_v4()).collect();

    let project_str  = encode_uuid(project_id);
    let snapshot_str = encode_uuid(snapshot_id);
    let at_str       = encode_dt(created_at);
    let id_strs: Vec<String> =
      episode_ids.iter().copied().map(encode_uuid).collect();

    let base: i64 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Indices continue after the highest ever used, soft-deleted rows
        // included, so an index is never reissued.
        let base: i64 = tx.query_row(
          "SELECT COALESCE(MAX(idx), 0) FROM episodes WHERE project_id = ?1",
          rusqlite::params![project_str],
          |r| r.get(0),
        )?;

        for (offset, id_str) in id_strs.iter().enumerate() {
          tx.execute(
            "INSERT INTO episodes
               (episode_id, project_id, snapshot_id, idx, status, locked_at,
                is_template, retryable, last_error, deleted_at, delete_reason,
                created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', NULL, 0, 1, NULL, NULL, NULL, ?5)",
            rusqlite::params![
              id_str,
              project_str,
              snapshot_str,
              base + 1 + offset as i64,
              at_str,
            ],
          )?;
        }

        tx.commit()?;
        Ok(base)
      })
      .await?;

    let base = decode_index(base)?;
    let episodes = episode_ids
      .into_iter()
      .enumerate()
      .map(|(offset, episode_id)| Episode {
        episode_id,
        project_id,
        snapshot_id,
        index: base + 1 + offset as u32,
        status: EpisodeStatus::Pending,
        locked_at: None,
        is_template: false,
        retryable: true,
        last_error: None,
        deleted_at: None,
        delete_reason: None,
        created_at,
      })
      .collect();

    Ok(episodes)
  }

  async fn get_episode(
    &self,
    project_id: Uuid,
    index: u32,
  ) -> Result<Option<Episode>> {
    let project_str = encode_uuid(project_id);
    let idx         = i64::from(index);

    let raw: Option<RawEpisode> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM episodes WHERE project_id = ?1 AND idx = ?2",
                RawEpisode::COLUMNS
              ),
              rusqlite::params![project_str, idx],
              RawEpisode::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEpisode::into_episode).transpose()
  }

  async fn get_episode_by_id(&self, episode_id: Uuid) -> Result<Option<Episode>> {
    let id_str = encode_uuid(episode_id);

    let raw: Option<RawEpisode> = self
      .conn
      .call(move |conn| Ok(select_episode(conn, &id_str)?))
      .await?;

    raw.map(RawEpisode::into_episode).transpose()
  }

  async fn list_episodes(
    &self,
    project_id: Uuid,
    include_deleted: bool,
  ) -> Result<Vec<Episode>> {
    let project_str = encode_uuid(project_id);

    let raws: Vec<RawEpisode> = self
      .conn
      .call(move |conn| {
        let sql = if include_deleted {
          format!(
            "SELECT {} FROM episodes WHERE project_id = ?1 ORDER BY idx",
            RawEpisode::COLUMNS
          )
        } else {
          format!(
            "SELECT {} FROM episodes
             WHERE project_id = ?1 AND deleted_at IS NULL
             ORDER BY idx",
            RawEpisode::COLUMNS
          )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![project_str], RawEpisode::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEpisode::into_episode).collect()
  }

  async fn template_episode(&self, project_id: Uuid) -> Result<Option<Episode>> {
    let project_str = encode_uuid(project_id);

    let raw: Option<RawEpisode> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM episodes
                 WHERE project_id = ?1 AND is_template = 1 AND deleted_at IS NULL",
                RawEpisode::COLUMNS
              ),
              rusqlite::params![project_str],
              RawEpisode::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEpisode::into_episode).transpose()
  }

  async fn begin_generating(&self, episode_id: Uuid) -> Result<Episode> {
    let id_str = encode_uuid(episode_id);

    let (changed, raw): (usize, Option<RawEpisode>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE episodes SET status = 'generating', last_error = NULL
           WHERE episode_id = ?1 AND deleted_at IS NULL
             AND status IN ('pending', 'complete', 'needs_revision', 'error')",
          rusqlite::params![id_str],
        )?;
        Ok((changed, select_episode(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_episode(),
      other => Err(episode_cas_error(
        episode_id,
        "pending, complete, needs_revision, or error",
        other,
      )),
    }
  }

  async fn complete_episode(
    &self,
    episode_id: Uuid,
    status: EpisodeStatus,
    note: Option<String>,
  ) -> Result<Episode> {
    debug_assert!(matches!(
      status,
      EpisodeStatus::Complete | EpisodeStatus::NeedsRevision
    ));

    let id_str     = encode_uuid(episode_id);
    let status_str = status.as_str();

    let (changed, raw): (usize, Option<RawEpisode>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE episodes SET status = ?2, last_error = ?3
           WHERE episode_id = ?1 AND status = 'generating'",
          rusqlite::params![id_str, status_str, note],
        )?;
        Ok((changed, select_episode(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_episode(),
      other => Err(episode_cas_error(episode_id, "generating", other)),
    }
  }

  async fn fail_episode(
    &self,
    episode_id: Uuid,
    reason: String,
    retryable: bool,
  ) -> Result<Episode> {
    let id_str = encode_uuid(episode_id);

    let (changed, raw): (usize, Option<RawEpisode>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE episodes SET status = 'error', last_error = ?2, retryable = ?3
           WHERE episode_id = ?1 AND status = 'generating'",
          rusqlite::params![id_str, reason, retryable],
        )?;
        Ok((changed, select_episode(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_episode(),
      other => Err(episode_cas_error(episode_id, "generating", other)),
    }
  }

  async fn invalidate_unlocked(&self, project_id: Uuid) -> Result<u64> {
    let project_str = encode_uuid(project_id);

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE episodes SET status = 'invalidated'
           WHERE project_id = ?1 AND locked_at IS NULL AND deleted_at IS NULL
             AND status != 'invalidated'",
          rusqlite::params![project_str],
        )?)
      })
      .await?;

    Ok(changed as u64)
  }

  async fn mark_locked(&self, episode_id: Uuid) -> Result<Episode> {
    let id_str = encode_uuid(episode_id);
    let at_str = encode_dt(Utc::now());

    let (changed, raw): (usize, Option<RawEpisode>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE episodes SET status = 'locked', locked_at = ?2
           WHERE episode_id = ?1 AND locked_at IS NULL AND deleted_at IS NULL
             AND status IN ('complete', 'needs_revision')",
          rusqlite::params![id_str, at_str],
        )?;
        Ok((changed, select_episode(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_episode(),
      other => Err(episode_cas_error(
        episode_id,
        "complete or needs_revision, not yet locked",
        other,
      )),
    }
  }

  async fn set_template(
    &self,
    project_id: Uuid,
    episode_id: Uuid,
  ) -> Result<Episode> {
    let project_str = encode_uuid(project_id);
    let id_str      = encode_uuid(episode_id);

    // 0 = ok, 1 = not found, 2 = not locked.
    let (verdict, raw): (u8, Option<RawEpisode>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let target = match select_episode(&tx, &id_str)? {
          Some(raw) => raw,
          None => return Ok((1, None)),
        };
        if target.locked_at.is_none() || target.deleted_at.is_some() {
          return Ok((2, Some(target)));
        }

        // Clear-then-set inside one transaction; the partial unique index
        // never observes two templates.
        tx.execute(
          "UPDATE episodes SET is_template = 0
           WHERE project_id = ?1 AND is_template = 1 AND episode_id != ?2",
          rusqlite::params![project_str, id_str],
        )?;
        tx.execute(
          "UPDATE episodes SET is_template = 1 WHERE episode_id = ?1",
          rusqlite::params![id_str],
        )?;

        let updated = select_episode(&tx, &id_str)?;
        tx.commit()?;
        Ok((0, updated))
      })
      .await?;

    match (verdict, raw) {
      (0, Some(raw)) => raw.into_episode(),
      (2, _) => Err(Error::NotLocked(episode_id)),
      _ => Err(Error::EpisodeNotFound(episode_id)),
    }
  }

  async fn soft_delete_episode(
    &self,
    episode_id: Uuid,
    reason: Option<String>,
  ) -> Result<Episode> {
    let id_str = encode_uuid(episode_id);
    let at_str = encode_dt(Utc::now());

    let (changed, raw): (usize, Option<RawEpisode>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE episodes SET deleted_at = ?2, delete_reason = ?3
           WHERE episode_id = ?1 AND deleted_at IS NULL",
          rusqlite::params![id_str, at_str, reason],
        )?;
        Ok((changed, select_episode(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_episode(),
      Some(_) => Err(Error::AlreadyDeleted(episode_id)),
      None => Err(Error::EpisodeNotFound(episode_id)),
    }
  }

  async fn restore_episode(&self, episode_id: Uuid) -> Result<Episode> {
    let id_str = encode_uuid(episode_id);

    let (changed, raw): (usize, Option<RawEpisode>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE episodes SET deleted_at = NULL, delete_reason = NULL
           WHERE episode_id = ?1 AND deleted_at IS NOT NULL",
          rusqlite::params![id_str],
        )?;
        Ok((changed, select_episode(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_episode(),
      Some(_) => Err(Error::NotDeleted(episode_id)),
      None => Err(Error::EpisodeNotFound(episode_id)),
    }
  }

  async fn purge_episode(&self, episode_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(episode_id);

    let found: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM episodes WHERE episode_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(false);
        }

        // Child rows first, respecting foreign keys: the continuity note
        // references a lock event, lock events reference versions.
        tx.execute(
          "DELETE FROM continuity_notes WHERE episode_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM patch_runs WHERE episode_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM lock_events WHERE episode_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM episode_versions WHERE episode_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM episodes WHERE episode_id = ?1",
          rusqlite::params![id_str],
        )?;

        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::EpisodeNotFound(episode_id));
    }
    Ok(())
  }

  // ── Episode content versions ──────────────────────────────────────────────

  async fn add_episode_version(
    &self,
    episode_id: Uuid,
    content: String,
  ) -> Result<EpisodeVersion> {
    let version = EpisodeVersion {
      version_id: Uuid::new_v4(),
      episode_id,
      seq: 0, // assigned below
      content,
      created_at: Utc::now(),
    };

    let id_str      = encode_uuid(version.version_id);
    let episode_str = encode_uuid(episode_id);
    let content_str = version.content.clone();
    let at_str      = encode_dt(version.created_at);

    let seq: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM episodes WHERE episode_id = ?1",
            rusqlite::params![episode_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(None);
        }

        let seq: i64 = tx.query_row(
          "SELECT COALESCE(MAX(seq), 0) + 1 FROM episode_versions
           WHERE episode_id = ?1",
          rusqlite::params![episode_str],
          |r| r.get(0),
        )?;
        tx.execute(
          "INSERT INTO episode_versions
             (version_id, episode_id, seq, content, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, episode_str, seq, content_str, at_str],
        )?;
        tx.commit()?;
        Ok(Some(seq))
      })
      .await?;

    let seq = seq.ok_or(Error::EpisodeNotFound(episode_id))?;
    Ok(EpisodeVersion { seq, ..version })
  }

  async fn episode_versions(&self, episode_id: Uuid) -> Result<Vec<EpisodeVersion>> {
    let id_str = encode_uuid(episode_id);

    let raws: Vec<RawEpisodeVersion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM episode_versions WHERE episode_id = ?1 ORDER BY seq",
          RawEpisodeVersion::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawEpisodeVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawEpisodeVersion::into_version)
      .collect()
  }

  async fn latest_episode_version(
    &self,
    episode_id: Uuid,
  ) -> Result<Option<EpisodeVersion>> {
    let id_str = encode_uuid(episode_id);

    let raw: Option<RawEpisodeVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM episode_versions WHERE episode_id = ?1
                 ORDER BY seq DESC LIMIT 1",
                RawEpisodeVersion::COLUMNS
              ),
              rusqlite::params![id_str],
              RawEpisodeVersion::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEpisodeVersion::into_version).transpose()
  }

  // ── Lock events and continuity ────────────────────────────────────────────

  async fn insert_lock_event(&self, input: NewLockEvent) -> Result<LockEvent> {
    let event = LockEvent {
      lock_event_id: Uuid::new_v4(),
      episode_id:    input.episode_id,
      version_id:    input.version_id,
      content:       input.content,
      source:        input.source,
      patch_run_id:  input.patch_run_id,
      locked_at:     Utc::now(),
    };

    let id_str       = encode_uuid(event.lock_event_id);
    let episode_str  = encode_uuid(event.episode_id);
    let version_str  = encode_uuid(event.version_id);
    let content_str  = event.content.clone();
    let source_str   = event.source.as_str();
    let patch_str    = event.patch_run_id.map(encode_uuid);
    let at_str       = encode_dt(event.locked_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO lock_events
             (lock_event_id, episode_id, version_id, content, source,
              patch_run_id, locked_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            episode_str,
            version_str,
            content_str,
            source_str,
            patch_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  async fn lock_events(&self, episode_id: Uuid) -> Result<Vec<LockEvent>> {
    let id_str = encode_uuid(episode_id);

    let raws: Vec<RawLockEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM lock_events WHERE episode_id = ?1 ORDER BY locked_at",
          RawLockEvent::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawLockEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLockEvent::into_event).collect()
  }

  async fn latest_lock_event(&self, episode_id: Uuid) -> Result<Option<LockEvent>> {
    let id_str = encode_uuid(episode_id);

    let raw: Option<RawLockEvent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM lock_events WHERE episode_id = ?1
                 ORDER BY locked_at DESC LIMIT 1",
                RawLockEvent::COLUMNS
              ),
              rusqlite::params![id_str],
              RawLockEvent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawLockEvent::into_event).transpose()
  }

  async fn upsert_continuity_note(
    &self,
    note: ContinuityNote,
  ) -> Result<ContinuityNote> {
    let episode_str = encode_uuid(note.episode_id);
    let excerpt     = note.tail_excerpt.clone();
    let meta_str    = serde_json::to_string(&note.metadata)?;
    let event_str   = encode_uuid(note.lock_event_id);
    let at_str      = encode_dt(note.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO continuity_notes
             (episode_id, tail_excerpt, metadata, lock_event_id, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(episode_id) DO UPDATE SET
             tail_excerpt  = excluded.tail_excerpt,
             metadata      = excluded.metadata,
             lock_event_id = excluded.lock_event_id,
             updated_at    = excluded.updated_at",
          rusqlite::params![episode_str, excerpt, meta_str, event_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(note)
  }

  async fn continuity_note(&self, episode_id: Uuid) -> Result<Option<ContinuityNote>> {
    let id_str = encode_uuid(episode_id);

    let raw: Option<RawContinuityNote> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM continuity_notes WHERE episode_id = ?1",
                RawContinuityNote::COLUMNS
              ),
              rusqlite::params![id_str],
              RawContinuityNote::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawContinuityNote::into_note).transpose()
  }

  // ── Retcons ───────────────────────────────────────────────────────────────

  async fn insert_change_event(
    &self,
    project_id: Uuid,
    summary: String,
  ) -> Result<ChangeEvent> {
    let event = ChangeEvent {
      change_event_id: Uuid::new_v4(),
      project_id,
      summary,
      affected: None,
      created_at: Utc::now(),
    };

    let id_str      = encode_uuid(event.change_event_id);
    let project_str = encode_uuid(project_id);
    let summary_str = event.summary.clone();
    let at_str      = encode_dt(event.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO change_events
             (change_event_id, project_id, summary, affected, created_at)
           VALUES (?1, ?2, ?3, NULL, ?4)",
          rusqlite::params![id_str, project_str, summary_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  async fn get_change_event(
    &self,
    change_event_id: Uuid,
  ) -> Result<Option<ChangeEvent>> {
    let id_str = encode_uuid(change_event_id);

    let raw: Option<RawChangeEvent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM change_events WHERE change_event_id = ?1",
                RawChangeEvent::COLUMNS
              ),
              rusqlite::params![id_str],
              RawChangeEvent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawChangeEvent::into_event).transpose()
  }

  async fn list_change_events(&self, project_id: Uuid) -> Result<Vec<ChangeEvent>> {
    let project_str = encode_uuid(project_id);

    let raws: Vec<RawChangeEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM change_events WHERE project_id = ?1
           ORDER BY created_at DESC",
          RawChangeEvent::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![project_str], RawChangeEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChangeEvent::into_event).collect()
  }

  async fn set_change_affected(
    &self,
    change_event_id: Uuid,
    indices: Vec<u32>,
  ) -> Result<ChangeEvent> {
    let id_str       = encode_uuid(change_event_id);
    let affected_str = encode_index_list(&indices)?;

    let raw: Option<RawChangeEvent> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE change_events SET affected = ?2 WHERE change_event_id = ?1",
          rusqlite::params![id_str, affected_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM change_events WHERE change_event_id = ?1",
                RawChangeEvent::COLUMNS
              ),
              rusqlite::params![id_str],
              RawChangeEvent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .ok_or(Error::ChangeEventNotFound(change_event_id))
      .and_then(RawChangeEvent::into_event)
  }

  async fn insert_patch_runs(
    &self,
    change_event_id: Uuid,
    episodes: Vec<(Uuid, u32)>,
  ) -> Result<Vec<PatchRun>> {
    let created_at = Utc::now();
    let runs: Vec<PatchRun> = episodes
      .iter()
      .map(|(episode_id, index)| PatchRun {
        patch_run_id:     Uuid::new_v4(),
        change_event_id,
        episode_id:       *episode_id,
        episode_index:    *index,
        status:           PatchStatus::Pending,
        proposed_content: None,
        reject_reason:    None,
        created_at,
        resolved_at:      None,
      })
      .collect();

    let change_str = encode_uuid(change_event_id);
    let at_str     = encode_dt(created_at);
    let rows: Vec<(String, String, i64)> = runs
      .iter()
      .map(|run| {
        (
          encode_uuid(run.patch_run_id),
          encode_uuid(run.episode_id),
          i64::from(run.episode_index),
        )
      })
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (run_str, episode_str, idx) in &rows {
          tx.execute(
            "INSERT INTO patch_runs
               (patch_run_id, change_event_id, episode_id, episode_idx, status,
                proposed_content, reject_reason, created_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', NULL, NULL, ?5, NULL)",
            rusqlite::params![run_str, change_str, episode_str, idx, at_str],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(runs)
  }

  async fn get_patch_run(&self, patch_run_id: Uuid) -> Result<Option<PatchRun>> {
    let id_str = encode_uuid(patch_run_id);

    let raw: Option<RawPatchRun> = self
      .conn
      .call(move |conn| Ok(select_patch_run(conn, &id_str)?))
      .await?;

    raw.map(RawPatchRun::into_run).transpose()
  }

  async fn list_patch_runs(&self, change_event_id: Uuid) -> Result<Vec<PatchRun>> {
    let id_str = encode_uuid(change_event_id);

    let raws: Vec<RawPatchRun> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM patch_runs WHERE change_event_id = ?1
           ORDER BY episode_idx",
          RawPatchRun::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawPatchRun::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPatchRun::into_run).collect()
  }

  async fn pending_patch_runs(&self, project_id: Uuid) -> Result<Vec<PatchRun>> {
    let project_str = encode_uuid(project_id);

    let raws: Vec<RawPatchRun> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT pr.patch_run_id, pr.change_event_id, pr.episode_id,
                  pr.episode_idx, pr.status, pr.proposed_content,
                  pr.reject_reason, pr.created_at, pr.resolved_at
           FROM patch_runs pr
           JOIN change_events ce ON ce.change_event_id = pr.change_event_id
           WHERE ce.project_id = ?1 AND pr.status = 'pending'
           ORDER BY pr.created_at, pr.episode_idx",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![project_str], RawPatchRun::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPatchRun::into_run).collect()
  }

  async fn begin_patch(&self, patch_run_id: Uuid) -> Result<PatchRun> {
    let id_str = encode_uuid(patch_run_id);

    let (changed, raw): (usize, Option<RawPatchRun>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE patch_runs SET status = 'running'
           WHERE patch_run_id = ?1 AND status = 'pending'",
          rusqlite::params![id_str],
        )?;
        Ok((changed, select_patch_run(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_run(),
      other => Err(patch_cas_error(patch_run_id, "pending", other)),
    }
  }

  async fn complete_patch(
    &self,
    patch_run_id: Uuid,
    proposed_content: String,
  ) -> Result<PatchRun> {
    let id_str = encode_uuid(patch_run_id);

    let (changed, raw): (usize, Option<RawPatchRun>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE patch_runs SET status = 'complete', proposed_content = ?2
           WHERE patch_run_id = ?1 AND status = 'running'",
          rusqlite::params![id_str, proposed_content],
        )?;
        Ok((changed, select_patch_run(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_run(),
      other => Err(patch_cas_error(patch_run_id, "running", other)),
    }
  }

  async fn reset_patch(&self, patch_run_id: Uuid) -> Result<PatchRun> {
    let id_str = encode_uuid(patch_run_id);

    let (changed, raw): (usize, Option<RawPatchRun>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE patch_runs SET status = 'pending'
           WHERE patch_run_id = ?1 AND status = 'running'",
          rusqlite::params![id_str],
        )?;
        Ok((changed, select_patch_run(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_run(),
      other => Err(patch_cas_error(patch_run_id, "running", other)),
    }
  }

  async fn apply_patch_run(&self, patch_run_id: Uuid) -> Result<PatchRun> {
    let id_str = encode_uuid(patch_run_id);
    let at_str = encode_dt(Utc::now());

    let (changed, raw): (usize, Option<RawPatchRun>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE patch_runs SET status = 'applied', resolved_at = ?2
           WHERE patch_run_id = ?1 AND status = 'complete'",
          rusqlite::params![id_str, at_str],
        )?;
        Ok((changed, select_patch_run(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_run(),
      other => Err(patch_cas_error(patch_run_id, "complete", other)),
    }
  }

  async fn reject_patch_run(
    &self,
    patch_run_id: Uuid,
    reason: String,
  ) -> Result<PatchRun> {
    let id_str = encode_uuid(patch_run_id);
    let at_str = encode_dt(Utc::now());

    let (changed, raw): (usize, Option<RawPatchRun>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE patch_runs
           SET status = 'rejected', reject_reason = ?2, resolved_at = ?3
           WHERE patch_run_id = ?1 AND status IN ('pending', 'complete')",
          rusqlite::params![id_str, reason, at_str],
        )?;
        Ok((changed, select_patch_run(conn, &id_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_run(),
      other => Err(patch_cas_error(patch_run_id, "pending or complete", other)),
    }
  }

  // ── Batch cursor ──────────────────────────────────────────────────────────

  async fn start_batch(
    &self,
    project_id: Uuid,
    from_index: u32,
  ) -> Result<BatchCursor> {
    let started_at = Utc::now();

    let project_str = encode_uuid(project_id);
    let idx         = i64::from(from_index);
    let at_str      = encode_dt(started_at);

    let inserted: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let running: bool = tx
          .query_row(
            "SELECT 1 FROM batch_cursors
             WHERE project_id = ?1 AND status = 'running'",
            rusqlite::params![project_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if running {
          return Ok(false);
        }

        tx.execute(
          "INSERT INTO batch_cursors
             (project_id, next_idx, stop_requested, status, started_at, updated_at)
           VALUES (?1, ?2, 0, 'running', ?3, ?3)
           ON CONFLICT(project_id) DO UPDATE SET
             next_idx       = excluded.next_idx,
             stop_requested = 0,
             status         = 'running',
             started_at     = excluded.started_at,
             updated_at     = excluded.updated_at",
          rusqlite::params![project_str, idx, at_str],
        )?;

        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::BatchRunning(project_id));
    }
    Ok(BatchCursor {
      project_id,
      next_index: from_index,
      stop_requested: false,
      status: BatchStatus::Running,
      started_at,
      updated_at: started_at,
    })
  }

  async fn batch_cursor(&self, project_id: Uuid) -> Result<Option<BatchCursor>> {
    let project_str = encode_uuid(project_id);

    let raw: Option<RawBatchCursor> = self
      .conn
      .call(move |conn| Ok(select_cursor(conn, &project_str)?))
      .await?;

    raw.map(RawBatchCursor::into_cursor).transpose()
  }

  async fn advance_batch(
    &self,
    project_id: Uuid,
    next_index: u32,
  ) -> Result<BatchCursor> {
    let project_str = encode_uuid(project_id);
    let idx         = i64::from(next_index);
    let at_str      = encode_dt(Utc::now());

    let (changed, raw): (usize, Option<RawBatchCursor>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE batch_cursors SET next_idx = ?2, updated_at = ?3
           WHERE project_id = ?1 AND status = 'running'",
          rusqlite::params![project_str, idx, at_str],
        )?;
        Ok((changed, select_cursor(conn, &project_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_cursor(),
      _ => Err(Error::BatchNotRunning(project_id)),
    }
  }

  async fn finish_batch(
    &self,
    project_id: Uuid,
    status: BatchStatus,
  ) -> Result<BatchCursor> {
    debug_assert!(status.is_terminal());

    let project_str = encode_uuid(project_id);
    let status_str  = status.as_str();
    let at_str      = encode_dt(Utc::now());

    let (changed, raw): (usize, Option<RawBatchCursor>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE batch_cursors SET status = ?2, updated_at = ?3
           WHERE project_id = ?1 AND status = 'running'",
          rusqlite::params![project_str, status_str, at_str],
        )?;
        Ok((changed, select_cursor(conn, &project_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_cursor(),
      _ => Err(Error::BatchNotRunning(project_id)),
    }
  }

  async fn request_batch_stop(&self, project_id: Uuid) -> Result<BatchCursor> {
    let project_str = encode_uuid(project_id);
    let at_str      = encode_dt(Utc::now());

    let (changed, raw): (usize, Option<RawBatchCursor>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE batch_cursors SET stop_requested = 1, updated_at = ?2
           WHERE project_id = ?1 AND status = 'running'",
          rusqlite::params![project_str, at_str],
        )?;
        Ok((changed, select_cursor(conn, &project_str)?))
      })
      .await?;

    match raw {
      Some(raw) if changed == 1 => raw.into_cursor(),
      _ => Err(Error::BatchNotRunning(project_id)),
    }
  }
}
