//! Orchestration engine for Showrun.
//!
//! Drives the episode pipeline over any [`PipelineStore`]: qualification
//! resolution, canon snapshots, the strictly-ordered episode state machine,
//! retcon patches against locked content, and the tick-driven batch runner.
//!
//! The engine owns every transition gate. Handlers and CLIs call
//! [`Pipeline`] methods and never mutate pipeline state through the store
//! directly.

pub mod artifact;
pub mod batch;
pub mod episode;
pub mod error;
pub mod project;
pub mod retcon;
pub mod snapshot;

pub use error::{Error, Result};

use std::time::Duration;

use showrun_core::{
  episode::Episode,
  facts::{Qualifications, resolve},
  generate::{Generator, LockAuditor},
  project::Project,
  snapshot::CanonSnapshot,
  store::PipelineStore,
};
use uuid::Uuid;


// ─── Configuration ────────────────────────────────────────────────────────────

/// Tuning knobs for a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  /// Work items (episode generations or patch-run executions) a single
  /// batch tick may perform.
  pub max_steps_per_tick:    u32,
  /// Characters of locked content carried into each continuity note.
  pub continuity_tail_chars: usize,
  /// Characters of locked content shown to impact analysis.
  pub digest_excerpt_chars:  usize,
  /// Sleep bounds between empty ticks in [`Pipeline::drive`].
  pub drive_backoff_min:     Duration,
  pub drive_backoff_max:     Duration,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      max_steps_per_tick:    1,
      continuity_tail_chars: 600,
      digest_excerpt_chars:  400,
      drive_backoff_min:     Duration::from_millis(250),
      drive_backoff_max:     Duration::from_secs(8),
    }
  }
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────

/// The episode pipeline: a store, a generation backend, and a lock auditor.
pub struct Pipeline<S, G, A> {
  store:     S,
  generator: G,
  auditor:   A,
  config:    PipelineConfig,
}

impl<S, G, A> Pipeline<S, G, A>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  pub fn new(store: S, generator: G, auditor: A) -> Self {
    Self::with_config(store, generator, auditor, PipelineConfig::default())
  }

  pub fn with_config(
    store: S,
    generator: G,
    auditor: A,
    config: PipelineConfig,
  ) -> Self {
    Self { store, generator, auditor, config }
  }

  /// Direct access to the backing store, for startup checks and tooling.
  pub fn store(&self) -> &S {
    &self.store
  }

  // ── Shared fetch helpers ────────────────────────────────────────────────────

  pub(crate) async fn require_project(&self, project_id: Uuid) -> Result<Project> {
    self
      .store
      .get_project(project_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ProjectNotFound(project_id))
  }

  /// The episode at `index`, soft-deleted rows included.
  pub(crate) async fn require_episode(
    &self,
    project_id: Uuid,
    index: u32,
  ) -> Result<Episode> {
    self
      .store
      .get_episode(project_id, index)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EpisodeNotFound(index))
  }

  /// The episode at `index`, refusing soft-deleted rows.
  pub(crate) async fn require_active_episode(
    &self,
    project_id: Uuid,
    index: u32,
  ) -> Result<Episode> {
    let episode = self.require_episode(project_id, index).await?;
    if episode.is_deleted() {
      return Err(Error::EpisodeDeleted(index));
    }
    Ok(episode)
  }

  // ── Staleness gate ──────────────────────────────────────────────────────────

  /// The active snapshot, checked against the current resolver hash.
  ///
  /// On divergence every non-locked episode is swept to `invalidated` and
  /// the operation fails; a fresh snapshot returns them to `pending`.
  pub(crate) async fn checked_snapshot(
    &self,
    project_id: Uuid,
    qualifications: &Qualifications,
  ) -> Result<CanonSnapshot> {
    let snapshot = self
      .store
      .active_snapshot(project_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SnapshotMissing)?;
    if !snapshot.is_valid(&qualifications.hash) {
      let swept = self
        .store
        .invalidate_unlocked(project_id)
        .await
        .map_err(Error::store)?;
      tracing::warn!(
        %project_id,
        snapshot_hash = %snapshot.fact_hash,
        current_hash = %qualifications.hash,
        swept,
        "canon snapshot is stale; unlocked episodes invalidated"
      );
      return Err(Error::SnapshotStale);
    }
    Ok(snapshot)
  }

  pub(crate) async fn valid_snapshot(
    &self,
    project: &Project,
  ) -> Result<CanonSnapshot> {
    let qualifications = resolve(&project.settings);
    self.checked_snapshot(project.project_id, &qualifications).await
  }
}

// ─── Text helpers ─────────────────────────────────────────────────────────────

/// Last `max_chars` characters of `content`, cut on a char boundary.
pub(crate) fn tail_excerpt(content: &str, max_chars: usize) -> &str {
  if max_chars == 0 {
    return "";
  }
  match content.char_indices().rev().nth(max_chars - 1) {
    Some((idx, _)) => &content[idx..],
    None => content,
  }
}
