//! The retcon engine: declared changes, impact analysis, and amendment
//! patches against locked episodes.
//!
//! Locked content never mutates in place. An applied patch appends a new
//! version and an `amendment` lock event; every prior frozen version stays
//! readable.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use showrun_core::{
  episode::{ContinuityNote, Episode, LockEvent, LockSource, NewLockEvent},
  generate::{GenerationOutcome, Generator, ImpactOutcome, LockAuditor, LockedDigest},
  retcon::{ChangeEvent, PatchRun, PatchStatus},
  store::PipelineStore,
};
use uuid::Uuid;

use crate::{Error, Pipeline, Result, tail_excerpt};

// ─── Operation results ────────────────────────────────────────────────────────

/// One change event with all of its patch runs.
#[derive(Debug, Clone, Serialize)]
pub struct RetconDetail {
  pub change: ChangeEvent,
  pub runs:   Vec<PatchRun>,
}

/// Everything an applied amendment recorded.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedPatch {
  pub run:        PatchRun,
  pub episode:    Episode,
  pub lock_event: LockEvent,
  pub continuity: ContinuityNote,
}

// ─── Operations ───────────────────────────────────────────────────────────────

impl<S, G, A> Pipeline<S, G, A>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  /// Declare a narrative change against locked canon.
  pub async fn declare_retcon(
    &self,
    project_id: Uuid,
    summary: String,
  ) -> Result<ChangeEvent> {
    let summary = summary.trim().to_string();
    if summary.is_empty() {
      return Err(Error::EmptySummary);
    }
    self.require_project(project_id).await?;
    let change = self
      .store
      .insert_change_event(project_id, summary)
      .await
      .map_err(Error::store)?;
    tracing::info!(
      %project_id,
      change_event_id = %change.change_event_id,
      "retcon declared"
    );
    Ok(change)
  }

  /// Ask the backend which locked episodes the change plausibly affects,
  /// and persist the gated verdict on the event.
  ///
  /// The backend's answer is advisory: indices that do not name a locked
  /// episode are discarded here, never trusted.
  pub async fn analyze_retcon(
    &self,
    project_id: Uuid,
    change_event_id: Uuid,
  ) -> Result<ChangeEvent> {
    let change = self.scoped_change(project_id, change_event_id).await?;

    let episodes = self
      .store
      .list_episodes(project_id, false)
      .await
      .map_err(Error::store)?;
    let mut locked_indices: BTreeSet<u32> = BTreeSet::new();
    let mut digests = Vec::new();
    for episode in episodes.iter().filter(|e| e.is_locked()) {
      if let Some(digest) = self.locked_digest(episode).await? {
        locked_indices.insert(digest.index);
        digests.push(digest);
      }
    }

    let indices =
      match self.generator.assess_impact(change.clone(), digests).await {
        ImpactOutcome::Impacted { indices } => indices,
        ImpactOutcome::Failed { reason } => {
          return Err(Error::AnalysisFailed(reason));
        }
      };
    let affected: Vec<u32> = indices
      .into_iter()
      .filter(|index| locked_indices.contains(index))
      .collect::<BTreeSet<u32>>()
      .into_iter()
      .collect();
    tracing::info!(
      %project_id,
      %change_event_id,
      affected = affected.len(),
      "retcon impact analysed"
    );
    self
      .store
      .set_change_affected(change_event_id, affected)
      .await
      .map_err(Error::store)
  }

  /// Create pending patch runs for the change and drive each one through a
  /// proposal attempt.
  ///
  /// Targets default to the analysed affected set. Only locked, non-deleted
  /// episodes qualify; anything else in the list is discarded, and an
  /// episode with an unresolved run for this change is not duplicated. A
  /// failed proposal parks its run in `pending` for a later attempt.
  pub async fn propose_patches(
    &self,
    project_id: Uuid,
    change_event_id: Uuid,
    indices: Option<Vec<u32>>,
  ) -> Result<Vec<PatchRun>> {
    let change = self.scoped_change(project_id, change_event_id).await?;
    let targets = match indices {
      Some(list) => list,
      None => change
        .affected
        .clone()
        .ok_or(Error::NotAnalyzed(change_event_id))?,
    };

    let existing = self
      .store
      .list_patch_runs(change_event_id)
      .await
      .map_err(Error::store)?;
    let open: HashSet<u32> = existing
      .iter()
      .filter(|run| !run.status.is_resolved())
      .map(|run| run.episode_index)
      .collect();

    let mut pairs: Vec<(Uuid, u32)> = Vec::new();
    let mut seen: BTreeSet<u32> = BTreeSet::new();
    for index in targets {
      if !seen.insert(index) || open.contains(&index) {
        continue;
      }
      let episode = self
        .store
        .get_episode(project_id, index)
        .await
        .map_err(Error::store)?;
      if let Some(ep) = episode {
        if ep.is_locked() && !ep.is_deleted() {
          pairs.push((ep.episode_id, index));
        }
      }
    }
    if pairs.is_empty() {
      return Err(Error::NoPatchTargets);
    }

    let runs = self
      .store
      .insert_patch_runs(change_event_id, pairs)
      .await
      .map_err(Error::store)?;
    tracing::info!(
      %project_id,
      %change_event_id,
      runs = runs.len(),
      "patch runs created"
    );

    let mut driven = Vec::with_capacity(runs.len());
    for run in runs {
      driven.push(self.execute_patch_run(&change, run).await?);
    }
    Ok(driven)
  }

  /// Apply a completed proposal to its locked episode as an amendment.
  ///
  /// Appends a fresh content version, records an `amendment` lock event
  /// attributed to the run, refreshes the continuity note, and settles the
  /// run. `locked_at` is untouched: it records the first freeze.
  pub async fn apply_patch(
    &self,
    project_id: Uuid,
    patch_run_id: Uuid,
  ) -> Result<AppliedPatch> {
    let run = self.scoped_patch_run(project_id, patch_run_id).await?;
    if run.status != PatchStatus::Complete {
      return Err(Error::PatchNotApplicable {
        status:   run.status,
        expected: "complete",
      });
    }
    let content = run
      .proposed_content
      .clone()
      .ok_or(Error::ProposalMissing(patch_run_id))?;
    let episode = self
      .store
      .get_episode_by_id(run.episode_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EpisodeNotFound(run.episode_index))?;
    if !episode.is_locked() {
      return Err(Error::NotLocked(run.episode_index));
    }

    let version = self
      .store
      .add_episode_version(episode.episode_id, content.clone())
      .await
      .map_err(Error::store)?;
    let lock_event = self
      .store
      .insert_lock_event(NewLockEvent {
        episode_id:   episode.episode_id,
        version_id:   version.version_id,
        content,
        source:       LockSource::Amendment,
        patch_run_id: Some(run.patch_run_id),
      })
      .await
      .map_err(Error::store)?;
    let continuity =
      self.write_continuity(&episode, version.seq, &lock_event).await?;
    let run = self
      .store
      .apply_patch_run(patch_run_id)
      .await
      .map_err(Error::store)?;
    tracing::info!(
      %project_id,
      index = episode.index,
      %patch_run_id,
      "amendment applied"
    );
    Ok(AppliedPatch { run, episode, lock_event, continuity })
  }

  /// Reject a pending or completed proposal. The reason is mandatory and
  /// recorded on the run; the target episode is untouched.
  pub async fn reject_patch(
    &self,
    project_id: Uuid,
    patch_run_id: Uuid,
    reason: String,
  ) -> Result<PatchRun> {
    let reason = reason.trim().to_string();
    if reason.is_empty() {
      return Err(Error::EmptyReason);
    }
    let run = self.scoped_patch_run(project_id, patch_run_id).await?;
    if !matches!(run.status, PatchStatus::Pending | PatchStatus::Complete) {
      return Err(Error::PatchNotApplicable {
        status:   run.status,
        expected: "pending or complete",
      });
    }
    let run = self
      .store
      .reject_patch_run(patch_run_id, reason)
      .await
      .map_err(Error::store)?;
    tracing::info!(%project_id, %patch_run_id, "patch run rejected");
    Ok(run)
  }

  pub async fn list_retcons(&self, project_id: Uuid) -> Result<Vec<ChangeEvent>> {
    self.require_project(project_id).await?;
    self
      .store
      .list_change_events(project_id)
      .await
      .map_err(Error::store)
  }

  /// One change event with all of its patch runs.
  pub async fn retcon_detail(
    &self,
    project_id: Uuid,
    change_event_id: Uuid,
  ) -> Result<RetconDetail> {
    let change = self.scoped_change(project_id, change_event_id).await?;
    let runs = self
      .store
      .list_patch_runs(change_event_id)
      .await
      .map_err(Error::store)?;
    Ok(RetconDetail { change, runs })
  }

  // ── Shared internals ────────────────────────────────────────────────────────

  /// Drive one run through `pending → running → complete`, or back to
  /// `pending` when the backend fails.
  pub(crate) async fn execute_patch_run(
    &self,
    change: &ChangeEvent,
    run: PatchRun,
  ) -> Result<PatchRun> {
    let run = self
      .store
      .begin_patch(run.patch_run_id)
      .await
      .map_err(Error::store)?;
    let episode = self
      .store
      .get_episode_by_id(run.episode_id)
      .await
      .map_err(Error::store)?;
    let digest = match episode {
      Some(ref ep) if !ep.is_deleted() => self.locked_digest(ep).await?,
      _ => None,
    };
    // Target vanished or was deleted since proposal: park the run again and
    // report the gate.
    let Some(digest) = digest else {
      self
        .store
        .reset_patch(run.patch_run_id)
        .await
        .map_err(Error::store)?;
      return Err(Error::NotLocked(run.episode_index));
    };
    let frozen = self
      .store
      .latest_lock_event(run.episode_id)
      .await
      .map_err(Error::store)?;
    let Some(frozen) = frozen else {
      self
        .store
        .reset_patch(run.patch_run_id)
        .await
        .map_err(Error::store)?;
      return Err(Error::NoContent(run.episode_index));
    };

    let outcome = self
      .generator
      .propose_amendment(change.clone(), digest, frozen.content)
      .await;
    match outcome {
      GenerationOutcome::Drafted { content }
      | GenerationOutcome::NeedsRevision { content, .. } => self
        .store
        .complete_patch(run.patch_run_id, content)
        .await
        .map_err(Error::store),
      GenerationOutcome::RetryableFailure { reason }
      | GenerationOutcome::FatalFailure { reason } => {
        tracing::warn!(
          patch_run_id = %run.patch_run_id,
          index = run.episode_index,
          %reason,
          "amendment proposal failed; run returned to pending"
        );
        self
          .store
          .reset_patch(run.patch_run_id)
          .await
          .map_err(Error::store)
      }
    }
  }

  /// A compact view of one locked episode for the backend.
  async fn locked_digest(&self, episode: &Episode) -> Result<Option<LockedDigest>> {
    let Some(locked_at) = episode.locked_at else {
      return Ok(None);
    };
    let excerpt = match self
      .store
      .continuity_note(episode.episode_id)
      .await
      .map_err(Error::store)?
    {
      Some(note) => {
        tail_excerpt(&note.tail_excerpt, self.config.digest_excerpt_chars)
          .to_string()
      }
      None => String::new(),
    };
    Ok(Some(LockedDigest { index: episode.index, excerpt, locked_at }))
  }

  async fn scoped_change(
    &self,
    project_id: Uuid,
    change_event_id: Uuid,
  ) -> Result<ChangeEvent> {
    let change = self
      .store
      .get_change_event(change_event_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ChangeEventNotFound(change_event_id))?;
    if change.project_id != project_id {
      return Err(Error::ChangeEventNotFound(change_event_id));
    }
    Ok(change)
  }

  async fn scoped_patch_run(
    &self,
    project_id: Uuid,
    patch_run_id: Uuid,
  ) -> Result<PatchRun> {
    let run = self
      .store
      .get_patch_run(patch_run_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::PatchRunNotFound(patch_run_id))?;
    let change = self
      .store
      .get_change_event(run.change_event_id)
      .await
      .map_err(Error::store)?;
    match change {
      Some(c) if c.project_id == project_id => Ok(run),
      _ => Err(Error::PatchRunNotFound(patch_run_id)),
    }
  }
}
