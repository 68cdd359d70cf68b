//! The episode state machine: creation, generation, locking, templates,
//! deletion, and recovery.

use std::collections::HashMap;

use serde::Serialize;
use showrun_core::{
  artifact::ArtifactVersion,
  batch::BatchStatus,
  context::resolve_context,
  episode::{
    ContinuityMetadata, ContinuityNote, Episode, EpisodeStatus, EpisodeVersion,
    LockEvent, LockSource, NewLockEvent,
  },
  facts::resolve,
  generate::{ContextDocument, EpisodeContext, GenerationOutcome, Generator, LockAuditor},
  project::Project,
  snapshot::CanonSnapshot,
  store::PipelineStore,
};
use uuid::Uuid;

use crate::{Error, Pipeline, Result, tail_excerpt};

// ─── Operation results ────────────────────────────────────────────────────────

/// Everything a successful lock recorded.
#[derive(Debug, Clone, Serialize)]
pub struct LockResult {
  pub episode:         Episode,
  pub lock_event:      LockEvent,
  pub continuity:      ContinuityNote,
  /// Set when this is episode 1 and no season template is designated yet —
  /// the operator should consider templating it.
  pub template_prompt: bool,
}

/// One episode with its full history.
#[derive(Debug, Clone, Serialize)]
pub struct UnitDetail {
  pub episode:     Episode,
  pub versions:    Vec<EpisodeVersion>,
  pub lock_events: Vec<LockEvent>,
  pub continuity:  Option<ContinuityNote>,
}

// ─── Operations ───────────────────────────────────────────────────────────────

impl<S, G, A> Pipeline<S, G, A>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  // ── Creation and reads ──────────────────────────────────────────────────────

  /// Append `count` episodes in `pending`, indices continuing after the
  /// season's current maximum. New episodes bind to the active snapshot, so
  /// one must exist and be valid.
  pub async fn create_units(
    &self,
    project_id: Uuid,
    count: u32,
  ) -> Result<Vec<Episode>> {
    let project = self.require_project(project_id).await?;
    let snapshot = self.valid_snapshot(&project).await?;
    let episodes = self
      .store
      .append_episodes(project_id, snapshot.snapshot_id, count)
      .await
      .map_err(Error::store)?;
    if let (Some(first), Some(last)) = (episodes.first(), episodes.last()) {
      tracing::info!(
        %project_id,
        first = first.index,
        last = last.index,
        "episodes appended"
      );
    }
    Ok(episodes)
  }

  pub async fn list_units(
    &self,
    project_id: Uuid,
    include_deleted: bool,
  ) -> Result<Vec<Episode>> {
    self.require_project(project_id).await?;
    self
      .store
      .list_episodes(project_id, include_deleted)
      .await
      .map_err(Error::store)
  }

  /// One episode with its versions, lock events, and continuity note.
  pub async fn unit_detail(&self, project_id: Uuid, index: u32) -> Result<UnitDetail> {
    self.require_project(project_id).await?;
    let episode = self.require_episode(project_id, index).await?;
    let versions = self
      .store
      .episode_versions(episode.episode_id)
      .await
      .map_err(Error::store)?;
    let lock_events = self
      .store
      .lock_events(episode.episode_id)
      .await
      .map_err(Error::store)?;
    let continuity = self
      .store
      .continuity_note(episode.episode_id)
      .await
      .map_err(Error::store)?;
    Ok(UnitDetail { episode, versions, lock_events, continuity })
  }

  // ── Generation ──────────────────────────────────────────────────────────────

  /// Generate (or regenerate) one episode on the operator's behalf.
  ///
  /// Refused while a batch is running; the batch owns the season then.
  pub async fn generate_unit(&self, project_id: Uuid, index: u32) -> Result<Episode> {
    let project = self.require_project(project_id).await?;
    let cursor = self
      .store
      .batch_cursor(project_id)
      .await
      .map_err(Error::store)?;
    if cursor.is_some_and(|c| c.status == BatchStatus::Running) {
      return Err(Error::BatchRunning);
    }
    self.generate_episode(&project, index).await
  }

  /// Gate checks and the full generation round trip for one episode.
  ///
  /// Backend failures never escape as errors: they land on the episode as an
  /// `error` status and the updated row is returned.
  pub(crate) async fn generate_episode(
    &self,
    project: &Project,
    index: u32,
  ) -> Result<Episode> {
    let project_id = project.project_id;
    let qualifications = resolve(&project.settings);
    let snapshot = self.checked_snapshot(project_id, &qualifications).await?;

    // Strict order: episode k never drafts before k-1 is locked. Checked
    // before target lookup, so asking for an index past the frontier reports
    // the gate rather than a missing row.
    let previous = if index > 1 {
      let predecessor = index - 1;
      let prev = self
        .store
        .get_episode(project_id, predecessor)
        .await
        .map_err(Error::store)?;
      match prev {
        Some(p) if p.is_locked() && !p.is_deleted() => Some(p),
        _ => return Err(Error::PredecessorNotLocked { index, predecessor }),
      }
    } else {
      None
    };

    let episode = self.require_active_episode(project_id, index).await?;
    if !episode.status.can_generate() {
      return Err(Error::CannotGenerate { index, status: episode.status });
    }

    let prior_draft = self
      .store
      .latest_episode_version(episode.episode_id)
      .await
      .map_err(Error::store)?
      .map(|version| version.content);
    let previous_note = match &previous {
      Some(p) => self
        .store
        .continuity_note(p.episode_id)
        .await
        .map_err(Error::store)?,
      None => None,
    };
    let template = self.template_content(project_id).await?;
    let documents = self.context_documents(project_id, &snapshot).await?;

    let episode = self
      .store
      .begin_generating(episode.episode_id)
      .await
      .map_err(Error::store)?;
    tracing::info!(%project_id, index, "episode generation started");

    let request = EpisodeContext {
      project_id,
      index,
      facts: qualifications.facts.clone(),
      fact_hash: qualifications.hash.clone(),
      documents,
      previous: previous_note,
      template,
      prior_draft,
    };

    let episode = match self.generator.draft(request).await {
      GenerationOutcome::Drafted { content } => {
        self
          .store
          .add_episode_version(episode.episode_id, content)
          .await
          .map_err(Error::store)?;
        self
          .store
          .complete_episode(episode.episode_id, EpisodeStatus::Complete, None)
          .await
          .map_err(Error::store)?
      }
      GenerationOutcome::NeedsRevision { content, reason } => {
        self
          .store
          .add_episode_version(episode.episode_id, content)
          .await
          .map_err(Error::store)?;
        self
          .store
          .complete_episode(
            episode.episode_id,
            EpisodeStatus::NeedsRevision,
            Some(reason),
          )
          .await
          .map_err(Error::store)?
      }
      GenerationOutcome::RetryableFailure { reason } => {
        tracing::warn!(%project_id, index, %reason, "draft failed; retryable");
        self
          .store
          .fail_episode(episode.episode_id, reason, true)
          .await
          .map_err(Error::store)?
      }
      GenerationOutcome::FatalFailure { reason } => {
        tracing::warn!(%project_id, index, %reason, "draft failed; not retryable");
        self
          .store
          .fail_episode(episode.episode_id, reason, false)
          .await
          .map_err(Error::store)?
      }
    };
    tracing::info!(%project_id, index, status = %episode.status, "episode generation finished");
    Ok(episode)
  }

  /// Frozen content of the season template episode, if one is designated.
  async fn template_content(&self, project_id: Uuid) -> Result<Option<String>> {
    let Some(template) = self
      .store
      .template_episode(project_id)
      .await
      .map_err(Error::store)?
    else {
      return Ok(None);
    };
    let event = self
      .store
      .latest_lock_event(template.episode_id)
      .await
      .map_err(Error::store)?;
    Ok(event.map(|e| e.content))
  }

  /// The context plan's documents, reading the snapshot-pinned version of
  /// each selected artifact where one exists and the latest otherwise.
  async fn context_documents(
    &self,
    project_id: Uuid,
    snapshot: &CanonSnapshot,
  ) -> Result<Vec<ContextDocument>> {
    let artifacts = self
      .store
      .list_artifacts(project_id)
      .await
      .map_err(Error::store)?;
    let default_set = self
      .store
      .default_context_set(project_id)
      .await
      .map_err(Error::store)?;
    let plan = resolve_context(&artifacts, default_set.as_ref(), &[]);

    let mut pinned: HashMap<Uuid, ArtifactVersion> = HashMap::new();
    for version_id in &snapshot.artifact_versions {
      let version = self
        .store
        .get_artifact_version(*version_id)
        .await
        .map_err(Error::store)?;
      if let Some(version) = version {
        pinned.insert(version.artifact_id, version);
      }
    }

    Ok(
      plan
        .items
        .into_iter()
        .map(|item| {
          let version =
            pinned.remove(&item.artifact.artifact_id).unwrap_or(item.version);
          ContextDocument {
            kind:    item.artifact.kind,
            name:    item.artifact.name,
            content: version.content,
          }
        })
        .collect(),
    )
  }

  // ── Locking ─────────────────────────────────────────────────────────────────

  /// Lock one episode: freeze its latest content into a lock event and
  /// refresh the continuity note. The audit gate runs first; any blocking
  /// issue rejects the lock with nothing written.
  pub async fn lock_unit(&self, project_id: Uuid, index: u32) -> Result<LockResult> {
    let project = self.require_project(project_id).await?;
    self.valid_snapshot(&project).await?;
    let episode = self.require_active_episode(project_id, index).await?;
    self.lock_episode(episode).await
  }

  /// The lock transition proper. Callers have already run the staleness
  /// sweep.
  pub(crate) async fn lock_episode(&self, episode: Episode) -> Result<LockResult> {
    let index = episode.index;
    if !episode.status.can_lock() {
      return Err(Error::CannotLock { index, status: episode.status });
    }
    let version = self
      .store
      .latest_episode_version(episode.episode_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NoContent(index))?;

    let issues = self
      .auditor
      .blocking_issues(index, version.content.clone())
      .await;
    if !issues.is_empty() {
      tracing::warn!(
        project_id = %episode.project_id,
        index,
        issues = issues.len(),
        "audit blocked lock"
      );
      return Err(Error::AuditBlocked { index, issues });
    }

    let episode = self
      .store
      .mark_locked(episode.episode_id)
      .await
      .map_err(Error::store)?;
    let lock_event = self
      .store
      .insert_lock_event(NewLockEvent {
        episode_id:   episode.episode_id,
        version_id:   version.version_id,
        content:      version.content,
        source:       LockSource::Initial,
        patch_run_id: None,
      })
      .await
      .map_err(Error::store)?;
    let continuity =
      self.write_continuity(&episode, version.seq, &lock_event).await?;

    let template_prompt = index == 1
      && self
        .store
        .template_episode(episode.project_id)
        .await
        .map_err(Error::store)?
        .is_none();

    tracing::info!(
      project_id = %episode.project_id,
      index,
      lock_event_id = %lock_event.lock_event_id,
      "episode locked"
    );
    Ok(LockResult { episode, lock_event, continuity, template_prompt })
  }

  /// Derive and store the continuity note for a fresh lock event.
  pub(crate) async fn write_continuity(
    &self,
    episode: &Episode,
    version_seq: i64,
    event: &LockEvent,
  ) -> Result<ContinuityNote> {
    let note = ContinuityNote {
      episode_id:   episode.episode_id,
      tail_excerpt: tail_excerpt(&event.content, self.config.continuity_tail_chars)
        .to_string(),
      metadata: ContinuityMetadata {
        index:      episode.index,
        version_seq,
        word_count: event.content.split_whitespace().count(),
        locked_at:  event.locked_at,
      },
      lock_event_id: event.lock_event_id,
      updated_at:    event.locked_at,
    };
    self.store.upsert_continuity_note(note).await.map_err(Error::store)
  }

  // ── Template ────────────────────────────────────────────────────────────────

  /// Designate the locked episode at `index` as the season template. Any
  /// previous designation is cleared in the same transaction; there is never
  /// a moment with two templates.
  pub async fn set_template(&self, project_id: Uuid, index: u32) -> Result<Episode> {
    self.require_project(project_id).await?;
    let episode = self.require_active_episode(project_id, index).await?;
    if !episode.is_locked() {
      return Err(Error::NotLocked(index));
    }
    let episode = self
      .store
      .set_template(project_id, episode.episode_id)
      .await
      .map_err(Error::store)?;
    tracing::info!(%project_id, index, "season template designated");
    Ok(episode)
  }

  // ── Deletion and recovery ───────────────────────────────────────────────────

  /// Soft-delete an episode. Locked episodes require a reason; it is stored
  /// with the row and survives into the audit trail.
  pub async fn soft_delete_unit(
    &self,
    project_id: Uuid,
    index: u32,
    reason: Option<String>,
  ) -> Result<Episode> {
    self.require_project(project_id).await?;
    let episode = self.require_episode(project_id, index).await?;
    if episode.is_deleted() {
      return Err(Error::EpisodeDeleted(index));
    }
    let reason = reason
      .map(|r| r.trim().to_string())
      .filter(|r| !r.is_empty());
    if episode.is_locked() && reason.is_none() {
      return Err(Error::DeleteReasonRequired(index));
    }
    let episode = self
      .store
      .soft_delete_episode(episode.episode_id, reason)
      .await
      .map_err(Error::store)?;
    tracing::info!(%project_id, index, locked = episode.is_locked(), "episode soft-deleted");
    Ok(episode)
  }

  pub async fn restore_unit(&self, project_id: Uuid, index: u32) -> Result<Episode> {
    self.require_project(project_id).await?;
    let episode = self.require_episode(project_id, index).await?;
    if !episode.is_deleted() {
      return Err(Error::NotSoftDeleted(index));
    }
    let episode = self
      .store
      .restore_episode(episode.episode_id)
      .await
      .map_err(Error::store)?;
    tracing::info!(%project_id, index, "episode restored");
    Ok(episode)
  }

  /// Destroy an episode and its entire history. Requires a prior soft
  /// delete and an explicit confirmation; frozen content never disappears
  /// in one step.
  pub async fn hard_delete_unit(
    &self,
    project_id: Uuid,
    index: u32,
    confirm: bool,
  ) -> Result<()> {
    if !confirm {
      return Err(Error::ConfirmationRequired);
    }
    self.require_project(project_id).await?;
    let episode = self.require_episode(project_id, index).await?;
    if !episode.is_deleted() {
      return Err(Error::NotSoftDeleted(index));
    }
    self
      .store
      .purge_episode(episode.episode_id)
      .await
      .map_err(Error::store)?;
    tracing::warn!(%project_id, index, "episode destroyed");
    Ok(())
  }

  /// Move an episode stuck in `generating` (its owner died mid-call) to
  /// `error`. Recovery is always this explicit operator action, never an
  /// implicit retry.
  pub async fn reset_stuck_unit(&self, project_id: Uuid, index: u32) -> Result<Episode> {
    self.require_project(project_id).await?;
    let episode = self.require_active_episode(project_id, index).await?;
    if episode.status != EpisodeStatus::Generating {
      return Err(Error::NotStuck(index));
    }
    let episode = self
      .store
      .fail_episode(
        episode.episode_id,
        "reset by operator while generating".to_string(),
        true,
      )
      .await
      .map_err(Error::store)?;
    tracing::info!(%project_id, index, "stuck episode reset to error");
    Ok(episode)
  }
}
