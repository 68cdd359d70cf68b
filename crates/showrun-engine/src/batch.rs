//! The tick-driven batch runner.
//!
//! One batch owns its season while running: single-unit generation is
//! refused until the cursor reaches a terminal status. Each tick performs a
//! bounded number of work items and checkpoints the cursor after each, so a
//! dead runner resumes where it stopped.

use serde::Serialize;
use showrun_core::{
  batch::{BatchCursor, BatchStatus},
  episode::EpisodeStatus,
  generate::{Generator, LockAuditor},
  retcon::PatchStatus,
  store::PipelineStore,
};
use uuid::Uuid;

use crate::{Error, Pipeline, Result};

// ─── Tick reporting ───────────────────────────────────────────────────────────

/// One unit of work a tick performed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TickStep {
  Generated { index: u32, status: EpisodeStatus },
  Locked { index: u32 },
  PatchProposed { patch_run_id: Uuid, index: u32, status: PatchStatus },
}

/// What one tick did and where the cursor landed.
#[derive(Debug, Clone, Serialize)]
pub struct TickOutcome {
  pub cursor: BatchCursor,
  pub steps:  Vec<TickStep>,
}

// ─── Operations ───────────────────────────────────────────────────────────────

impl<S, G, A> Pipeline<S, G, A>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  /// Start the project's batch at `from_index` (default 1). Refused while a
  /// batch is already running; a terminal cursor is replaced.
  pub async fn start_batch(
    &self,
    project_id: Uuid,
    from_index: Option<u32>,
  ) -> Result<BatchCursor> {
    self.require_project(project_id).await?;
    let cursor = self
      .store
      .batch_cursor(project_id)
      .await
      .map_err(Error::store)?;
    if cursor.is_some_and(|c| c.status == BatchStatus::Running) {
      return Err(Error::BatchRunning);
    }
    let from = from_index.unwrap_or(1);
    let cursor = self
      .store
      .start_batch(project_id, from)
      .await
      .map_err(Error::store)?;
    tracing::info!(%project_id, from_index = from, "batch started");
    Ok(cursor)
  }

  /// Request a stop. Honored before the next work item, never mid-write.
  pub async fn stop_batch(&self, project_id: Uuid) -> Result<BatchCursor> {
    self.require_project(project_id).await?;
    let cursor = self
      .store
      .batch_cursor(project_id)
      .await
      .map_err(Error::store)?;
    if !cursor.is_some_and(|c| c.status == BatchStatus::Running) {
      return Err(Error::BatchNotRunning);
    }
    let cursor = self
      .store
      .request_batch_stop(project_id)
      .await
      .map_err(Error::store)?;
    tracing::info!(%project_id, "batch stop requested");
    Ok(cursor)
  }

  pub async fn batch_status(&self, project_id: Uuid) -> Result<Option<BatchCursor>> {
    self.require_project(project_id).await?;
    self.store.batch_cursor(project_id).await.map_err(Error::store)
  }

  /// Advance the batch by at most `max_steps_per_tick` work items.
  ///
  /// A work item is one episode generation (locked immediately when the
  /// draft completes clean) or, once the episode frontier is exhausted, one
  /// pending patch-run execution. Locked and deleted episodes are skipped
  /// without consuming budget.
  ///
  /// A step that ends in `needs_revision`, `error`, or a failed proposal
  /// finishes the batch as `blocked` and reports the step; a gate failure
  /// (staleness, audit block, sequencing) also blocks the batch but
  /// propagates its named error.
  pub async fn tick_batch(&self, project_id: Uuid) -> Result<TickOutcome> {
    let project = self.require_project(project_id).await?;
    let mut steps = Vec::new();
    let mut budget = self.config.max_steps_per_tick;

    loop {
      let cursor = self
        .store
        .batch_cursor(project_id)
        .await
        .map_err(Error::store)?
        .ok_or(Error::BatchNotRunning)?;
      if cursor.status != BatchStatus::Running {
        return Err(Error::BatchNotRunning);
      }
      if cursor.stop_requested {
        let cursor = self
          .store
          .finish_batch(project_id, BatchStatus::Stopped)
          .await
          .map_err(Error::store)?;
        tracing::info!(%project_id, "batch stopped");
        return Ok(TickOutcome { cursor, steps });
      }
      if budget == 0 {
        return Ok(TickOutcome { cursor, steps });
      }

      let episodes = self
        .store
        .list_episodes(project_id, false)
        .await
        .map_err(Error::store)?;
      let target = episodes
        .into_iter()
        .find(|e| e.index >= cursor.next_index && !e.is_locked());

      let Some(target) = target else {
        // Episode frontier exhausted: drain pending patch runs, then done.
        let pending = self
          .store
          .pending_patch_runs(project_id)
          .await
          .map_err(Error::store)?;
        let Some(run) = pending.into_iter().next() else {
          let cursor = self
            .store
            .finish_batch(project_id, BatchStatus::Done)
            .await
            .map_err(Error::store)?;
          tracing::info!(%project_id, "batch done");
          return Ok(TickOutcome { cursor, steps });
        };
        let change = self
          .store
          .get_change_event(run.change_event_id)
          .await
          .map_err(Error::store)?
          .ok_or(Error::ChangeEventNotFound(run.change_event_id))?;
        let index = run.episode_index;
        let run = match self.execute_patch_run(&change, run).await {
          Ok(run) => run,
          Err(err) => {
            self.block_batch(project_id).await;
            return Err(err);
          }
        };
        let failed = run.status == PatchStatus::Pending;
        steps.push(TickStep::PatchProposed {
          patch_run_id: run.patch_run_id,
          index,
          status: run.status,
        });
        if failed {
          let cursor = self.finish_blocked(project_id).await?;
          tracing::warn!(%project_id, index, "proposal failed; batch blocked");
          return Ok(TickOutcome { cursor, steps });
        }
        budget -= 1;
        continue;
      };

      let index = target.index;

      // A complete episode at the frontier needs no regeneration; the batch
      // locks it and moves on.
      if target.status == EpisodeStatus::Complete {
        if let Err(err) = self.valid_snapshot(&project).await {
          self.block_batch(project_id).await;
          return Err(err);
        }
        match self.lock_episode(target).await {
          Ok(_) => {
            steps.push(TickStep::Locked { index });
            self
              .store
              .advance_batch(project_id, index + 1)
              .await
              .map_err(Error::store)?;
            budget -= 1;
            continue;
          }
          Err(err) => {
            self.block_batch(project_id).await;
            return Err(err);
          }
        }
      }

      let episode = match self.generate_episode(&project, index).await {
        Ok(episode) => episode,
        Err(err) => {
          self.block_batch(project_id).await;
          return Err(err);
        }
      };
      steps.push(TickStep::Generated { index, status: episode.status });
      match episode.status {
        EpisodeStatus::Complete => match self.lock_episode(episode).await {
          Ok(_) => {
            steps.push(TickStep::Locked { index });
            self
              .store
              .advance_batch(project_id, index + 1)
              .await
              .map_err(Error::store)?;
            budget -= 1;
          }
          Err(err) => {
            self.block_batch(project_id).await;
            return Err(err);
          }
        },
        status => {
          let cursor = self.finish_blocked(project_id).await?;
          tracing::warn!(%project_id, index, status = %status, "batch blocked");
          return Ok(TickOutcome { cursor, steps });
        }
      }
    }
  }

  /// Tick in a loop until the cursor reaches a terminal status, sleeping
  /// with capped exponential backoff after ticks that performed no work.
  pub async fn drive(&self, project_id: Uuid) -> Result<BatchCursor> {
    let mut backoff = self.config.drive_backoff_min;
    loop {
      let outcome = self.tick_batch(project_id).await?;
      if outcome.cursor.status.is_terminal() {
        return Ok(outcome.cursor);
      }
      if outcome.steps.is_empty() {
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(self.config.drive_backoff_max);
      } else {
        backoff = self.config.drive_backoff_min;
      }
    }
  }

  async fn finish_blocked(&self, project_id: Uuid) -> Result<BatchCursor> {
    self
      .store
      .finish_batch(project_id, BatchStatus::Blocked)
      .await
      .map_err(Error::store)
  }

  /// Best-effort move to `blocked` on the way out of a failed step. A
  /// cursor race here must not mask the original error.
  async fn block_batch(&self, project_id: Uuid) {
    if let Err(err) = self
      .store
      .finish_batch(project_id, BatchStatus::Blocked)
      .await
    {
      tracing::warn!(%project_id, error = %err, "failed to mark batch blocked");
    }
  }
}
