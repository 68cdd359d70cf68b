//! The `PipelineStore` trait — versioned, append-only persistence.
//!
//! Implemented by storage backends (e.g. `showrun-store-sqlite`). Higher
//! layers depend on this abstraction, not on any concrete backend.
//!
//! Contended fields (episode status, `locked_at`, the template flag, the
//! active snapshot, the batch cursor) mutate only through the conditional
//! operations below: each checks the expected current state inside the same
//! statement or transaction that writes, and fails with a typed error when
//! the state moved underneath the caller. Callers never read-then-write.

use std::future::Future;

use uuid::Uuid;

use crate::{
  artifact::{Artifact, ArtifactKind, ArtifactVersion, ArtifactWithLatest},
  batch::{BatchCursor, BatchStatus},
  context::{ContextSet, NewContextSet},
  episode::{ContinuityNote, Episode, EpisodeStatus, EpisodeVersion, LockEvent, NewLockEvent},
  project::{NewProject, Project, ProjectSettings},
  retcon::{ChangeEvent, PatchRun},
  snapshot::CanonSnapshot,
};

/// Abstraction over a showrun pipeline store backend.
///
/// Content writes (artifact versions, episode versions, lock events) are
/// append-only; prior rows are never mutated in place.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait PipelineStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Projects ──────────────────────────────────────────────────────────

  fn add_project(
    &self,
    input: NewProject,
  ) -> impl Future<Output = Result<Project, Self::Error>> + Send + '_;

  fn get_project(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Project>, Self::Error>> + Send + '_;

  fn list_projects(
    &self,
  ) -> impl Future<Output = Result<Vec<Project>, Self::Error>> + Send + '_;

  /// Replace a project's settings. The resolver hash changes with them;
  /// staleness follows from the next resolution, not from this write.
  fn update_settings(
    &self,
    id: Uuid,
    settings: ProjectSettings,
  ) -> impl Future<Output = Result<Project, Self::Error>> + Send + '_;

  // ── Artifacts ─────────────────────────────────────────────────────────

  /// Return the artifact with this `(project, kind, name)`, creating it if
  /// absent.
  fn upsert_artifact(
    &self,
    project_id: Uuid,
    kind: ArtifactKind,
    name: String,
  ) -> impl Future<Output = Result<Artifact, Self::Error>> + Send + '_;

  /// Append a content version; `seq` is assigned as latest + 1.
  fn add_artifact_version(
    &self,
    artifact_id: Uuid,
    content: String,
    recorded_hash: Option<String>,
  ) -> impl Future<Output = Result<ArtifactVersion, Self::Error>> + Send + '_;

  fn get_artifact(
    &self,
    artifact_id: Uuid,
  ) -> impl Future<Output = Result<Option<Artifact>, Self::Error>> + Send + '_;

  /// One version by id — how a snapshot's pinned versions are read back.
  fn get_artifact_version(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Option<ArtifactVersion>, Self::Error>> + Send + '_;

  /// All versions of an artifact, oldest first.
  fn artifact_versions(
    &self,
    artifact_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ArtifactVersion>, Self::Error>> + Send + '_;

  /// Every artifact of a project joined with its latest version.
  fn list_artifacts(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ArtifactWithLatest>, Self::Error>> + Send + '_;

  fn set_artifact_pinned(
    &self,
    artifact_id: Uuid,
    pinned: bool,
  ) -> impl Future<Output = Result<Artifact, Self::Error>> + Send + '_;

  // ── Context sets ──────────────────────────────────────────────────────

  /// Create or replace the set with this `(project, name)`. When
  /// `is_default` is set, any other default is cleared in the same
  /// transaction.
  fn save_context_set(
    &self,
    input: NewContextSet,
  ) -> impl Future<Output = Result<ContextSet, Self::Error>> + Send + '_;

  fn default_context_set(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Option<ContextSet>, Self::Error>> + Send + '_;

  fn list_context_sets(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ContextSet>, Self::Error>> + Send + '_;

  // ── Canon snapshots ───────────────────────────────────────────────────

  /// Insert a new active snapshot, superseding any prior active one, and
  /// rebind all non-locked, non-deleted episodes to it (`invalidated`
  /// episodes return to `pending`). One transaction: there is no window
  /// with two active snapshots or with an episode bound to a superseded
  /// snapshot.
  fn create_snapshot(
    &self,
    project_id: Uuid,
    fact_hash: String,
    episode_count: u32,
    artifact_versions: Vec<Uuid>,
  ) -> impl Future<Output = Result<CanonSnapshot, Self::Error>> + Send + '_;

  fn active_snapshot(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Option<CanonSnapshot>, Self::Error>> + Send + '_;

  fn get_snapshot(
    &self,
    snapshot_id: Uuid,
  ) -> impl Future<Output = Result<Option<CanonSnapshot>, Self::Error>> + Send + '_;

  /// All snapshots of a project, newest first. Superseded snapshots are
  /// retained indefinitely for audit.
  fn list_snapshots(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CanonSnapshot>, Self::Error>> + Send + '_;

  // ── Episodes ──────────────────────────────────────────────────────────

  /// Append `count` episodes in `pending`, indices continuing after the
  /// project's current maximum.
  fn append_episodes(
    &self,
    project_id: Uuid,
    snapshot_id: Uuid,
    count: u32,
  ) -> impl Future<Output = Result<Vec<Episode>, Self::Error>> + Send + '_;

  fn get_episode(
    &self,
    project_id: Uuid,
    index: u32,
  ) -> impl Future<Output = Result<Option<Episode>, Self::Error>> + Send + '_;

  fn get_episode_by_id(
    &self,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<Option<Episode>, Self::Error>> + Send + '_;

  /// Episodes ordered by index. Soft-deleted rows are excluded unless
  /// `include_deleted`.
  fn list_episodes(
    &self,
    project_id: Uuid,
    include_deleted: bool,
  ) -> impl Future<Output = Result<Vec<Episode>, Self::Error>> + Send + '_;

  /// The episode currently flagged as season template, if any.
  fn template_episode(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Option<Episode>, Self::Error>> + Send + '_;

  /// Conditionally move an episode into `generating` and clear its last
  /// error. Fails unless the current status is `pending`, `complete`,
  /// `needs_revision`, or `error`.
  fn begin_generating(
    &self,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<Episode, Self::Error>> + Send + '_;

  /// Conditionally move a `generating` episode to `complete` or
  /// `needs_revision`, recording the backend's note if any.
  fn complete_episode(
    &self,
    episode_id: Uuid,
    status: EpisodeStatus,
    note: Option<String>,
  ) -> impl Future<Output = Result<Episode, Self::Error>> + Send + '_;

  /// Conditionally move a `generating` episode to `error`.
  fn fail_episode(
    &self,
    episode_id: Uuid,
    reason: String,
    retryable: bool,
  ) -> impl Future<Output = Result<Episode, Self::Error>> + Send + '_;

  /// Move every non-locked, non-deleted episode of the project to
  /// `invalidated`. Returns the number of episodes moved. Called when the
  /// active snapshot's hash diverges from the resolver's.
  fn invalidate_unlocked(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Conditionally lock: requires status `complete` or `needs_revision`
  /// and a null `locked_at`. Sets both in one statement.
  fn mark_locked(
    &self,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<Episode, Self::Error>> + Send + '_;

  /// Atomically make `episode_id` the only template of the project: one
  /// transaction verifies the target is locked, clears the flag everywhere,
  /// and sets it on the target. No transient two-template state.
  fn set_template(
    &self,
    project_id: Uuid,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<Episode, Self::Error>> + Send + '_;

  /// Conditionally soft-delete (fails if already deleted). The row and its
  /// history survive; list reads skip it.
  fn soft_delete_episode(
    &self,
    episode_id: Uuid,
    reason: Option<String>,
  ) -> impl Future<Output = Result<Episode, Self::Error>> + Send + '_;

  /// Conditionally restore a soft-deleted episode.
  fn restore_episode(
    &self,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<Episode, Self::Error>> + Send + '_;

  /// Irreversibly destroy an episode and its versions, lock events,
  /// continuity note, and patch runs. One transaction.
  fn purge_episode(
    &self,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Episode content versions ──────────────────────────────────────────

  /// Append a content version; `seq` is assigned as latest + 1.
  fn add_episode_version(
    &self,
    episode_id: Uuid,
    content: String,
  ) -> impl Future<Output = Result<EpisodeVersion, Self::Error>> + Send + '_;

  /// All versions, oldest first.
  fn episode_versions(
    &self,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<Vec<EpisodeVersion>, Self::Error>> + Send + '_;

  fn latest_episode_version(
    &self,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<Option<EpisodeVersion>, Self::Error>> + Send + '_;

  // ── Lock events and continuity ────────────────────────────────────────

  fn insert_lock_event(
    &self,
    input: NewLockEvent,
  ) -> impl Future<Output = Result<LockEvent, Self::Error>> + Send + '_;

  /// All lock events for an episode, oldest first.
  fn lock_events(
    &self,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LockEvent>, Self::Error>> + Send + '_;

  fn latest_lock_event(
    &self,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<Option<LockEvent>, Self::Error>> + Send + '_;

  /// Insert or replace the episode's continuity note.
  fn upsert_continuity_note(
    &self,
    note: ContinuityNote,
  ) -> impl Future<Output = Result<ContinuityNote, Self::Error>> + Send + '_;

  fn continuity_note(
    &self,
    episode_id: Uuid,
  ) -> impl Future<Output = Result<Option<ContinuityNote>, Self::Error>> + Send + '_;

  // ── Retcons ───────────────────────────────────────────────────────────

  fn insert_change_event(
    &self,
    project_id: Uuid,
    summary: String,
  ) -> impl Future<Output = Result<ChangeEvent, Self::Error>> + Send + '_;

  fn get_change_event(
    &self,
    change_event_id: Uuid,
  ) -> impl Future<Output = Result<Option<ChangeEvent>, Self::Error>> + Send + '_;

  fn list_change_events(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ChangeEvent>, Self::Error>> + Send + '_;

  /// Record the analysed affected-episode set on a change event.
  fn set_change_affected(
    &self,
    change_event_id: Uuid,
    indices: Vec<u32>,
  ) -> impl Future<Output = Result<ChangeEvent, Self::Error>> + Send + '_;

  /// Create one pending run per `(episode_id, index)` pair.
  fn insert_patch_runs(
    &self,
    change_event_id: Uuid,
    episodes: Vec<(Uuid, u32)>,
  ) -> impl Future<Output = Result<Vec<PatchRun>, Self::Error>> + Send + '_;

  fn get_patch_run(
    &self,
    patch_run_id: Uuid,
  ) -> impl Future<Output = Result<Option<PatchRun>, Self::Error>> + Send + '_;

  fn list_patch_runs(
    &self,
    change_event_id: Uuid,
  ) -> impl Future<Output = Result<Vec<PatchRun>, Self::Error>> + Send + '_;

  /// Pending runs across all of a project's change events, oldest first.
  /// The batch runner drains these.
  fn pending_patch_runs(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Vec<PatchRun>, Self::Error>> + Send + '_;

  /// Conditionally move `pending → running`.
  fn begin_patch(
    &self,
    patch_run_id: Uuid,
  ) -> impl Future<Output = Result<PatchRun, Self::Error>> + Send + '_;

  /// Conditionally move `running → complete`, storing the proposal.
  fn complete_patch(
    &self,
    patch_run_id: Uuid,
    proposed_content: String,
  ) -> impl Future<Output = Result<PatchRun, Self::Error>> + Send + '_;

  /// Conditionally move `running → pending` after a failed proposal
  /// attempt, so a later tick can retry.
  fn reset_patch(
    &self,
    patch_run_id: Uuid,
  ) -> impl Future<Output = Result<PatchRun, Self::Error>> + Send + '_;

  /// Conditionally settle a run as applied. Requires `complete`.
  fn apply_patch_run(
    &self,
    patch_run_id: Uuid,
  ) -> impl Future<Output = Result<PatchRun, Self::Error>> + Send + '_;

  /// Conditionally settle a run as rejected, recording the reason. Requires
  /// `pending` or `complete`; the target episode is untouched.
  fn reject_patch_run(
    &self,
    patch_run_id: Uuid,
    reason: String,
  ) -> impl Future<Output = Result<PatchRun, Self::Error>> + Send + '_;

  // ── Batch cursor ──────────────────────────────────────────────────────

  /// Start (or restart) the project's batch at `from_index`. Fails if a
  /// cursor is currently `running`; a terminal cursor is replaced.
  fn start_batch(
    &self,
    project_id: Uuid,
    from_index: u32,
  ) -> impl Future<Output = Result<BatchCursor, Self::Error>> + Send + '_;

  fn batch_cursor(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Option<BatchCursor>, Self::Error>> + Send + '_;

  /// Conditionally advance a `running` cursor to `next_index`.
  fn advance_batch(
    &self,
    project_id: Uuid,
    next_index: u32,
  ) -> impl Future<Output = Result<BatchCursor, Self::Error>> + Send + '_;

  /// Conditionally move a `running` cursor to a terminal status.
  fn finish_batch(
    &self,
    project_id: Uuid,
    status: BatchStatus,
  ) -> impl Future<Output = Result<BatchCursor, Self::Error>> + Send + '_;

  /// Conditionally set `stop_requested` on a `running` cursor.
  fn request_batch_stop(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<BatchCursor, Self::Error>> + Send + '_;
}
