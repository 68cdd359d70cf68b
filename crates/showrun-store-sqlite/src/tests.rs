//! Integration tests for `SqliteStore` against an in-memory database.

use showrun_core::{
  artifact::ArtifactKind,
  batch::BatchStatus,
  context::NewContextSet,
  episode::{
    ContinuityMetadata, ContinuityNote, Episode, EpisodeStatus, LockSource,
    NewLockEvent,
  },
  facts::{FactKey, FactValue},
  project::{FormatPreset, NewProject, Project, ProjectSettings},
  retcon::PatchStatus,
  snapshot::{CanonSnapshot, SnapshotStatus},
  store::PipelineStore,
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn project(s: &SqliteStore) -> Project {
  s.add_project(NewProject {
    title:    "Test Season".into(),
    settings: ProjectSettings::default(),
  })
  .await
  .unwrap()
}

async fn snapshot(s: &SqliteStore, project_id: Uuid) -> CanonSnapshot {
  s.create_snapshot(project_id, "hash-1".into(), 3, vec![])
    .await
    .unwrap()
}

/// A project with an active snapshot and `count` pending episodes.
async fn season(
  s: &SqliteStore,
  count: u32,
) -> (Project, CanonSnapshot, Vec<Episode>) {
  let p = project(s).await;
  let snap = snapshot(s, p.project_id).await;
  let eps = s
    .append_episodes(p.project_id, snap.snapshot_id, count)
    .await
    .unwrap();
  (p, snap, eps)
}

/// Drive an episode through generation and an initial lock, with a version,
/// a lock event, and a continuity note — the full freeze an engine performs.
async fn lock(s: &SqliteStore, episode: &Episode) -> Episode {
  s.begin_generating(episode.episode_id).await.unwrap();
  let version = s
    .add_episode_version(episode.episode_id, format!("draft {}", episode.index))
    .await
    .unwrap();
  s.complete_episode(episode.episode_id, EpisodeStatus::Complete, None)
    .await
    .unwrap();

  let event = s
    .insert_lock_event(NewLockEvent {
      episode_id:   episode.episode_id,
      version_id:   version.version_id,
      content:      version.content.clone(),
      source:       LockSource::Initial,
      patch_run_id: None,
    })
    .await
    .unwrap();
  s.upsert_continuity_note(ContinuityNote {
    episode_id:    episode.episode_id,
    tail_excerpt:  version.content.clone(),
    metadata:      ContinuityMetadata {
      index:       episode.index,
      version_seq: version.seq,
      word_count:  2,
      locked_at:   event.locked_at,
    },
    lock_event_id: event.lock_event_id,
    updated_at:    event.locked_at,
  })
  .await
  .unwrap();

  s.mark_locked(episode.episode_id).await.unwrap()
}

// ─── Projects ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_project() {
  let s = store().await;

  let created = project(&s).await;
  let fetched = s.get_project(created.project_id).await.unwrap().unwrap();
  assert_eq!(fetched.project_id, created.project_id);
  assert_eq!(fetched.title, "Test Season");
  assert_eq!(fetched.settings, ProjectSettings::default());
}

#[tokio::test]
async fn get_project_missing_returns_none() {
  let s = store().await;
  assert!(s.get_project(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn update_settings_roundtrip() {
  let s = store().await;
  let p = project(&s).await;

  let mut settings = ProjectSettings {
    preset: Some(FormatPreset::WebSerial),
    ..Default::default()
  };
  settings
    .overrides
    .insert(FactKey::SeasonEpisodeCount, FactValue::Int(6));

  let updated = s.update_settings(p.project_id, settings.clone()).await.unwrap();
  assert_eq!(updated.settings, settings);

  let fetched = s.get_project(p.project_id).await.unwrap().unwrap();
  assert_eq!(fetched.settings.preset, Some(FormatPreset::WebSerial));
  assert_eq!(
    fetched.settings.overrides.get(&FactKey::SeasonEpisodeCount),
    Some(&FactValue::Int(6))
  );
}

#[tokio::test]
async fn update_settings_missing_project() {
  let s = store().await;
  let err = s
    .update_settings(Uuid::new_v4(), ProjectSettings::default())
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::ProjectNotFound(_)));
}

// ─── Artifacts ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_artifact_is_idempotent() {
  let s = store().await;
  let p = project(&s).await;

  let first = s
    .upsert_artifact(p.project_id, ArtifactKind::IdeaBrief, "brief".into())
    .await
    .unwrap();
  let second = s
    .upsert_artifact(p.project_id, ArtifactKind::IdeaBrief, "brief".into())
    .await
    .unwrap();
  assert_eq!(first.artifact_id, second.artifact_id);

  let other = s
    .upsert_artifact(p.project_id, ArtifactKind::StyleGuide, "brief".into())
    .await
    .unwrap();
  assert_ne!(first.artifact_id, other.artifact_id);
}

#[tokio::test]
async fn artifact_versions_are_sequential() {
  let s = store().await;
  let p = project(&s).await;
  let artifact = s
    .upsert_artifact(p.project_id, ArtifactKind::EpisodeGrid, "season".into())
    .await
    .unwrap();

  let v1 = s
    .add_artifact_version(artifact.artifact_id, "v1".into(), Some("h1".into()))
    .await
    .unwrap();
  let v2 = s
    .add_artifact_version(artifact.artifact_id, "v2".into(), None)
    .await
    .unwrap();
  assert_eq!(v1.seq, 1);
  assert_eq!(v2.seq, 2);

  let versions = s.artifact_versions(artifact.artifact_id).await.unwrap();
  assert_eq!(versions.len(), 2);
  assert_eq!(versions[0].recorded_hash.as_deref(), Some("h1"));

  let fetched = s.get_artifact_version(v2.version_id).await.unwrap().unwrap();
  assert_eq!(fetched.content, "v2");
}

#[tokio::test]
async fn add_version_to_missing_artifact() {
  let s = store().await;
  let err = s
    .add_artifact_version(Uuid::new_v4(), "content".into(), None)
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::ArtifactNotFound(_)));
}

#[tokio::test]
async fn list_artifacts_joins_latest_version() {
  let s = store().await;
  let p = project(&s).await;

  let grid = s
    .upsert_artifact(p.project_id, ArtifactKind::EpisodeGrid, "season".into())
    .await
    .unwrap();
  s.add_artifact_version(grid.artifact_id, "old".into(), None)
    .await
    .unwrap();
  s.add_artifact_version(grid.artifact_id, "new".into(), None)
    .await
    .unwrap();
  s.upsert_artifact(p.project_id, ArtifactKind::CharacterBible, "cast".into())
    .await
    .unwrap();

  let listed = s.list_artifacts(p.project_id).await.unwrap();
  assert_eq!(listed.len(), 2);

  let bible = listed
    .iter()
    .find(|a| a.artifact.kind == ArtifactKind::CharacterBible)
    .unwrap();
  assert!(bible.latest.is_none());

  let latest = listed
    .iter()
    .find(|a| a.artifact.kind == ArtifactKind::EpisodeGrid)
    .unwrap();
  assert_eq!(latest.latest.as_ref().unwrap().content, "new");
}

#[tokio::test]
async fn pin_and_unpin_artifact() {
  let s = store().await;
  let p = project(&s).await;
  let artifact = s
    .upsert_artifact(p.project_id, ArtifactKind::FormatRules, "rules".into())
    .await
    .unwrap();
  assert!(!artifact.pinned);

  let pinned = s.set_artifact_pinned(artifact.artifact_id, true).await.unwrap();
  assert!(pinned.pinned);
  let unpinned = s.set_artifact_pinned(artifact.artifact_id, false).await.unwrap();
  assert!(!unpinned.pinned);

  let err = s.set_artifact_pinned(Uuid::new_v4(), true).await.unwrap_err();
  assert!(matches!(err, crate::Error::ArtifactNotFound(_)));
}

// ─── Context sets ────────────────────────────────────────────────────────────

#[tokio::test]
async fn save_context_set_roundtrip() {
  let s = store().await;
  let p = project(&s).await;
  let artifact = s
    .upsert_artifact(p.project_id, ArtifactKind::IdeaBrief, "brief".into())
    .await
    .unwrap();

  let set = s
    .save_context_set(NewContextSet {
      project_id:   p.project_id,
      name:         "core".into(),
      is_default:   true,
      artifact_ids: vec![artifact.artifact_id],
    })
    .await
    .unwrap();
  assert!(set.is_default);
  assert_eq!(set.artifact_ids, vec![artifact.artifact_id]);

  let default = s.default_context_set(p.project_id).await.unwrap().unwrap();
  assert_eq!(default.set_id, set.set_id);
}

#[tokio::test]
async fn new_default_clears_previous_default() {
  let s = store().await;
  let p = project(&s).await;

  for name in ["first", "second"] {
    s.save_context_set(NewContextSet {
      project_id:   p.project_id,
      name:         name.into(),
      is_default:   true,
      artifact_ids: vec![],
    })
    .await
    .unwrap();
  }

  let sets = s.list_context_sets(p.project_id).await.unwrap();
  assert_eq!(sets.len(), 2);
  assert_eq!(sets.iter().filter(|set| set.is_default).count(), 1);

  let default = s.default_context_set(p.project_id).await.unwrap().unwrap();
  assert_eq!(default.name, "second");
}

#[tokio::test]
async fn saving_same_name_replaces_in_place() {
  let s = store().await;
  let p = project(&s).await;
  let artifact = s
    .upsert_artifact(p.project_id, ArtifactKind::StyleGuide, "tone".into())
    .await
    .unwrap();

  let first = s
    .save_context_set(NewContextSet {
      project_id:   p.project_id,
      name:         "core".into(),
      is_default:   false,
      artifact_ids: vec![],
    })
    .await
    .unwrap();
  let second = s
    .save_context_set(NewContextSet {
      project_id:   p.project_id,
      name:         "core".into(),
      is_default:   true,
      artifact_ids: vec![artifact.artifact_id],
    })
    .await
    .unwrap();

  assert_eq!(first.set_id, second.set_id);
  assert_eq!(s.list_context_sets(p.project_id).await.unwrap().len(), 1);
  assert!(second.is_default);
}

// ─── Canon snapshots ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_snapshot_supersedes_previous() {
  let s = store().await;
  let p = project(&s).await;

  let first = snapshot(&s, p.project_id).await;
  assert_eq!(first.seq, 1);
  assert_eq!(first.status, SnapshotStatus::Active);

  let second = s
    .create_snapshot(p.project_id, "hash-2".into(), 3, vec![])
    .await
    .unwrap();
  assert_eq!(second.seq, 2);

  let active = s.active_snapshot(p.project_id).await.unwrap().unwrap();
  assert_eq!(active.snapshot_id, second.snapshot_id);

  let old = s.get_snapshot(first.snapshot_id).await.unwrap().unwrap();
  assert_eq!(old.status, SnapshotStatus::Superseded);

  let all = s.list_snapshots(p.project_id).await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[0].seq, 2);
}

#[tokio::test]
async fn snapshot_rebinds_unlocked_and_revives_invalidated() {
  let s = store().await;
  let (p, old_snap, eps) = season(&s, 3).await;

  s.invalidate_unlocked(p.project_id).await.unwrap();
  let new_snap = s
    .create_snapshot(p.project_id, "hash-2".into(), 3, vec![])
    .await
    .unwrap();

  for ep in &eps {
    let fetched = s.get_episode_by_id(ep.episode_id).await.unwrap().unwrap();
    assert_eq!(fetched.snapshot_id, new_snap.snapshot_id);
    assert_eq!(fetched.status, EpisodeStatus::Pending);
    assert_ne!(fetched.snapshot_id, old_snap.snapshot_id);
  }
}

#[tokio::test]
async fn snapshot_leaves_locked_episodes_bound() {
  let s = store().await;
  let (p, old_snap, eps) = season(&s, 2).await;

  let locked = lock(&s, &eps[0]).await;
  assert_eq!(locked.status, EpisodeStatus::Locked);

  let new_snap = s
    .create_snapshot(p.project_id, "hash-2".into(), 2, vec![])
    .await
    .unwrap();

  let still_locked = s.get_episode_by_id(eps[0].episode_id).await.unwrap().unwrap();
  assert_eq!(still_locked.snapshot_id, old_snap.snapshot_id);
  assert_eq!(still_locked.status, EpisodeStatus::Locked);

  let rebound = s.get_episode_by_id(eps[1].episode_id).await.unwrap().unwrap();
  assert_eq!(rebound.snapshot_id, new_snap.snapshot_id);
}

#[tokio::test]
async fn create_snapshot_missing_project() {
  let s = store().await;
  let err = s
    .create_snapshot(Uuid::new_v4(), "hash".into(), 1, vec![])
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::ProjectNotFound(_)));
}

// ─── Episodes ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_episodes_indices_continue() {
  let s = store().await;
  let (p, snap, eps) = season(&s, 3).await;
  assert_eq!(
    eps.iter().map(|e| e.index).collect::<Vec<_>>(),
    vec![1, 2, 3]
  );

  let more = s
    .append_episodes(p.project_id, snap.snapshot_id, 2)
    .await
    .unwrap();
  assert_eq!(more.iter().map(|e| e.index).collect::<Vec<_>>(), vec![4, 5]);

  let listed = s.list_episodes(p.project_id, false).await.unwrap();
  assert_eq!(listed.len(), 5);
  assert_eq!(listed.last().unwrap().index, 5);
}

#[tokio::test]
async fn soft_deleted_indices_are_never_reissued() {
  let s = store().await;
  let (p, snap, eps) = season(&s, 3).await;

  s.soft_delete_episode(eps[2].episode_id, None).await.unwrap();
  let more = s
    .append_episodes(p.project_id, snap.snapshot_id, 1)
    .await
    .unwrap();
  assert_eq!(more[0].index, 4);
}

#[tokio::test]
async fn begin_generating_from_pending() {
  let s = store().await;
  let (_, _, eps) = season(&s, 1).await;

  let generating = s.begin_generating(eps[0].episode_id).await.unwrap();
  assert_eq!(generating.status, EpisodeStatus::Generating);
  assert!(generating.last_error.is_none());
}

#[tokio::test]
async fn begin_generating_refuses_generating() {
  let s = store().await;
  let (_, _, eps) = season(&s, 1).await;

  s.begin_generating(eps[0].episode_id).await.unwrap();
  let err = s.begin_generating(eps[0].episode_id).await.unwrap_err();
  assert!(matches!(err, crate::Error::EpisodeConflict { .. }));
}

#[tokio::test]
async fn begin_generating_missing_episode() {
  let s = store().await;
  let err = s.begin_generating(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, crate::Error::EpisodeNotFound(_)));
}

#[tokio::test]
async fn complete_episode_records_note() {
  let s = store().await;
  let (_, _, eps) = season(&s, 1).await;

  s.begin_generating(eps[0].episode_id).await.unwrap();
  let done = s
    .complete_episode(
      eps[0].episode_id,
      EpisodeStatus::NeedsRevision,
      Some("pacing drags".into()),
    )
    .await
    .unwrap();
  assert_eq!(done.status, EpisodeStatus::NeedsRevision);
  assert_eq!(done.last_error.as_deref(), Some("pacing drags"));
}

#[tokio::test]
async fn complete_requires_generating() {
  let s = store().await;
  let (_, _, eps) = season(&s, 1).await;

  let err = s
    .complete_episode(eps[0].episode_id, EpisodeStatus::Complete, None)
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::EpisodeConflict { .. }));
}

#[tokio::test]
async fn fail_episode_records_reason_and_retryability() {
  let s = store().await;
  let (_, _, eps) = season(&s, 1).await;

  s.begin_generating(eps[0].episode_id).await.unwrap();
  let failed = s
    .fail_episode(eps[0].episode_id, "backend timeout".into(), true)
    .await
    .unwrap();
  assert_eq!(failed.status, EpisodeStatus::Error);
  assert_eq!(failed.last_error.as_deref(), Some("backend timeout"));
  assert!(failed.retryable);

  // A retry clears the recorded error on entry.
  let retried = s.begin_generating(eps[0].episode_id).await.unwrap();
  assert!(retried.last_error.is_none());
}

#[tokio::test]
async fn invalidate_unlocked_skips_locked_and_deleted() {
  let s = store().await;
  let (p, _, eps) = season(&s, 3).await;

  lock(&s, &eps[0]).await;
  s.soft_delete_episode(eps[2].episode_id, None).await.unwrap();

  let moved = s.invalidate_unlocked(p.project_id).await.unwrap();
  assert_eq!(moved, 1);

  let locked = s.get_episode_by_id(eps[0].episode_id).await.unwrap().unwrap();
  assert_eq!(locked.status, EpisodeStatus::Locked);
  let invalidated = s.get_episode_by_id(eps[1].episode_id).await.unwrap().unwrap();
  assert_eq!(invalidated.status, EpisodeStatus::Invalidated);
}

#[tokio::test]
async fn mark_locked_requires_reviewable_status() {
  let s = store().await;
  let (_, _, eps) = season(&s, 1).await;

  let err = s.mark_locked(eps[0].episode_id).await.unwrap_err();
  assert!(matches!(err, crate::Error::EpisodeConflict { .. }));

  let locked = lock(&s, &eps[0]).await;
  assert_eq!(locked.status, EpisodeStatus::Locked);
  assert!(locked.locked_at.is_some());

  // Locked is terminal for mark_locked.
  let err = s.mark_locked(eps[0].episode_id).await.unwrap_err();
  assert!(matches!(err, crate::Error::EpisodeConflict { .. }));
}

#[tokio::test]
async fn set_template_requires_locked() {
  let s = store().await;
  let (p, _, eps) = season(&s, 2).await;

  let err = s
    .set_template(p.project_id, eps[0].episode_id)
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::NotLocked(_)));

  lock(&s, &eps[0]).await;
  let template = s
    .set_template(p.project_id, eps[0].episode_id)
    .await
    .unwrap();
  assert!(template.is_template);
}

#[tokio::test]
async fn set_template_moves_the_flag() {
  let s = store().await;
  let (p, _, eps) = season(&s, 2).await;

  lock(&s, &eps[0]).await;
  lock(&s, &eps[1]).await;

  s.set_template(p.project_id, eps[0].episode_id).await.unwrap();
  s.set_template(p.project_id, eps[1].episode_id).await.unwrap();

  let template = s.template_episode(p.project_id).await.unwrap().unwrap();
  assert_eq!(template.episode_id, eps[1].episode_id);

  let listed = s.list_episodes(p.project_id, false).await.unwrap();
  assert_eq!(listed.iter().filter(|e| e.is_template).count(), 1);
}

#[tokio::test]
async fn soft_delete_restore_cycle() {
  let s = store().await;
  let (p, _, eps) = season(&s, 2).await;

  let deleted = s
    .soft_delete_episode(eps[0].episode_id, Some("cut for length".into()))
    .await
    .unwrap();
  assert!(deleted.is_deleted());
  assert_eq!(deleted.delete_reason.as_deref(), Some("cut for length"));

  assert_eq!(s.list_episodes(p.project_id, false).await.unwrap().len(), 1);
  assert_eq!(s.list_episodes(p.project_id, true).await.unwrap().len(), 2);

  let err = s
    .soft_delete_episode(eps[0].episode_id, None)
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::AlreadyDeleted(_)));

  let restored = s.restore_episode(eps[0].episode_id).await.unwrap();
  assert!(!restored.is_deleted());
  assert!(restored.delete_reason.is_none());
  assert_eq!(s.list_episodes(p.project_id, false).await.unwrap().len(), 2);

  let err = s.restore_episode(eps[1].episode_id).await.unwrap_err();
  assert!(matches!(err, crate::Error::NotDeleted(_)));
}

#[tokio::test]
async fn purge_removes_episode_and_history() {
  let s = store().await;
  let (_, _, eps) = season(&s, 1).await;

  // Build up history worth purging.
  lock(&s, &eps[0]).await;
  assert!(!s.lock_events(eps[0].episode_id).await.unwrap().is_empty());

  s.purge_episode(eps[0].episode_id).await.unwrap();

  assert!(s.get_episode_by_id(eps[0].episode_id).await.unwrap().is_none());
  assert!(s.episode_versions(eps[0].episode_id).await.unwrap().is_empty());
  assert!(s.lock_events(eps[0].episode_id).await.unwrap().is_empty());
  assert!(s.continuity_note(eps[0].episode_id).await.unwrap().is_none());

  let err = s.purge_episode(eps[0].episode_id).await.unwrap_err();
  assert!(matches!(err, crate::Error::EpisodeNotFound(_)));
}

// ─── Episode versions ────────────────────────────────────────────────────────

#[tokio::test]
async fn episode_versions_are_sequential() {
  let s = store().await;
  let (_, _, eps) = season(&s, 1).await;

  let v1 = s
    .add_episode_version(eps[0].episode_id, "draft one".into())
    .await
    .unwrap();
  let v2 = s
    .add_episode_version(eps[0].episode_id, "draft two".into())
    .await
    .unwrap();
  assert_eq!((v1.seq, v2.seq), (1, 2));

  let latest = s
    .latest_episode_version(eps[0].episode_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(latest.content, "draft two");

  let err = s
    .add_episode_version(Uuid::new_v4(), "orphan".into())
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::EpisodeNotFound(_)));
}

// ─── Lock events and continuity ──────────────────────────────────────────────

#[tokio::test]
async fn lock_events_accumulate_and_latest_wins() {
  let s = store().await;
  let (_, _, eps) = season(&s, 1).await;

  lock(&s, &eps[0]).await;
  let amended = s
    .add_episode_version(eps[0].episode_id, "amended draft".into())
    .await
    .unwrap();
  s.insert_lock_event(NewLockEvent {
    episode_id:   eps[0].episode_id,
    version_id:   amended.version_id,
    content:      amended.content.clone(),
    source:       LockSource::Amendment,
    patch_run_id: None,
  })
  .await
  .unwrap();

  let events = s.lock_events(eps[0].episode_id).await.unwrap();
  assert_eq!(events.len(), 2);
  assert_eq!(events[0].source, LockSource::Initial);

  let latest = s
    .latest_lock_event(eps[0].episode_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(latest.source, LockSource::Amendment);
  assert_eq!(latest.content, "amended draft");
}

#[tokio::test]
async fn continuity_note_is_replaced_on_upsert() {
  let s = store().await;
  let (_, _, eps) = season(&s, 1).await;

  let locked = lock(&s, &eps[0]).await;
  let first = s
    .continuity_note(eps[0].episode_id)
    .await
    .unwrap()
    .unwrap();

  let amended = s
    .add_episode_version(eps[0].episode_id, "amended tail".into())
    .await
    .unwrap();
  let event = s
    .insert_lock_event(NewLockEvent {
      episode_id:   eps[0].episode_id,
      version_id:   amended.version_id,
      content:      amended.content.clone(),
      source:       LockSource::Amendment,
      patch_run_id: None,
    })
    .await
    .unwrap();
  s.upsert_continuity_note(ContinuityNote {
    episode_id:    eps[0].episode_id,
    tail_excerpt:  "amended tail".into(),
    metadata:      ContinuityMetadata {
      index:       locked.index,
      version_seq: amended.seq,
      word_count:  2,
      locked_at:   event.locked_at,
    },
    lock_event_id: event.lock_event_id,
    updated_at:    event.locked_at,
  })
  .await
  .unwrap();

  let replaced = s
    .continuity_note(eps[0].episode_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(replaced.tail_excerpt, "amended tail");
  assert_eq!(replaced.metadata.version_seq, amended.seq);
  assert_ne!(replaced.lock_event_id, first.lock_event_id);
}

// ─── Retcons ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn change_event_roundtrip_and_affected() {
  let s = store().await;
  let p = project(&s).await;

  let event = s
    .insert_change_event(p.project_id, "the mentor was a spy all along".into())
    .await
    .unwrap();
  assert!(event.affected.is_none());

  let analysed = s
    .set_change_affected(event.change_event_id, vec![2, 5])
    .await
    .unwrap();
  assert_eq!(analysed.affected, Some(vec![2, 5]));

  let fetched = s
    .get_change_event(event.change_event_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fetched.summary, "the mentor was a spy all along");

  let listed = s.list_change_events(p.project_id).await.unwrap();
  assert_eq!(listed.len(), 1);

  let err = s
    .set_change_affected(Uuid::new_v4(), vec![1])
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::ChangeEventNotFound(_)));
}

#[tokio::test]
async fn patch_run_apply_lifecycle() {
  let s = store().await;
  let (p, _, eps) = season(&s, 2).await;
  let change = s
    .insert_change_event(p.project_id, "retcon".into())
    .await
    .unwrap();

  let runs = s
    .insert_patch_runs(
      change.change_event_id,
      vec![(eps[0].episode_id, 1), (eps[1].episode_id, 2)],
    )
    .await
    .unwrap();
  assert_eq!(runs.len(), 2);
  assert!(runs.iter().all(|r| r.status == PatchStatus::Pending));

  let run = &runs[0];
  let running = s.begin_patch(run.patch_run_id).await.unwrap();
  assert_eq!(running.status, PatchStatus::Running);

  let complete = s
    .complete_patch(run.patch_run_id, "amended content".into())
    .await
    .unwrap();
  assert_eq!(complete.status, PatchStatus::Complete);
  assert_eq!(complete.proposed_content.as_deref(), Some("amended content"));

  let applied = s.apply_patch_run(run.patch_run_id).await.unwrap();
  assert_eq!(applied.status, PatchStatus::Applied);
  assert!(applied.resolved_at.is_some());
}

#[tokio::test]
async fn patch_run_reject_from_pending() {
  let s = store().await;
  let (p, _, eps) = season(&s, 1).await;
  let change = s
    .insert_change_event(p.project_id, "retcon".into())
    .await
    .unwrap();
  let runs = s
    .insert_patch_runs(change.change_event_id, vec![(eps[0].episode_id, 1)])
    .await
    .unwrap();

  let rejected = s
    .reject_patch_run(runs[0].patch_run_id, "too invasive".into())
    .await
    .unwrap();
  assert_eq!(rejected.status, PatchStatus::Rejected);
  assert_eq!(rejected.reject_reason.as_deref(), Some("too invasive"));
  assert!(rejected.resolved_at.is_some());
}

#[tokio::test]
async fn patch_transitions_are_conditional() {
  let s = store().await;
  let (p, _, eps) = season(&s, 1).await;
  let change = s
    .insert_change_event(p.project_id, "retcon".into())
    .await
    .unwrap();
  let runs = s
    .insert_patch_runs(change.change_event_id, vec![(eps[0].episode_id, 1)])
    .await
    .unwrap();
  let id = runs[0].patch_run_id;

  // Applying a pending run skips the proposal and must fail.
  let err = s.apply_patch_run(id).await.unwrap_err();
  assert!(matches!(err, crate::Error::PatchConflict { .. }));

  s.begin_patch(id).await.unwrap();
  let err = s.begin_patch(id).await.unwrap_err();
  assert!(matches!(err, crate::Error::PatchConflict { .. }));

  // A failed proposal resets to pending so a later tick can retry.
  let reset = s.reset_patch(id).await.unwrap();
  assert_eq!(reset.status, PatchStatus::Pending);
  s.begin_patch(id).await.unwrap();

  let err = s.begin_patch(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, crate::Error::PatchRunNotFound(_)));
}

#[tokio::test]
async fn pending_patch_runs_span_change_events() {
  let s = store().await;
  let (p, _, eps) = season(&s, 2).await;

  let first = s
    .insert_change_event(p.project_id, "first retcon".into())
    .await
    .unwrap();
  let second = s
    .insert_change_event(p.project_id, "second retcon".into())
    .await
    .unwrap();
  s.insert_patch_runs(first.change_event_id, vec![(eps[0].episode_id, 1)])
    .await
    .unwrap();
  let later = s
    .insert_patch_runs(second.change_event_id, vec![(eps[1].episode_id, 2)])
    .await
    .unwrap();

  let pending = s.pending_patch_runs(p.project_id).await.unwrap();
  assert_eq!(pending.len(), 2);

  s.begin_patch(later[0].patch_run_id).await.unwrap();
  let pending = s.pending_patch_runs(p.project_id).await.unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].episode_index, 1);
}

// ─── Batch cursor ────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_batch_and_read_cursor() {
  let s = store().await;
  let p = project(&s).await;

  assert!(s.batch_cursor(p.project_id).await.unwrap().is_none());

  let cursor = s.start_batch(p.project_id, 1).await.unwrap();
  assert_eq!(cursor.next_index, 1);
  assert_eq!(cursor.status, BatchStatus::Running);
  assert!(!cursor.stop_requested);

  let read = s.batch_cursor(p.project_id).await.unwrap().unwrap();
  assert_eq!(read.next_index, 1);
}

#[tokio::test]
async fn start_batch_refuses_while_running() {
  let s = store().await;
  let p = project(&s).await;

  s.start_batch(p.project_id, 1).await.unwrap();
  let err = s.start_batch(p.project_id, 1).await.unwrap_err();
  assert!(matches!(err, crate::Error::BatchRunning(_)));
}

#[tokio::test]
async fn terminal_cursor_can_be_restarted() {
  let s = store().await;
  let p = project(&s).await;

  s.start_batch(p.project_id, 1).await.unwrap();
  s.advance_batch(p.project_id, 2).await.unwrap();
  let stopped = s.finish_batch(p.project_id, BatchStatus::Stopped).await.unwrap();
  assert_eq!(stopped.status, BatchStatus::Stopped);

  let restarted = s.start_batch(p.project_id, 2).await.unwrap();
  assert_eq!(restarted.status, BatchStatus::Running);
  assert_eq!(restarted.next_index, 2);
  assert!(!restarted.stop_requested);
}

#[tokio::test]
async fn cursor_mutations_require_running() {
  let s = store().await;
  let p = project(&s).await;

  let err = s.advance_batch(p.project_id, 2).await.unwrap_err();
  assert!(matches!(err, crate::Error::BatchNotRunning(_)));

  s.start_batch(p.project_id, 1).await.unwrap();
  s.finish_batch(p.project_id, BatchStatus::Done).await.unwrap();

  let err = s.advance_batch(p.project_id, 2).await.unwrap_err();
  assert!(matches!(err, crate::Error::BatchNotRunning(_)));
  let err = s.request_batch_stop(p.project_id).await.unwrap_err();
  assert!(matches!(err, crate::Error::BatchNotRunning(_)));
  let err = s
    .finish_batch(p.project_id, BatchStatus::Stopped)
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::BatchNotRunning(_)));
}

#[tokio::test]
async fn stop_request_is_recorded() {
  let s = store().await;
  let p = project(&s).await;

  s.start_batch(p.project_id, 1).await.unwrap();
  let cursor = s.request_batch_stop(p.project_id).await.unwrap();
  assert!(cursor.stop_requested);
  assert_eq!(cursor.status, BatchStatus::Running);
}
