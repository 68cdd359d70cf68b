//! Artifact recording, staleness reporting, pinning, and context sets.

use serde::Serialize;
use showrun_core::{
  artifact::{Artifact, ArtifactKind, ArtifactVersion, ArtifactWithLatest},
  context::{ContextSet, NewContextSet},
  facts::resolve,
  generate::{Generator, LockAuditor},
  store::PipelineStore,
};
use uuid::Uuid;

use crate::{Error, Pipeline, Result};

// ─── Report types ─────────────────────────────────────────────────────────────

/// One artifact with its latest version and a staleness verdict against the
/// current resolver hash.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactReport {
  pub artifact: Artifact,
  pub latest:   Option<ArtifactVersion>,
  pub stale:    bool,
}

/// The active snapshot's validity against the current resolver hash.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotHealth {
  pub snapshot_id: Uuid,
  pub seq:         i64,
  pub fact_hash:   String,
  pub valid:       bool,
}

/// Everything an operator needs to decide whether to re-snapshot: the current
/// hash, the active snapshot's validity, and per-artifact staleness.
#[derive(Debug, Clone, Serialize)]
pub struct StalenessReport {
  pub project_id:   Uuid,
  pub current_hash: String,
  pub snapshot:     Option<SnapshotHealth>,
  pub artifacts:    Vec<ArtifactReport>,
}

// ─── Operations ───────────────────────────────────────────────────────────────

impl<S, G, A> Pipeline<S, G, A>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  /// Append a content version to the `(kind, name)` artifact, creating the
  /// artifact on first write. The version is stamped with the resolver hash
  /// in force at recording time, which is what staleness checks compare
  /// against later.
  pub async fn record_artifact(
    &self,
    project_id: Uuid,
    kind: ArtifactKind,
    name: String,
    content: String,
  ) -> Result<ArtifactWithLatest> {
    let name = name.trim().to_string();
    if name.is_empty() {
      return Err(Error::EmptyName);
    }
    let project = self.require_project(project_id).await?;
    let qualifications = resolve(&project.settings);

    let artifact = self
      .store
      .upsert_artifact(project_id, kind, name)
      .await
      .map_err(Error::store)?;
    let version = self
      .store
      .add_artifact_version(artifact.artifact_id, content, Some(qualifications.hash))
      .await
      .map_err(Error::store)?;
    tracing::info!(
      %project_id,
      artifact_id = %artifact.artifact_id,
      kind = %artifact.kind.as_str(),
      seq = version.seq,
      "artifact version recorded"
    );
    Ok(ArtifactWithLatest { artifact, latest: Some(version) })
  }

  /// Per-artifact staleness plus the active snapshot's validity.
  pub async fn staleness_report(&self, project_id: Uuid) -> Result<StalenessReport> {
    let project = self.require_project(project_id).await?;
    let qualifications = resolve(&project.settings);

    let artifacts = self
      .store
      .list_artifacts(project_id)
      .await
      .map_err(Error::store)?
      .into_iter()
      .map(|entry| ArtifactReport {
        stale:    entry.is_stale(&qualifications.hash),
        latest:   entry.latest,
        artifact: entry.artifact,
      })
      .collect();

    let snapshot = self
      .store
      .active_snapshot(project_id)
      .await
      .map_err(Error::store)?
      .map(|snapshot| SnapshotHealth {
        snapshot_id: snapshot.snapshot_id,
        seq:         snapshot.seq,
        valid:       snapshot.is_valid(&qualifications.hash),
        fact_hash:   snapshot.fact_hash,
      });

    Ok(StalenessReport {
      project_id,
      current_hash: qualifications.hash,
      snapshot,
      artifacts,
    })
  }

  /// Pin or unpin an artifact. Pinned artifacts are always part of the
  /// generation context, ahead of any context set.
  pub async fn pin_artifact(
    &self,
    project_id: Uuid,
    artifact_id: Uuid,
    pinned: bool,
  ) -> Result<Artifact> {
    self.owned_artifact(project_id, artifact_id).await?;
    self
      .store
      .set_artifact_pinned(artifact_id, pinned)
      .await
      .map_err(Error::store)
  }

  /// Create or replace a named context set. Every referenced artifact must
  /// belong to the project.
  pub async fn save_context_set(
    &self,
    project_id: Uuid,
    name: String,
    artifact_ids: Vec<Uuid>,
    is_default: bool,
  ) -> Result<ContextSet> {
    let name = name.trim().to_string();
    if name.is_empty() {
      return Err(Error::EmptyName);
    }
    self.require_project(project_id).await?;
    for artifact_id in &artifact_ids {
      self.owned_artifact(project_id, *artifact_id).await?;
    }
    self
      .store
      .save_context_set(NewContextSet { project_id, name, is_default, artifact_ids })
      .await
      .map_err(Error::store)
  }

  pub async fn list_context_sets(&self, project_id: Uuid) -> Result<Vec<ContextSet>> {
    self.require_project(project_id).await?;
    self.store.list_context_sets(project_id).await.map_err(Error::store)
  }

  /// An artifact that exists and belongs to `project_id`.
  async fn owned_artifact(&self, project_id: Uuid, artifact_id: Uuid) -> Result<Artifact> {
    let artifact = self
      .store
      .get_artifact(artifact_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ArtifactNotFound(artifact_id))?;
    if artifact.project_id != project_id {
      return Err(Error::ArtifactNotFound(artifact_id));
    }
    Ok(artifact)
  }
}
