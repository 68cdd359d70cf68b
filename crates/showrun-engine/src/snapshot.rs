//! Canon snapshot creation and supersession.

use showrun_core::{
  context::resolve_context,
  facts::resolve,
  generate::{Generator, LockAuditor},
  snapshot::CanonSnapshot,
  store::PipelineStore,
};
use uuid::Uuid;

use crate::{Error, Pipeline, Result};

impl<S, G, A> Pipeline<S, G, A>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  /// Resolve the current qualifications and context plan, then install a
  /// fresh active snapshot.
  ///
  /// Any previous active snapshot is superseded in the same transaction.
  /// Non-locked episodes rebind to the new snapshot, with `invalidated` ones
  /// returning to `pending`; locked episodes keep the snapshot they were
  /// generated under.
  pub async fn create_or_relock_snapshot(
    &self,
    project_id: Uuid,
  ) -> Result<CanonSnapshot> {
    let project = self.require_project(project_id).await?;
    let qualifications = resolve(&project.settings);

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

    let episode_count = qualifications.episode_count();
    let snapshot = self
      .store
      .create_snapshot(
        project_id,
        qualifications.hash,
        episode_count,
        plan.version_ids(),
      )
      .await
      .map_err(Error::store)?;
    tracing::info!(
      %project_id,
      snapshot_id = %snapshot.snapshot_id,
      seq = snapshot.seq,
      fact_hash = %snapshot.fact_hash,
      pinned_versions = snapshot.artifact_versions.len(),
      "canon snapshot installed"
    );
    Ok(snapshot)
  }

  /// All snapshots, newest first. Superseded rows are kept for audit.
  pub async fn list_snapshots(&self, project_id: Uuid) -> Result<Vec<CanonSnapshot>> {
    self.require_project(project_id).await?;
    self.store.list_snapshots(project_id).await.map_err(Error::store)
  }
}
