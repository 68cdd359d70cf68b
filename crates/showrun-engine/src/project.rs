//! Project lifecycle and qualification resolution.

use showrun_core::{
  facts::{Qualifications, resolve},
  generate::{Generator, LockAuditor},
  project::{NewProject, Project, ProjectSettings},
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
  pub async fn create_project(
    &self,
    title: String,
    settings: ProjectSettings,
  ) -> Result<Project> {
    let title = title.trim().to_string();
    if title.is_empty() {
      return Err(Error::EmptyTitle);
    }
    let project = self
      .store
      .add_project(NewProject { title, settings })
      .await
      .map_err(Error::store)?;
    tracing::info!(
      project_id = %project.project_id,
      title = %project.title,
      "project created"
    );
    Ok(project)
  }

  pub async fn get_project(&self, project_id: Uuid) -> Result<Project> {
    self.require_project(project_id).await
  }

  pub async fn list_projects(&self) -> Result<Vec<Project>> {
    self.store.list_projects().await.map_err(Error::store)
  }

  /// Replace a project's settings.
  ///
  /// The resolver hash moves with the settings; episodes go stale lazily, at
  /// the next generate or lock gate, not from this write.
  pub async fn update_settings(
    &self,
    project_id: Uuid,
    settings: ProjectSettings,
  ) -> Result<Project> {
    self.require_project(project_id).await?;
    let project = self
      .store
      .update_settings(project_id, settings)
      .await
      .map_err(Error::store)?;
    tracing::info!(%project_id, "project settings updated");
    Ok(project)
  }

  /// Resolve the project's qualification facts: preset and overrides layered
  /// over defaults, with the canonical hash.
  pub async fn qualifications(&self, project_id: Uuid) -> Result<Qualifications> {
    let project = self.require_project(project_id).await?;
    Ok(resolve(&project.settings))
  }
}
