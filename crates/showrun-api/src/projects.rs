//! Handlers for `/projects` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/projects` | All projects |
//! | `POST` | `/projects` | Body: [`CreateBody`]; returns 201 |
//! | `GET`  | `/projects/:id` | 404 if not found |
//! | `PUT`  | `/projects/:id/settings` | Body: [`ProjectSettings`] |
//! | `GET`  | `/projects/:id/qualifications` | Resolved facts with sources and hash |
//! | `GET`  | `/projects/:id/staleness` | Artifact staleness plus snapshot health |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use showrun_core::{
  facts::Qualifications,
  generate::{Generator, LockAuditor},
  project::{Project, ProjectSettings},
  store::PipelineStore,
};
use showrun_engine::{Pipeline, artifact::StalenessReport};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Create and list ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub title:    String,
  #[serde(default)]
  pub settings: ProjectSettings,
}

/// `POST /projects` — body: `{"title":"...", "settings":{...}}`
pub async fn create<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  let project = pipeline.create_project(body.title, body.settings).await?;
  Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /projects`
pub async fn list<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
) -> Result<Json<Vec<Project>>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.list_projects().await?))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /projects/:id`
pub async fn get_one<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Project>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.get_project(id).await?))
}

// ─── Settings ─────────────────────────────────────────────────────────────────

/// `PUT /projects/:id/settings` — body is the full replacement settings.
pub async fn update_settings<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
  Json(settings): Json<ProjectSettings>,
) -> Result<Json<Project>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.update_settings(id, settings).await?))
}

// ─── Qualifications ───────────────────────────────────────────────────────────

/// `GET /projects/:id/qualifications`
pub async fn qualifications<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Qualifications>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.qualifications(id).await?))
}

// ─── Staleness ────────────────────────────────────────────────────────────────

/// `GET /projects/:id/staleness`
pub async fn staleness<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<StalenessReport>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.staleness_report(id).await?))
}
