//! Handlers for `/projects/:id/artifacts` and context-set endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/projects/:id/artifacts` | With latest versions and staleness verdicts |
//! | `POST` | `/projects/:id/artifacts` | Body: [`RecordBody`]; returns 201 |
//! | `POST` | `/projects/:id/artifacts/:artifact_id/pin` | Body: `{"pinned":true}` |
//! | `GET`  | `/projects/:id/context-sets` | All named sets |
//! | `POST` | `/projects/:id/context-sets` | Body: [`ContextSetBody`]; creates or replaces |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use showrun_core::{
  artifact::{Artifact, ArtifactKind},
  context::ContextSet,
  generate::{Generator, LockAuditor},
  store::PipelineStore,
};
use showrun_engine::{Pipeline, artifact::ArtifactReport};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Record and list ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecordBody {
  pub kind:    ArtifactKind,
  pub name:    String,
  pub content: String,
}

/// `POST /projects/:id/artifacts` — appends a version, creating the artifact
/// on first write.
pub async fn record<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<RecordBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  let artifact = pipeline
    .record_artifact(id, body.kind, body.name, body.content)
    .await?;
  Ok((StatusCode::CREATED, Json(artifact)))
}

/// `GET /projects/:id/artifacts`
pub async fn list<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<ArtifactReport>>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  let report = pipeline.staleness_report(id).await?;
  Ok(Json(report.artifacts))
}

// ─── Pin ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PinBody {
  pub pinned: bool,
}

/// `POST /projects/:id/artifacts/:artifact_id/pin` — body: `{"pinned":true}`
pub async fn pin<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, artifact_id)): Path<(Uuid, Uuid)>,
  Json(body): Json<PinBody>,
) -> Result<Json<Artifact>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.pin_artifact(id, artifact_id, body.pinned).await?))
}

// ─── Context sets ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ContextSetBody {
  pub name:         String,
  pub artifact_ids: Vec<Uuid>,
  #[serde(default)]
  pub is_default:   bool,
}

/// `POST /projects/:id/context-sets`
pub async fn save_set<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ContextSetBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  let set = pipeline
    .save_context_set(id, body.name, body.artifact_ids, body.is_default)
    .await?;
  Ok((StatusCode::CREATED, Json(set)))
}

/// `GET /projects/:id/context-sets`
pub async fn list_sets<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<ContextSet>>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.list_context_sets(id).await?))
}
