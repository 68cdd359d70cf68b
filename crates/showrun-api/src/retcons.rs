//! Handlers for `/projects/:id/retcons` and patch endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/projects/:id/retcons` | Newest first |
//! | `POST` | `/projects/:id/retcons` | Body: `{"summary":"..."}`; returns 201 |
//! | `GET`  | `/projects/:id/retcons/:event_id` | Change event with its patch runs |
//! | `POST` | `/projects/:id/retcons/:event_id/analyze` | Flag affected locked episodes |
//! | `POST` | `/projects/:id/retcons/:event_id/propose` | Body: `{"indices":[..]}` (optional) |
//! | `POST` | `/projects/:id/patches/:run_id/apply` | Re-lock with the proposed amendment |
//! | `POST` | `/projects/:id/patches/:run_id/reject` | Body: `{"reason":"..."}`, required |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use showrun_core::{
  generate::{Generator, LockAuditor},
  retcon::{ChangeEvent, PatchRun},
  store::PipelineStore,
};
use showrun_engine::{
  Pipeline,
  retcon::{AppliedPatch, RetconDetail},
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Change events ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeclareBody {
  pub summary: String,
}

/// `POST /projects/:id/retcons` — body: `{"summary":"..."}`
pub async fn declare<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<DeclareBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  let change = pipeline.declare_retcon(id, body.summary).await?;
  Ok((StatusCode::CREATED, Json(change)))
}

/// `GET /projects/:id/retcons`
pub async fn list<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChangeEvent>>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.list_retcons(id).await?))
}

/// `GET /projects/:id/retcons/:event_id`
pub async fn get_one<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, event_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RetconDetail>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.retcon_detail(id, event_id).await?))
}

// ─── Analysis and proposals ───────────────────────────────────────────────────

/// `POST /projects/:id/retcons/:event_id/analyze`
pub async fn analyze<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, event_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ChangeEvent>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.analyze_retcon(id, event_id).await?))
}

#[derive(Debug, Deserialize, Default)]
pub struct ProposeBody {
  /// Target episode indices; defaults to the analysed affected set.
  pub indices: Option<Vec<u32>>,
}

/// `POST /projects/:id/retcons/:event_id/propose`
pub async fn propose<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, event_id)): Path<(Uuid, Uuid)>,
  Json(body): Json<ProposeBody>,
) -> Result<Json<Vec<PatchRun>>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.propose_patches(id, event_id, body.indices).await?))
}

// ─── Patch resolution ─────────────────────────────────────────────────────────

/// `POST /projects/:id/patches/:run_id/apply`
pub async fn apply<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, run_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<AppliedPatch>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.apply_patch(id, run_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
  pub reason: String,
}

/// `POST /projects/:id/patches/:run_id/reject` — body: `{"reason":"..."}`
pub async fn reject<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, run_id)): Path<(Uuid, Uuid)>,
  Json(body): Json<RejectBody>,
) -> Result<Json<PatchRun>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.reject_patch(id, run_id, body.reason).await?))
}
