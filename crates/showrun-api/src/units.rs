//! Handlers for `/projects/:id/units` endpoints — the episode state machine.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/projects/:id/units` | Optional `?include_deleted=true` |
//! | `POST` | `/projects/:id/units` | Body: `{"count":8}`; returns 201 |
//! | `GET`  | `/projects/:id/units/:index` | Episode with versions, lock events, continuity |
//! | `POST` | `/projects/:id/units/:index/generate` | Draft (or redraft) one episode |
//! | `POST` | `/projects/:id/units/:index/lock` | Freeze the latest draft |
//! | `POST` | `/projects/:id/units/:index/template` | Designate the season template |
//! | `POST` | `/projects/:id/units/:index/delete` | Body: `{"reason":"..."}`, required when locked |
//! | `POST` | `/projects/:id/units/:index/restore` | Undo a soft delete |
//! | `POST` | `/projects/:id/units/:index/reset` | Clear a stuck `generating` status |
//! | `POST` | `/projects/:id/units/:index/purge` | Body: `{"confirm":true}`; destroys history |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use showrun_core::{
  episode::Episode,
  generate::{Generator, LockAuditor},
  store::PipelineStore,
};
use showrun_engine::{
  Pipeline,
  episode::{LockResult, UnitDetail},
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Create and list ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub count: u32,
}

/// `POST /projects/:id/units` — body: `{"count":8}`
pub async fn create<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  let episodes = pipeline.create_units(id, body.count).await?;
  Ok((StatusCode::CREATED, Json(episodes)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub include_deleted: bool,
}

/// `GET /projects/:id/units[?include_deleted=true]`
pub async fn list<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Episode>>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.list_units(id, params.include_deleted).await?))
}

/// `GET /projects/:id/units/:index`
pub async fn get_one<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, index)): Path<(Uuid, u32)>,
) -> Result<Json<UnitDetail>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.unit_detail(id, index).await?))
}

// ─── Generation and locking ───────────────────────────────────────────────────

/// `POST /projects/:id/units/:index/generate`
///
/// Returns the episode with its post-generation status; backend failures land
/// as `error` status, not as HTTP errors.
pub async fn generate<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, index)): Path<(Uuid, u32)>,
) -> Result<Json<Episode>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.generate_unit(id, index).await?))
}

/// `POST /projects/:id/units/:index/lock`
pub async fn lock<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, index)): Path<(Uuid, u32)>,
) -> Result<Json<LockResult>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.lock_unit(id, index).await?))
}

/// `POST /projects/:id/units/:index/template`
pub async fn set_template<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, index)): Path<(Uuid, u32)>,
) -> Result<Json<Episode>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.set_template(id, index).await?))
}

// ─── Deletion and recovery ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct DeleteBody {
  pub reason: Option<String>,
}

/// `POST /projects/:id/units/:index/delete` — body: `{"reason":"..."}`.
/// The reason is required when the episode is locked.
pub async fn delete<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, index)): Path<(Uuid, u32)>,
  Json(body): Json<DeleteBody>,
) -> Result<Json<Episode>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.soft_delete_unit(id, index, body.reason).await?))
}

/// `POST /projects/:id/units/:index/restore`
pub async fn restore<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, index)): Path<(Uuid, u32)>,
) -> Result<Json<Episode>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.restore_unit(id, index).await?))
}

/// `POST /projects/:id/units/:index/reset`
pub async fn reset<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, index)): Path<(Uuid, u32)>,
) -> Result<Json<Episode>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.reset_stuck_unit(id, index).await?))
}

#[derive(Debug, Deserialize)]
pub struct PurgeBody {
  #[serde(default)]
  pub confirm: bool,
}

/// `POST /projects/:id/units/:index/purge` — body: `{"confirm":true}`.
/// Requires a prior soft delete; destroys the episode and its history.
pub async fn purge<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path((id, index)): Path<(Uuid, u32)>,
  Json(body): Json<PurgeBody>,
) -> Result<StatusCode, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  pipeline.hard_delete_unit(id, index, body.confirm).await?;
  Ok(StatusCode::NO_CONTENT)
}
