//! Handlers for `/projects/:id/snapshots` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/projects/:id/snapshots` | Newest first, superseded included |
//! | `POST` | `/projects/:id/snapshots` | Install a fresh canon snapshot; returns 201 |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use showrun_core::{
  generate::{Generator, LockAuditor},
  snapshot::CanonSnapshot,
  store::PipelineStore,
};
use showrun_engine::Pipeline;
use uuid::Uuid;

use crate::error::ApiError;

/// `POST /projects/:id/snapshots` — resolves facts and context now and pins
/// both; invalidated episodes return to `pending`.
pub async fn create<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  let snapshot = pipeline.create_or_relock_snapshot(id).await?;
  Ok((StatusCode::CREATED, Json(snapshot)))
}

/// `GET /projects/:id/snapshots`
pub async fn list<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<CanonSnapshot>>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.list_snapshots(id).await?))
}
