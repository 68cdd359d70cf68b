//! Handlers for `/projects/:id/batch` endpoints — the tick-driven runner.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/projects/:id/batch` | Current cursor; 404 when none exists |
//! | `POST` | `/projects/:id/batch` | Body: `{"from_index":1}` (optional); returns 201 |
//! | `POST` | `/projects/:id/batch/tick` | Advance by at most one tick budget |
//! | `POST` | `/projects/:id/batch/stop` | Honored before the next work item |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use showrun_core::{
  batch::BatchCursor,
  generate::{Generator, LockAuditor},
  store::PipelineStore,
};
use showrun_engine::{Pipeline, batch::TickOutcome};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize, Default)]
pub struct StartBody {
  /// Episode index to start from; defaults to 1.
  pub from_index: Option<u32>,
}

/// `POST /projects/:id/batch` — body: `{"from_index":1}` (optional)
pub async fn start<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<StartBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  let cursor = pipeline.start_batch(id, body.from_index).await?;
  Ok((StatusCode::CREATED, Json(cursor)))
}

/// `GET /projects/:id/batch`
pub async fn status<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<BatchCursor>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  let cursor = pipeline
    .batch_status(id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("no batch cursor for project {id}")))?;
  Ok(Json(cursor))
}

/// `POST /projects/:id/batch/tick`
pub async fn tick<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<TickOutcome>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.tick_batch(id).await?))
}

/// `POST /projects/:id/batch/stop`
pub async fn stop<S, G, A>(
  State(pipeline): State<Arc<Pipeline<S, G, A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<BatchCursor>, ApiError>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  Ok(Json(pipeline.stop_batch(id).await?))
}
