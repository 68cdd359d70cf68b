//! JSON REST API for Showrun.
//!
//! Exposes an axum [`Router`] backed by a [`showrun_engine::Pipeline`]. Every
//! handler goes through the engine; nothing here touches the store directly,
//! so every state-machine gate applies to HTTP callers identically. Auth,
//! TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", showrun_api::api_router(pipeline.clone()))
//! ```

pub mod artifacts;
pub mod batch;
pub mod error;
pub mod projects;
pub mod retcons;
pub mod snapshots;
pub mod units;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use showrun_core::{
  generate::{Generator, LockAuditor},
  store::PipelineStore,
};
use showrun_engine::Pipeline;

pub use error::ApiError;

/// Build a fully-materialised API router for `pipeline`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, G, A>(pipeline: Arc<Pipeline<S, G, A>>) -> Router<()>
where
  S: PipelineStore + 'static,
  G: Generator + 'static,
  A: LockAuditor + 'static,
{
  Router::new()
    // Projects
    .route(
      "/projects",
      get(projects::list::<S, G, A>).post(projects::create::<S, G, A>),
    )
    .route("/projects/{id}", get(projects::get_one::<S, G, A>))
    .route("/projects/{id}/settings", put(projects::update_settings::<S, G, A>))
    .route("/projects/{id}/qualifications", get(projects::qualifications::<S, G, A>))
    .route("/projects/{id}/staleness", get(projects::staleness::<S, G, A>))
    // Artifacts and context sets
    .route(
      "/projects/{id}/artifacts",
      get(artifacts::list::<S, G, A>).post(artifacts::record::<S, G, A>),
    )
    .route(
      "/projects/{id}/artifacts/{artifact_id}/pin",
      post(artifacts::pin::<S, G, A>),
    )
    .route(
      "/projects/{id}/context-sets",
      get(artifacts::list_sets::<S, G, A>).post(artifacts::save_set::<S, G, A>),
    )
    // Snapshots
    .route(
      "/projects/{id}/snapshots",
      get(snapshots::list::<S, G, A>).post(snapshots::create::<S, G, A>),
    )
    // Units
    .route(
      "/projects/{id}/units",
      get(units::list::<S, G, A>).post(units::create::<S, G, A>),
    )
    .route("/projects/{id}/units/{index}", get(units::get_one::<S, G, A>))
    .route("/projects/{id}/units/{index}/generate", post(units::generate::<S, G, A>))
    .route("/projects/{id}/units/{index}/lock", post(units::lock::<S, G, A>))
    .route("/projects/{id}/units/{index}/template", post(units::set_template::<S, G, A>))
    .route("/projects/{id}/units/{index}/delete", post(units::delete::<S, G, A>))
    .route("/projects/{id}/units/{index}/restore", post(units::restore::<S, G, A>))
    .route("/projects/{id}/units/{index}/reset", post(units::reset::<S, G, A>))
    .route("/projects/{id}/units/{index}/purge", post(units::purge::<S, G, A>))
    // Batch runner
    .route(
      "/projects/{id}/batch",
      get(batch::status::<S, G, A>).post(batch::start::<S, G, A>),
    )
    .route("/projects/{id}/batch/tick", post(batch::tick::<S, G, A>))
    .route("/projects/{id}/batch/stop", post(batch::stop::<S, G, A>))
    // Retcons and patches
    .route(
      "/projects/{id}/retcons",
      get(retcons::list::<S, G, A>).post(retcons::declare::<S, G, A>),
    )
    .route("/projects/{id}/retcons/{event_id}", get(retcons::get_one::<S, G, A>))
    .route(
      "/projects/{id}/retcons/{event_id}/analyze",
      post(retcons::analyze::<S, G, A>),
    )
    .route(
      "/projects/{id}/retcons/{event_id}/propose",
      post(retcons::propose::<S, G, A>),
    )
    .route("/projects/{id}/patches/{run_id}/apply", post(retcons::apply::<S, G, A>))
    .route("/projects/{id}/patches/{run_id}/reject", post(retcons::reject::<S, G, A>))
    .with_state(pipeline)
}
