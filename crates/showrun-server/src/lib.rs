//! HTTP server for the showrun episode pipeline.
//!
//! Assembles the JSON API from `showrun-api` behind a health endpoint and
//! request tracing, and owns the runtime configuration the binary reads from
//! `config.toml`. All pipeline semantics live in `showrun-engine`; this crate
//! only wires a store, a backend client, and a listener together.

pub mod backend;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, routing::get};
use serde::Deserialize;
use showrun_core::{
  batch::BatchStatus,
  generate::{Generator, LockAuditor},
  store::PipelineStore,
};
use showrun_engine::{Pipeline, PipelineConfig};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  /// Base URL of the generation backend, e.g. `http://localhost:9090`.
  pub backend_url:          String,
  /// Seconds before an in-flight backend call is abandoned.
  #[serde(default)]
  pub backend_timeout_secs: Option<u64>,
  /// Work items a single `POST .../batch/tick` may perform.
  #[serde(default)]
  pub batch_steps_per_tick: Option<u32>,
}

impl ServerConfig {
  /// Engine tuning derived from the config; unset knobs keep the engine
  /// defaults.
  pub fn pipeline_config(&self) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    if let Some(steps) = self.batch_steps_per_tick {
      config.max_steps_per_tick = steps;
    }
    config
  }

  pub fn backend_timeout(&self) -> Duration {
    Duration::from_secs(self.backend_timeout_secs.unwrap_or(30))
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full server router: the JSON API under `/api`, a health probe,
/// and request tracing.
pub fn app<S, G, A>(pipeline: Arc<Pipeline<S, G, A>>) -> Router
where
  S: PipelineStore + 'static,
  G: Generator + 'static,
  A: LockAuditor + 'static,
{
  Router::new()
    .route("/healthz", get(healthz))
    .nest("/api", showrun_api::api_router(pipeline))
    .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
  "ok"
}

// ─── Startup checks ───────────────────────────────────────────────────────────

/// Warn about batch cursors a previous process left `running`.
///
/// Ticks are caller-driven, so a running cursor without a driver just sits.
/// The operator decides whether to tick it forward or stop it; nothing is
/// reset here.
pub async fn warn_stale_batches<S, G, A>(
  pipeline: &Pipeline<S, G, A>,
) -> showrun_engine::Result<()>
where
  S: PipelineStore,
  G: Generator,
  A: LockAuditor,
{
  for project in pipeline.list_projects().await? {
    let cursor = pipeline.batch_status(project.project_id).await?;
    if let Some(cursor) = cursor {
      if cursor.status == BatchStatus::Running {
        tracing::warn!(
          project_id = %project.project_id,
          next_index = cursor.next_index,
          "batch cursor left running by a previous process; tick to resume or stop it"
        );
      }
    }
  }
  Ok(())
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use std::sync::atomic::{AtomicBool, Ordering};

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use serde_json::{Value, json};
  use showrun_core::{
    generate::{
      EpisodeContext, GenerationOutcome, ImpactOutcome, LockedDigest, NoAudit,
    },
    retcon::ChangeEvent,
  };
  use showrun_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;
  use uuid::Uuid;

  // ── Scripted backend ────────────────────────────────────────────────────────

  /// Deterministic stand-in for the generation backend. Flipping `fail`
  /// makes every later call report a backend failure.
  #[derive(Clone, Default)]
  struct StubBackend {
    failing: Arc<AtomicBool>,
  }

  impl StubBackend {
    fn fail(&self) {
      self.failing.store(true, Ordering::SeqCst);
    }

    fn is_failing(&self) -> bool {
      self.failing.load(Ordering::SeqCst)
    }
  }

  impl Generator for StubBackend {
    async fn draft(&self, request: EpisodeContext) -> GenerationOutcome {
      if self.is_failing() {
        return GenerationOutcome::RetryableFailure {
          reason: "backend offline".to_string(),
        };
      }
      GenerationOutcome::Drafted {
        content: format!("draft for episode {}", request.index),
      }
    }

    async fn assess_impact(
      &self,
      _change: ChangeEvent,
      locked: Vec<LockedDigest>,
    ) -> ImpactOutcome {
      if self.is_failing() {
        return ImpactOutcome::Failed { reason: "backend offline".to_string() };
      }
      ImpactOutcome::Impacted {
        indices: locked.iter().map(|d| d.index).collect(),
      }
    }

    async fn propose_amendment(
      &self,
      _change: ChangeEvent,
      _target: LockedDigest,
      frozen_content: String,
    ) -> GenerationOutcome {
      if self.is_failing() {
        return GenerationOutcome::RetryableFailure {
          reason: "backend offline".to_string(),
        };
      }
      GenerationOutcome::Drafted { content: format!("amended: {frozen_content}") }
    }
  }

  type TestPipeline = Pipeline<SqliteStore, StubBackend, NoAudit>;

  async fn make_pipeline() -> Arc<TestPipeline> {
    make_pipeline_with(StubBackend::default()).await
  }

  async fn make_pipeline_with(backend: StubBackend) -> Arc<TestPipeline> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    Arc::new(Pipeline::new(store, backend, NoAudit))
  }

  /// Fire one request at a fresh router over the shared pipeline and decode
  /// the JSON response (`Null` for empty bodies).
  async fn request(
    pipeline: &Arc<TestPipeline>,
    method: &str,
    uri: &str,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = app(pipeline.clone())
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap();
    let status = resp.status();
    let bytes =
      axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  async fn create_project(pipeline: &Arc<TestPipeline>, title: &str) -> Uuid {
    let (status, body) =
      request(pipeline, "POST", "/api/projects", Some(json!({ "title": title })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["project_id"].as_str().unwrap().parse().unwrap()
  }

  /// Project with a fresh snapshot and `count` pending units.
  async fn seed_units(pipeline: &Arc<TestPipeline>, count: u32) -> Uuid {
    let id = create_project(pipeline, "Night Shift").await;
    let (status, _) =
      request(pipeline, "POST", &format!("/api/projects/{id}/snapshots"), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = request(
      pipeline,
      "POST",
      &format!("/api/projects/{id}/units"),
      Some(json!({ "count": count })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    id
  }

  async fn generate_and_lock(pipeline: &Arc<TestPipeline>, id: Uuid, index: u32) {
    let (status, _) = request(
      pipeline,
      "POST",
      &format!("/api/projects/{id}/units/{index}/generate"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request(
      pipeline,
      "POST",
      &format!("/api/projects/{id}/units/{index}/lock"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
  }

  // ── Health ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn healthz_responds() {
    let pipeline = make_pipeline().await;
    let resp = app(pipeline)
      .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  // ── Projects ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_and_fetch_project() {
    let pipeline = make_pipeline().await;
    let id = create_project(&pipeline, "Night Shift").await;

    let (status, body) =
      request(&pipeline, "GET", &format!("/api/projects/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Night Shift");

    let (status, body) = request(&pipeline, "GET", "/api/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn blank_title_is_rejected() {
    let pipeline = make_pipeline().await;
    let (status, body) =
      request(&pipeline, "POST", "/api/projects", Some(json!({ "title": "  " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("title"));
  }

  #[tokio::test]
  async fn unknown_project_is_404() {
    let pipeline = make_pipeline().await;
    let (status, body) = request(
      &pipeline,
      "GET",
      &format!("/api/projects/{}", Uuid::new_v4()),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
  }

  #[tokio::test]
  async fn qualifications_report_layered_sources() {
    let pipeline = make_pipeline().await;
    let (status, body) = request(
      &pipeline,
      "POST",
      "/api/projects",
      Some(json!({
        "title": "Night Shift",
        "settings": {
          "preset": "web_serial",
          "overrides": { "season_episode_count": 6 },
        },
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["project_id"].as_str().unwrap().to_string();

    let (status, body) = request(
      &pipeline,
      "GET",
      &format!("/api/projects/{id}/qualifications"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["facts"]["season_episode_count"], 6);
    assert_eq!(body["facts"]["episode_target_duration_seconds"], 300);
    assert_eq!(body["sources"]["season_episode_count"], "override");
    assert_eq!(body["sources"]["episode_target_duration_seconds"], "preset");
    assert_eq!(body["sources"]["language"], "default");
    assert_eq!(body["hash"].as_str().unwrap().len(), 64);
  }

  #[tokio::test]
  async fn staleness_reports_snapshot_validity() {
    let pipeline = make_pipeline().await;
    let id = create_project(&pipeline, "Night Shift").await;
    let (status, _) =
      request(&pipeline, "POST", &format!("/api/projects/{id}/snapshots"), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, before) =
      request(&pipeline, "GET", &format!("/api/projects/{id}/staleness"), None)
        .await;
    assert_eq!(before["snapshot"]["valid"], true);

    let (status, _) = request(
      &pipeline,
      "PUT",
      &format!("/api/projects/{id}/settings"),
      Some(json!({ "overrides": { "core_cast_size": 3 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, after) =
      request(&pipeline, "GET", &format!("/api/projects/{id}/staleness"), None)
        .await;
    assert_eq!(after["snapshot"]["valid"], false);
    assert_ne!(before["current_hash"], after["current_hash"]);
  }

  // ── Artifacts ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn record_pin_and_list_artifacts() {
    let pipeline = make_pipeline().await;
    let id = create_project(&pipeline, "Night Shift").await;

    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/artifacts"),
      Some(json!({ "kind": "style_guide", "name": "tone", "content": "noir, wry" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["artifact"]["kind"], "style_guide");
    assert_eq!(body["latest"]["seq"], 1);
    let artifact_id = body["artifact"]["artifact_id"].as_str().unwrap().to_string();

    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/artifacts/{artifact_id}/pin"),
      Some(json!({ "pinned": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pinned"], true);

    let (status, body) =
      request(&pipeline, "GET", &format!("/api/projects/{id}/artifacts"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["stale"], false);
  }

  // ── Snapshots and units ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn units_refused_without_snapshot() {
    let pipeline = make_pipeline().await;
    let id = create_project(&pipeline, "Night Shift").await;
    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/units"),
      Some(json!({ "count": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("snapshot"));
  }

  #[tokio::test]
  async fn snapshot_then_units_lists_pending() {
    let pipeline = make_pipeline().await;
    let id = seed_units(&pipeline, 2).await;

    let (status, body) =
      request(&pipeline, "GET", &format!("/api/projects/{id}/units"), None).await;
    assert_eq!(status, StatusCode::OK);
    let units = body.as_array().unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0]["index"], 1);
    assert_eq!(units[0]["status"], "pending");

    let (status, body) =
      request(&pipeline, "GET", &format!("/api/projects/{id}/snapshots"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
  }

  // ── Generation and locking ──────────────────────────────────────────────────

  #[tokio::test]
  async fn generate_out_of_order_is_conflict() {
    let pipeline = make_pipeline().await;
    let id = seed_units(&pipeline, 3).await;
    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/units/2/generate"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("locked"));
  }

  #[tokio::test]
  async fn generate_then_lock_round_trip() {
    let pipeline = make_pipeline().await;
    let id = seed_units(&pipeline, 2).await;

    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/units/1/generate"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");

    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/units/1/lock"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["episode"]["status"], "locked");
    assert_eq!(body["lock_event"]["content"], "draft for episode 1");
    assert_eq!(body["lock_event"]["source"], "initial");
    assert_eq!(body["template_prompt"], true);

    let (status, body) =
      request(&pipeline, "GET", &format!("/api/projects/{id}/units/1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["versions"].as_array().unwrap().len(), 1);
    assert_eq!(body["lock_events"].as_array().unwrap().len(), 1);
    assert_eq!(body["continuity"]["metadata"]["word_count"], 4);
  }

  #[tokio::test]
  async fn backend_failure_lands_as_error_status() {
    let backend = StubBackend::default();
    backend.fail();
    let pipeline = make_pipeline_with(backend).await;
    let id = seed_units(&pipeline, 1).await;

    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/units/1/generate"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["retryable"], true);
    assert_eq!(body["last_error"], "backend offline");
  }

  #[tokio::test]
  async fn template_designation_over_http() {
    let pipeline = make_pipeline().await;
    let id = seed_units(&pipeline, 2).await;
    generate_and_lock(&pipeline, id, 1).await;

    let (status, _) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/units/1/template"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) =
      request(&pipeline, "GET", &format!("/api/projects/{id}/units"), None).await;
    assert_eq!(body.as_array().unwrap()[0]["is_template"], true);
  }

  // ── Deletion ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn soft_delete_filters_listing_and_purge_needs_confirm() {
    let pipeline = make_pipeline().await;
    let id = seed_units(&pipeline, 2).await;

    let (status, _) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/units/2/delete"),
      Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) =
      request(&pipeline, "GET", &format!("/api/projects/{id}/units"), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (_, body) = request(
      &pipeline,
      "GET",
      &format!("/api/projects/{id}/units?include_deleted=true"),
      None,
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/units/2/purge"),
      Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/units/2/purge"),
      Some(json!({ "confirm": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());
  }

  // ── Batch runner ────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn batch_runs_to_done_over_http() {
    let pipeline = make_pipeline().await;
    let id = seed_units(&pipeline, 2).await;

    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/batch"),
      Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "running");

    // Default budget is one work item per tick: two episode ticks, then a
    // closing tick that finds the frontier empty.
    for _ in 0..2 {
      let (status, _) = request(
        &pipeline,
        "POST",
        &format!("/api/projects/{id}/batch/tick"),
        None,
      )
      .await;
      assert_eq!(status, StatusCode::OK);
    }
    let (_, outcome) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/batch/tick"),
      None,
    )
    .await;
    assert_eq!(outcome["cursor"]["status"], "done");

    let (_, units) =
      request(&pipeline, "GET", &format!("/api/projects/{id}/units"), None).await;
    for unit in units.as_array().unwrap() {
      assert_eq!(unit["status"], "locked");
    }
  }

  #[tokio::test]
  async fn batch_status_and_stop() {
    let pipeline = make_pipeline().await;
    let id = seed_units(&pipeline, 3).await;

    let (status, _) =
      request(&pipeline, "GET", &format!("/api/projects/{id}/batch"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/batch"),
      Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/batch/stop"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, outcome) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/batch/tick"),
      None,
    )
    .await;
    assert_eq!(outcome["cursor"]["status"], "stopped");
    assert!(outcome["steps"].as_array().unwrap().is_empty());

    // A settled batch cannot be ticked.
    let (status, _) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/batch/tick"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  // ── Retcons and patches ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn retcon_lifecycle_over_http() {
    let pipeline = make_pipeline().await;
    let id = seed_units(&pipeline, 2).await;
    generate_and_lock(&pipeline, id, 1).await;
    generate_and_lock(&pipeline, id, 2).await;

    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/retcons"),
      Some(json!({ "summary": "the diner burns down" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let event_id = body["change_event_id"].as_str().unwrap().to_string();

    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/retcons/{event_id}/analyze"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], json!([1, 2]));

    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/retcons/{event_id}/propose"),
      Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let runs = body.as_array().unwrap().clone();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r["status"] == "complete"));

    let run_id = runs[0]["patch_run_id"].as_str().unwrap();
    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/patches/{run_id}/apply"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run"]["status"], "applied");
    assert_eq!(body["lock_event"]["source"], "amendment");

    let run_id = runs[1]["patch_run_id"].as_str().unwrap();
    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/patches/{run_id}/reject"),
      Some(json!({ "reason": "keep the diner" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    let (_, detail) = request(
      &pipeline,
      "GET",
      &format!("/api/projects/{id}/retcons/{event_id}"),
      None,
    )
    .await;
    assert_eq!(detail["change"]["summary"], "the diner burns down");
    assert!(detail["runs"]
      .as_array()
      .unwrap()
      .iter()
      .all(|r| r["status"] == "applied" || r["status"] == "rejected"));
  }

  #[tokio::test]
  async fn declare_blank_summary_is_rejected() {
    let pipeline = make_pipeline().await;
    let id = create_project(&pipeline, "Night Shift").await;
    let (status, _) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/retcons"),
      Some(json!({ "summary": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn failed_analysis_maps_to_bad_gateway() {
    let backend = StubBackend::default();
    let pipeline = make_pipeline_with(backend.clone()).await;
    let id = seed_units(&pipeline, 1).await;
    generate_and_lock(&pipeline, id, 1).await;

    let (_, event) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/retcons"),
      Some(json!({ "summary": "the lead is recast" })),
    )
    .await;
    let event_id = event["change_event_id"].as_str().unwrap().to_string();

    backend.fail();
    let (status, body) = request(
      &pipeline,
      "POST",
      &format!("/api/projects/{id}/retcons/{event_id}/analyze"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("backend offline"));
  }
}
