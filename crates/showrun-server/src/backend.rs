//! Reqwest-backed [`Generator`] speaking the showrun backend protocol.
//!
//! The backend is any HTTP service exposing three JSON endpoints:
//!
//! | Method | Path      | Request                              | Response                |
//! |--------|-----------|--------------------------------------|-------------------------|
//! | POST   | `/draft`  | [`EpisodeContext`]                   | [`GenerationOutcome`]   |
//! | POST   | `/impact` | `{ change, locked }`                 | [`ImpactOutcome`]       |
//! | POST   | `/amend`  | `{ change, target, frozen_content }` | [`GenerationOutcome`]   |
//!
//! Transport trouble never crosses the trait boundary as an error. A refused
//! connection, a timeout, or a 5xx folds into `retryable_failure`; a 4xx or a
//! malformed response body folds into `fatal_failure`. The engine routes both
//! the same way it routes failures the backend reports itself.

use std::time::Duration;

use anyhow::Context as _;
use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use showrun_core::{
  generate::{
    EpisodeContext, GenerationOutcome, Generator, ImpactOutcome, LockedDigest,
  },
  retcon::ChangeEvent,
};

/// HTTP client for the generation backend.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct HttpBackend {
  client:   Client,
  base_url: String,
}

impl HttpBackend {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, base_url: base_url.into() })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{path}", self.base_url.trim_end_matches('/'))
  }

  async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, Failure>
  where
    B: Serialize,
    T: DeserializeOwned,
  {
    let resp = self
      .client
      .post(self.url(path))
      .json(body)
      .send()
      .await
      .map_err(|e| Failure::retryable(format!("POST {path} failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
      let reason = format!("POST {path} → {status}");
      return Err(
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
          Failure::retryable(reason)
        } else {
          Failure::fatal(reason)
        },
      );
    }
    resp.json().await.map_err(|e| {
      Failure::fatal(format!("POST {path} returned malformed JSON: {e}"))
    })
  }
}

impl Generator for HttpBackend {
  async fn draft(&self, request: EpisodeContext) -> GenerationOutcome {
    match self.post("/draft", &request).await {
      Ok(outcome) => outcome,
      Err(failure) => failure.into_outcome(),
    }
  }

  async fn assess_impact(
    &self,
    change: ChangeEvent,
    locked: Vec<LockedDigest>,
  ) -> ImpactOutcome {
    let body = json!({ "change": change, "locked": locked });
    match self.post("/impact", &body).await {
      Ok(outcome) => outcome,
      Err(failure) => ImpactOutcome::Failed { reason: failure.reason },
    }
  }

  async fn propose_amendment(
    &self,
    change: ChangeEvent,
    target: LockedDigest,
    frozen_content: String,
  ) -> GenerationOutcome {
    let body = json!({
      "change": change,
      "target": target,
      "frozen_content": frozen_content,
    });
    match self.post("/amend", &body).await {
      Ok(outcome) => outcome,
      Err(failure) => failure.into_outcome(),
    }
  }
}

/// A transport-level failure, split the way the engine splits generation
/// failures.
struct Failure {
  retryable: bool,
  reason:    String,
}

impl Failure {
  fn retryable(reason: String) -> Self {
    Self { retryable: true, reason }
  }

  fn fatal(reason: String) -> Self {
    Self { retryable: false, reason }
  }

  fn into_outcome(self) -> GenerationOutcome {
    if self.retryable {
      GenerationOutcome::RetryableFailure { reason: self.reason }
    } else {
      GenerationOutcome::FatalFailure { reason: self.reason }
    }
  }
}
