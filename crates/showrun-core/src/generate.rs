//! Boundary contracts for the content backend and the lock audit process.
//!
//! Both collaborators live outside this workspace. The backend writes prose;
//! the auditor reviews a candidate lock. Neither is ever allowed to throw an
//! opaque error across the state machine: backend results are closed tagged
//! unions, and the engine maps each variant to a status transition.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  artifact::ArtifactKind,
  episode::ContinuityNote,
  facts::FactSet,
  retcon::ChangeEvent,
};

// ─── Requests ────────────────────────────────────────────────────────────────

/// One artifact's content as presented to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDocument {
  pub kind:    ArtifactKind,
  pub name:    String,
  pub content: String,
}

/// Everything the backend needs to draft one episode.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeContext {
  pub project_id:  Uuid,
  pub index:       u32,
  pub facts:       FactSet,
  pub fact_hash:   String,
  pub documents:   Vec<ContextDocument>,
  /// Continuity note of the locked predecessor, absent for episode 1.
  pub previous:    Option<ContinuityNote>,
  /// Frozen content of the season template episode, if one is designated.
  pub template:    Option<String>,
  /// The episode's latest draft when regenerating, absent on first attempt.
  pub prior_draft: Option<String>,
}

/// A compact view of one locked episode, used for retcon impact assessment
/// and amendment proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedDigest {
  pub index:     u32,
  pub excerpt:   String,
  pub locked_at: DateTime<Utc>,
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of a draft or amendment call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationOutcome {
  /// Usable content was produced.
  Drafted { content: String },
  /// Content was produced but the backend flagged it for revision.
  NeedsRevision { content: String, reason: String },
  /// The call failed in a way worth retrying (timeout, transient refusal).
  RetryableFailure { reason: String },
  /// The call failed in a way retries will not fix.
  FatalFailure { reason: String },
}

/// Result of a retcon impact assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImpactOutcome {
  /// The episode indices plausibly affected by the change.
  Impacted { indices: Vec<u32> },
  Failed { reason: String },
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// The external content generation backend.
///
/// All methods return `Send` futures so implementations can call out over the
/// network inside a multi-threaded runtime.
pub trait Generator: Send + Sync {
  /// Draft content for one episode.
  fn draft(
    &self,
    request: EpisodeContext,
  ) -> impl Future<Output = GenerationOutcome> + Send + '_;

  /// Judge which locked episodes a declared change plausibly affects.
  ///
  /// The engine gates the verdict: indices that do not name a locked episode
  /// are discarded.
  fn assess_impact(
    &self,
    change: ChangeEvent,
    locked: Vec<LockedDigest>,
  ) -> impl Future<Output = ImpactOutcome> + Send + '_;

  /// Propose replacement content for one locked episode under the change.
  fn propose_amendment(
    &self,
    change: ChangeEvent,
    target: LockedDigest,
    frozen_content: String,
  ) -> impl Future<Output = GenerationOutcome> + Send + '_;
}

/// One issue the audit process raises against a candidate lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditIssue {
  pub code:    String,
  pub message: String,
}

/// The advisory audit process consulted before a lock.
///
/// A non-empty issue list is a hard gate: the lock is rejected. An empty list
/// is the only green light.
pub trait LockAuditor: Send + Sync {
  fn blocking_issues(
    &self,
    episode_index: u32,
    content: String,
  ) -> impl Future<Output = Vec<AuditIssue>> + Send + '_;
}

/// An auditor that never blocks. The default for deployments without an
/// external review process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAudit;

impl LockAuditor for NoAudit {
  async fn blocking_issues(
    &self,
    _episode_index: u32,
    _content: String,
  ) -> Vec<AuditIssue> {
    vec![]
  }
}
