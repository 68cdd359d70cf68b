//! Context resolution — which artifacts feed a generation step.
//!
//! Selection precedence, highest first: artifacts explicitly pinned by the
//! operator, then the project's default context set, then an explicit id list
//! supplied with the request, then every artifact that has content. The
//! chosen layer is reported on the plan so callers can see why a document was
//! (or was not) included.
//!
//! Resolution is deterministic: items are always ordered by kind then name,
//! and only artifacts with at least one content version participate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::{Artifact, ArtifactVersion, ArtifactWithLatest};

/// A saved, named selection of artifacts. At most one set per project is the
/// default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSet {
  pub set_id:       Uuid,
  pub project_id:   Uuid,
  pub name:         String,
  pub is_default:   bool,
  pub artifact_ids: Vec<Uuid>,
  pub created_at:   DateTime<Utc>,
}

/// Input for saving a context set.
#[derive(Debug, Clone)]
pub struct NewContextSet {
  pub project_id:   Uuid,
  pub name:         String,
  pub is_default:   bool,
  pub artifact_ids: Vec<Uuid>,
}

/// Which precedence layer produced the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
  Pinned,
  DefaultSet,
  Requested,
  AllLatest,
}

/// One artifact chosen into the context, with the version that will be read.
#[derive(Debug, Clone, Serialize)]
pub struct ContextItem {
  pub artifact: Artifact,
  pub version:  ArtifactVersion,
}

/// The resolved working context for a generation step.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPlan {
  pub source: ContextSource,
  pub items:  Vec<ContextItem>,
}

impl ContextPlan {
  /// The artifact version ids the plan pins — what a canon snapshot records.
  pub fn version_ids(&self) -> Vec<Uuid> {
    self.items.iter().map(|item| item.version.version_id).collect()
  }
}

/// Resolve the working context from the project's artifacts.
///
/// `default_set` is the project's default context set, if one is saved;
/// `requested_ids` is the explicit id list from the request, if any.
pub fn resolve_context(
  artifacts: &[ArtifactWithLatest],
  default_set: Option<&ContextSet>,
  requested_ids: &[Uuid],
) -> ContextPlan {
  let pinned = collect(artifacts, |a| a.artifact.pinned);
  if !pinned.is_empty() {
    return plan(ContextSource::Pinned, pinned);
  }

  if let Some(set) = default_set {
    let chosen =
      collect(artifacts, |a| set.artifact_ids.contains(&a.artifact.artifact_id));
    if !chosen.is_empty() {
      return plan(ContextSource::DefaultSet, chosen);
    }
  }

  if !requested_ids.is_empty() {
    let chosen =
      collect(artifacts, |a| requested_ids.contains(&a.artifact.artifact_id));
    if !chosen.is_empty() {
      return plan(ContextSource::Requested, chosen);
    }
  }

  let all = collect(artifacts, |_| true);
  plan(ContextSource::AllLatest, all)
}

/// Filter to artifacts that match `keep` and have content.
fn collect(
  artifacts: &[ArtifactWithLatest],
  keep: impl Fn(&ArtifactWithLatest) -> bool,
) -> Vec<ContextItem> {
  artifacts
    .iter()
    .filter(|a| keep(a))
    .filter_map(|a| {
      a.latest.as_ref().map(|version| ContextItem {
        artifact: a.artifact.clone(),
        version:  version.clone(),
      })
    })
    .collect()
}

fn plan(source: ContextSource, mut items: Vec<ContextItem>) -> ContextPlan {
  items.sort_by(|a, b| {
    (a.artifact.kind.as_str(), a.artifact.name.as_str())
      .cmp(&(b.artifact.kind.as_str(), b.artifact.name.as_str()))
  });
  ContextPlan { source, items }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use crate::artifact::ArtifactKind;

  use super::*;

  fn entry(
    kind: ArtifactKind,
    name: &str,
    pinned: bool,
    has_version: bool,
  ) -> ArtifactWithLatest {
    let artifact = Artifact {
      artifact_id: Uuid::new_v4(),
      project_id: Uuid::new_v4(),
      kind,
      name: name.to_string(),
      pinned,
      created_at: Utc::now(),
    };
    let latest = has_version.then(|| ArtifactVersion {
      version_id:    Uuid::new_v4(),
      artifact_id:   artifact.artifact_id,
      seq:           1,
      content:       format!("{name} content"),
      recorded_hash: Some("hash".to_string()),
      created_at:    Utc::now(),
    });
    ArtifactWithLatest { artifact, latest }
  }

  #[test]
  fn pinned_wins_over_everything() {
    let artifacts = vec![
      entry(ArtifactKind::IdeaBrief, "brief", false, true),
      entry(ArtifactKind::FormatRules, "rules", true, true),
    ];
    let set = ContextSet {
      set_id:       Uuid::new_v4(),
      project_id:   artifacts[0].artifact.project_id,
      name:         "everything".to_string(),
      is_default:   true,
      artifact_ids: vec![artifacts[0].artifact.artifact_id],
      created_at:   Utc::now(),
    };

    let plan = resolve_context(&artifacts, Some(&set), &[]);
    assert_eq!(plan.source, ContextSource::Pinned);
    assert_eq!(plan.items.len(), 1);
    assert_eq!(plan.items[0].artifact.name, "rules");
  }

  #[test]
  fn default_set_then_requested_then_all() {
    let artifacts = vec![
      entry(ArtifactKind::IdeaBrief, "brief", false, true),
      entry(ArtifactKind::FormatRules, "rules", false, true),
    ];
    let set = ContextSet {
      set_id:       Uuid::new_v4(),
      project_id:   artifacts[0].artifact.project_id,
      name:         "brief only".to_string(),
      is_default:   true,
      artifact_ids: vec![artifacts[0].artifact.artifact_id],
      created_at:   Utc::now(),
    };

    let with_default = resolve_context(&artifacts, Some(&set), &[]);
    assert_eq!(with_default.source, ContextSource::DefaultSet);
    assert_eq!(with_default.items.len(), 1);

    let requested = resolve_context(
      &artifacts,
      None,
      &[artifacts[1].artifact.artifact_id],
    );
    assert_eq!(requested.source, ContextSource::Requested);
    assert_eq!(requested.items[0].artifact.name, "rules");

    let fallback = resolve_context(&artifacts, None, &[]);
    assert_eq!(fallback.source, ContextSource::AllLatest);
    assert_eq!(fallback.items.len(), 2);
  }

  #[test]
  fn artifacts_without_content_never_participate() {
    let artifacts = vec![
      entry(ArtifactKind::IdeaBrief, "brief", true, false),
      entry(ArtifactKind::FormatRules, "rules", false, true),
    ];
    // The only pinned artifact has no version, so the pinned layer is empty
    // and resolution falls through.
    let plan = resolve_context(&artifacts, None, &[]);
    assert_eq!(plan.source, ContextSource::AllLatest);
    assert_eq!(plan.items.len(), 1);
    assert_eq!(plan.items[0].artifact.name, "rules");
  }

  #[test]
  fn items_ordered_by_kind_then_name() {
    let artifacts = vec![
      entry(ArtifactKind::StyleGuide, "b guide", false, true),
      entry(ArtifactKind::StyleGuide, "a guide", false, true),
      entry(ArtifactKind::CharacterBible, "cast", false, true),
    ];
    let plan = resolve_context(&artifacts, None, &[]);
    let names: Vec<&str> =
      plan.items.iter().map(|i| i.artifact.name.as_str()).collect();
    assert_eq!(names, vec!["cast", "a guide", "b guide"]);
  }
}
