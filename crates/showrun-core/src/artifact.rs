//! Artifacts — generated project documents with declared fact dependencies.
//!
//! The dependency map is static configuration: each kind names the fact keys
//! whose change makes it stale. Custom kinds declare no dependencies and are
//! therefore never stale (conservative; avoids regeneration storms for
//! documents the pipeline knows nothing about).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::facts::FactKey;

// ─── Kinds and the dependency map ────────────────────────────────────────────

/// The type of a generated document.
///
/// Encodes to a single wire string: known kinds use their snake_case name,
/// anything else round-trips as [`ArtifactKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArtifactKind {
  IdeaBrief,
  StyleGuide,
  FormatRules,
  CharacterBible,
  EpisodeGrid,
  Custom(String),
}

impl ArtifactKind {
  /// Known (non-custom) kinds, in canonical display order.
  pub const KNOWN: [ArtifactKind; 5] = [
    ArtifactKind::IdeaBrief,
    ArtifactKind::StyleGuide,
    ArtifactKind::FormatRules,
    ArtifactKind::CharacterBible,
    ArtifactKind::EpisodeGrid,
  ];

  pub fn as_str(&self) -> &str {
    match self {
      ArtifactKind::IdeaBrief => "idea_brief",
      ArtifactKind::StyleGuide => "style_guide",
      ArtifactKind::FormatRules => "format_rules",
      ArtifactKind::CharacterBible => "character_bible",
      ArtifactKind::EpisodeGrid => "episode_grid",
      ArtifactKind::Custom(name) => name,
    }
  }

  /// Parse a wire string. Total: unrecognised names become `Custom`.
  pub fn parse(s: &str) -> Self {
    match s {
      "idea_brief" => ArtifactKind::IdeaBrief,
      "style_guide" => ArtifactKind::StyleGuide,
      "format_rules" => ArtifactKind::FormatRules,
      "character_bible" => ArtifactKind::CharacterBible,
      "episode_grid" => ArtifactKind::EpisodeGrid,
      other => ArtifactKind::Custom(other.to_string()),
    }
  }

  /// The fact keys this kind depends on. Empty for `idea_brief` and custom
  /// kinds — those never go stale.
  pub fn dependency_keys(&self) -> &'static [FactKey] {
    match self {
      ArtifactKind::IdeaBrief => &[],
      ArtifactKind::StyleGuide => &[FactKey::Language, FactKey::ContentRating],
      ArtifactKind::FormatRules => {
        &[FactKey::EpisodeTargetDurationSeconds, FactKey::ScenesPerEpisode]
      }
      ArtifactKind::CharacterBible => &[FactKey::CoreCastSize],
      ArtifactKind::EpisodeGrid => {
        &[FactKey::SeasonEpisodeCount, FactKey::EpisodeTargetDurationSeconds]
      }
      ArtifactKind::Custom(_) => &[],
    }
  }
}

impl From<String> for ArtifactKind {
  fn from(s: String) -> Self {
    ArtifactKind::parse(&s)
  }
}

impl From<ArtifactKind> for String {
  fn from(kind: ArtifactKind) -> Self {
    kind.as_str().to_string()
  }
}

/// The known kinds whose dependency sets intersect `changed`. Supports bulk
/// invalidation reporting after a settings edit.
pub fn affected_kinds(changed: &[FactKey]) -> Vec<ArtifactKind> {
  ArtifactKind::KNOWN
    .iter()
    .filter(|kind| {
      kind.dependency_keys().iter().any(|dep| changed.contains(dep))
    })
    .cloned()
    .collect()
}

// ─── Staleness ───────────────────────────────────────────────────────────────

/// True iff the artifact records a prior hash different from `current_hash`
/// and its kind has a non-empty dependency set.
///
/// A missing recorded hash never reads as stale: there is nothing to compare.
pub fn is_stale(
  kind: &ArtifactKind,
  recorded_hash: Option<&str>,
  current_hash: &str,
) -> bool {
  match recorded_hash {
    Some(recorded) => {
      !kind.dependency_keys().is_empty() && recorded != current_hash
    }
    None => false,
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A named, typed generated document. Content lives in its append-only
/// version history; the artifact row itself is identity plus context flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
  pub artifact_id: Uuid,
  pub project_id:  Uuid,
  pub kind:        ArtifactKind,
  pub name:        String,
  /// Explicitly selected into the generation context (highest-precedence
  /// layer of context resolution).
  pub pinned:      bool,
  pub created_at:  DateTime<Utc>,
}

/// One immutable version of an artifact's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactVersion {
  pub version_id:    Uuid,
  pub artifact_id:   Uuid,
  pub seq:           i64,
  pub content:       String,
  /// Resolver hash current when this version was produced. `None` for
  /// content recorded outside a resolved-facts context.
  pub recorded_hash: Option<String>,
  pub created_at:    DateTime<Utc>,
}

/// An artifact joined with its latest version, the shape most reads want.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactWithLatest {
  pub artifact: Artifact,
  pub latest:   Option<ArtifactVersion>,
}

impl ArtifactWithLatest {
  pub fn is_stale(&self, current_hash: &str) -> bool {
    is_stale(
      &self.artifact.kind,
      self.latest.as_ref().and_then(|v| v.recorded_hash.as_deref()),
      current_hash,
    )
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_wire_round_trip() {
    for kind in ArtifactKind::KNOWN {
      assert_eq!(ArtifactKind::parse(kind.as_str()), kind);
    }
    let custom = ArtifactKind::parse("mood_board");
    assert_eq!(custom, ArtifactKind::Custom("mood_board".to_string()));
    assert_eq!(custom.as_str(), "mood_board");
  }

  #[test]
  fn custom_kinds_have_no_dependencies() {
    assert!(ArtifactKind::Custom("anything".into())
      .dependency_keys()
      .is_empty());
  }

  #[test]
  fn duration_change_stales_format_rules_not_idea_brief() {
    let affected = affected_kinds(&[FactKey::EpisodeTargetDurationSeconds]);
    assert!(affected.contains(&ArtifactKind::FormatRules));
    assert!(affected.contains(&ArtifactKind::EpisodeGrid));
    assert!(!affected.contains(&ArtifactKind::IdeaBrief));
    assert!(!affected.contains(&ArtifactKind::StyleGuide));
  }

  #[test]
  fn staleness_requires_hash_mismatch_and_dependencies() {
    let rules = ArtifactKind::FormatRules;
    let brief = ArtifactKind::IdeaBrief;

    assert!(is_stale(&rules, Some("old"), "new"));
    assert!(!is_stale(&rules, Some("same"), "same"));
    assert!(!is_stale(&rules, None, "new"));
    // No dependency keys: a hash mismatch alone is not staleness.
    assert!(!is_stale(&brief, Some("old"), "new"));
  }
}
