//! Qualification facts — the canonical, hashable configuration of a project.
//!
//! The resolver collapses layered settings (built-in defaults, optional
//! format preset, per-project overrides) into one value per known key, then
//! hashes the canonical JSON rendering of the set. Artifacts record the hash
//! current when they were produced; a mismatch later is what "stale" means.
//!
//! Resolution is pure and total: absence of a value falls back to the
//! documented default, never to an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  error::{Error, Result},
  project::ProjectSettings,
};

// ─── Keys and values ─────────────────────────────────────────────────────────

/// A canonical fact key. Wire names are stable snake_case strings; the
/// resolver hash depends on them, so renaming a variant is a breaking change.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FactKey {
  SeasonEpisodeCount,
  EpisodeTargetDurationSeconds,
  ScenesPerEpisode,
  CoreCastSize,
  Language,
  ContentRating,
}

impl FactKey {
  /// Every known key, in declaration order.
  pub const ALL: [FactKey; 6] = [
    FactKey::SeasonEpisodeCount,
    FactKey::EpisodeTargetDurationSeconds,
    FactKey::ScenesPerEpisode,
    FactKey::CoreCastSize,
    FactKey::Language,
    FactKey::ContentRating,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      FactKey::SeasonEpisodeCount => "season_episode_count",
      FactKey::EpisodeTargetDurationSeconds => "episode_target_duration_seconds",
      FactKey::ScenesPerEpisode => "scenes_per_episode",
      FactKey::CoreCastSize => "core_cast_size",
      FactKey::Language => "language",
      FactKey::ContentRating => "content_rating",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "season_episode_count" => Ok(FactKey::SeasonEpisodeCount),
      "episode_target_duration_seconds" => {
        Ok(FactKey::EpisodeTargetDurationSeconds)
      }
      "scenes_per_episode" => Ok(FactKey::ScenesPerEpisode),
      "core_cast_size" => Ok(FactKey::CoreCastSize),
      "language" => Ok(FactKey::Language),
      "content_rating" => Ok(FactKey::ContentRating),
      other => Err(Error::UnknownFactKey(other.to_string())),
    }
  }

  /// Built-in default, used when neither preset nor override supplies a
  /// value.
  pub fn default_value(&self) -> FactValue {
    match self {
      FactKey::SeasonEpisodeCount => FactValue::Int(8),
      FactKey::EpisodeTargetDurationSeconds => FactValue::Int(60),
      FactKey::ScenesPerEpisode => FactValue::Int(4),
      FactKey::CoreCastSize => FactValue::Int(5),
      FactKey::Language => FactValue::Text("en".to_string()),
      FactKey::ContentRating => FactValue::Text("teen".to_string()),
    }
  }
}

/// A scalar fact value. Serialises untagged, so the canonical JSON carries
/// plain scalars (`60`, `"en"`, `true`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
  Int(i64),
  Text(String),
  Bool(bool),
}

impl FactValue {
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      FactValue::Int(n) => serde_json::Value::from(*n),
      FactValue::Text(s) => serde_json::Value::from(s.clone()),
      FactValue::Bool(b) => serde_json::Value::from(*b),
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      FactValue::Int(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      FactValue::Text(s) => Some(s),
      _ => None,
    }
  }
}

/// A fully-resolved fact set: every known key bound to a value.
pub type FactSet = BTreeMap<FactKey, FactValue>;

// ─── Canonical serialization and hash ────────────────────────────────────────

/// Render a fact set as canonical JSON: one object, keys sorted
/// lexicographically by wire name, no insignificant whitespace.
///
/// Two fact sets with equal values always render identically regardless of
/// how their maps were built.
pub fn canonical_json(facts: &FactSet) -> String {
  let ordered: BTreeMap<&'static str, serde_json::Value> = facts
    .iter()
    .map(|(key, value)| (key.as_str(), value.to_json()))
    .collect();

  let mut object = serde_json::Map::new();
  for (key, value) in ordered {
    object.insert(key.to_string(), value);
  }
  serde_json::Value::Object(object).to_string()
}

/// SHA-256 hex digest of the canonical JSON rendering.
pub fn resolver_hash(facts: &FactSet) -> String {
  let mut hasher = Sha256::new();
  hasher.update(canonical_json(facts).as_bytes());
  hex::encode(hasher.finalize())
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Which settings layer supplied a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
  Default,
  Preset,
  Override,
}

/// The resolver's output: the fact set, per-key source attribution, and the
/// canonical hash of the set.
#[derive(Debug, Clone, Serialize)]
pub struct Qualifications {
  pub facts:   FactSet,
  pub sources: BTreeMap<FactKey, FactSource>,
  pub hash:    String,
}

impl Qualifications {
  /// The planned number of episodes this season, per the resolved facts.
  pub fn episode_count(&self) -> u32 {
    self
      .facts
      .get(&FactKey::SeasonEpisodeCount)
      .and_then(FactValue::as_int)
      .and_then(|n| u32::try_from(n).ok())
      .unwrap_or(1)
  }
}

/// Collapse project settings into a resolved fact set and its hash.
///
/// Precedence per key, highest first: explicit override, format preset,
/// built-in default. Total — every known key always resolves.
pub fn resolve(settings: &ProjectSettings) -> Qualifications {
  let mut facts = FactSet::new();
  let mut sources = BTreeMap::new();

  for key in FactKey::ALL {
    let (value, source) = match settings.overrides.get(&key) {
      Some(v) => (v.clone(), FactSource::Override),
      None => match settings.preset.and_then(|p| p.value(key)) {
        Some(v) => (v, FactSource::Preset),
        None => (key.default_value(), FactSource::Default),
      },
    };
    facts.insert(key, value);
    sources.insert(key, source);
  }

  let hash = resolver_hash(&facts);
  Qualifications { facts, sources, hash }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use crate::project::FormatPreset;

  use super::*;

  #[test]
  fn identical_settings_identical_hash() {
    let settings = ProjectSettings {
      preset:    Some(FormatPreset::VerticalMinute),
      overrides: [(FactKey::Language, FactValue::Text("ko".into()))].into(),
    };
    let a = resolve(&settings);
    let b = resolve(&settings);
    assert_eq!(a.hash, b.hash);
    assert_eq!(a.facts, b.facts);
  }

  #[test]
  fn hash_ignores_map_construction_order() {
    let mut forward = FactSet::new();
    let mut reverse = FactSet::new();
    for key in FactKey::ALL {
      forward.insert(key, key.default_value());
    }
    for key in FactKey::ALL.iter().rev() {
      reverse.insert(*key, key.default_value());
    }
    assert_eq!(resolver_hash(&forward), resolver_hash(&reverse));
  }

  #[test]
  fn any_value_change_changes_hash() {
    let base = resolve(&ProjectSettings::default());
    for key in FactKey::ALL {
      let changed = ProjectSettings {
        preset:    None,
        overrides: [(key, FactValue::Int(9999))].into(),
      };
      let q = resolve(&changed);
      assert_ne!(base.hash, q.hash, "changing {key:?} must change the hash");
    }
  }

  #[test]
  fn canonical_json_sorts_keys() {
    let q = resolve(&ProjectSettings::default());
    let rendered = canonical_json(&q.facts);
    let keys: Vec<&str> = FactKey::ALL.iter().map(|k| k.as_str()).collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    let positions: Vec<usize> = sorted
      .iter()
      .map(|k| rendered.find(&format!("\"{k}\"")).unwrap())
      .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{rendered}");
  }

  #[test]
  fn override_beats_preset_beats_default() {
    let settings = ProjectSettings {
      preset:    Some(FormatPreset::VerticalMinute),
      overrides: [(
        FactKey::EpisodeTargetDurationSeconds,
        FactValue::Int(90),
      )]
      .into(),
    };
    let q = resolve(&settings);

    // Override wins.
    assert_eq!(
      q.facts.get(&FactKey::EpisodeTargetDurationSeconds),
      Some(&FactValue::Int(90))
    );
    assert_eq!(
      q.sources.get(&FactKey::EpisodeTargetDurationSeconds),
      Some(&FactSource::Override)
    );

    // Preset covers what it pins.
    assert_eq!(
      q.facts.get(&FactKey::SeasonEpisodeCount),
      Some(&FactValue::Int(80))
    );
    assert_eq!(
      q.sources.get(&FactKey::SeasonEpisodeCount),
      Some(&FactSource::Preset)
    );

    // Defaults fill the rest.
    assert_eq!(
      q.facts.get(&FactKey::Language),
      Some(&FactValue::Text("en".into()))
    );
    assert_eq!(q.sources.get(&FactKey::Language), Some(&FactSource::Default));
  }

  #[test]
  fn episode_count_reads_resolved_fact() {
    let settings = ProjectSettings {
      preset:    None,
      overrides: [(FactKey::SeasonEpisodeCount, FactValue::Int(5))].into(),
    };
    assert_eq!(resolve(&settings).episode_count(), 5);
    assert_eq!(resolve(&ProjectSettings::default()).episode_count(), 8);
  }
}
