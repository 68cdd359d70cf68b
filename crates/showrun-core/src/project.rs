//! Project — the envelope that owns a season's pipeline state.
//!
//! A project holds identity metadata plus the layered settings the
//! qualification resolver collapses into a fact set. Everything generated
//! (artifacts, snapshots, episodes) hangs off a project id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  facts::{FactKey, FactValue},
};

/// A named bundle of fact values for a common production format.
///
/// Presets sit between the built-in defaults and per-project overrides in the
/// resolution order: a preset pins some keys, overrides beat it, defaults
/// fill the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatPreset {
  /// Vertical micro-drama: many very short episodes.
  VerticalMinute,
  /// Mid-length web serial.
  WebSerial,
  /// Conventional broadcast half-hour.
  BroadcastHalfHour,
}

impl FormatPreset {
  pub fn as_str(&self) -> &'static str {
    match self {
      FormatPreset::VerticalMinute => "vertical_minute",
      FormatPreset::WebSerial => "web_serial",
      FormatPreset::BroadcastHalfHour => "broadcast_half_hour",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "vertical_minute" => Ok(FormatPreset::VerticalMinute),
      "web_serial" => Ok(FormatPreset::WebSerial),
      "broadcast_half_hour" => Ok(FormatPreset::BroadcastHalfHour),
      other => Err(Error::UnknownPreset(other.to_string())),
    }
  }

  /// The value this preset pins for `key`, if any.
  pub fn value(&self, key: FactKey) -> Option<FactValue> {
    use FactKey::*;
    let pinned = match self {
      FormatPreset::VerticalMinute => match key {
        SeasonEpisodeCount => 80,
        EpisodeTargetDurationSeconds => 60,
        ScenesPerEpisode => 3,
        _ => return None,
      },
      FormatPreset::WebSerial => match key {
        SeasonEpisodeCount => 12,
        EpisodeTargetDurationSeconds => 300,
        ScenesPerEpisode => 5,
        _ => return None,
      },
      FormatPreset::BroadcastHalfHour => match key {
        SeasonEpisodeCount => 10,
        EpisodeTargetDurationSeconds => 1320,
        ScenesPerEpisode => 12,
        _ => return None,
      },
    };
    Some(FactValue::Int(pinned))
  }
}

/// The resolver's input: an optional preset plus explicit per-key overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub preset:    Option<FormatPreset>,
  #[serde(default)]
  pub overrides: BTreeMap<FactKey, FactValue>,
}

/// A creative work under production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
  pub project_id: Uuid,
  pub title:      String,
  pub created_at: DateTime<Utc>,
  pub settings:   ProjectSettings,
}

/// Input for creating a project.
#[derive(Debug, Clone)]
pub struct NewProject {
  pub title:    String,
  pub settings: ProjectSettings,
}
