//! Error types for `showrun-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown fact key: {0:?}")]
  UnknownFactKey(String),

  #[error("unknown format preset: {0:?}")]
  UnknownPreset(String),

  #[error("unknown lifecycle status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown lock source: {0:?}")]
  UnknownLockSource(String),

  #[error("episode index must be positive, got {0}")]
  InvalidIndex(i64),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
