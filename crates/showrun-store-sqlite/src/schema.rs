//! SQL schema for the showrun SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS projects (
    project_id  TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    settings    TEXT NOT NULL DEFAULT '{}'   -- JSON ProjectSettings
);

CREATE TABLE IF NOT EXISTS artifacts (
    artifact_id TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL REFERENCES projects(project_id),
    kind        TEXT NOT NULL,               -- wire name of ArtifactKind
    name        TEXT NOT NULL,
    pinned      INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    UNIQUE (project_id, kind, name)
);

-- Artifact content is strictly append-only: new versions supersede by seq,
-- no UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS artifact_versions (
    version_id    TEXT PRIMARY KEY,
    artifact_id   TEXT NOT NULL REFERENCES artifacts(artifact_id),
    seq           INTEGER NOT NULL,
    content       TEXT NOT NULL,
    recorded_hash TEXT,                      -- resolver hash at production time
    created_at    TEXT NOT NULL,
    UNIQUE (artifact_id, seq)
);

CREATE TABLE IF NOT EXISTS context_sets (
    set_id       TEXT PRIMARY KEY,
    project_id   TEXT NOT NULL REFERENCES projects(project_id),
    name         TEXT NOT NULL,
    is_default   INTEGER NOT NULL DEFAULT 0,
    artifact_ids TEXT NOT NULL DEFAULT '[]', -- JSON array of artifact uuids
    created_at   TEXT NOT NULL,
    UNIQUE (project_id, name)
);

-- Superseded snapshots are retained for audit; rows are never deleted.
CREATE TABLE IF NOT EXISTS canon_snapshots (
    snapshot_id       TEXT PRIMARY KEY,
    project_id        TEXT NOT NULL REFERENCES projects(project_id),
    seq               INTEGER NOT NULL,
    fact_hash         TEXT NOT NULL,
    episode_count     INTEGER NOT NULL,
    artifact_versions TEXT NOT NULL DEFAULT '[]', -- JSON array of version uuids
    status            TEXT NOT NULL,              -- 'active' | 'superseded'
    created_at        TEXT NOT NULL,
    UNIQUE (project_id, seq)
);

CREATE TABLE IF NOT EXISTS episodes (
    episode_id    TEXT PRIMARY KEY,
    project_id    TEXT NOT NULL REFERENCES projects(project_id),
    snapshot_id   TEXT NOT NULL REFERENCES canon_snapshots(snapshot_id),
    idx           INTEGER NOT NULL,          -- 1-based season position
    status        TEXT NOT NULL,
    locked_at     TEXT,                      -- set once, never updated again
    is_template   INTEGER NOT NULL DEFAULT 0,
    retryable     INTEGER NOT NULL DEFAULT 1,
    last_error    TEXT,
    deleted_at    TEXT,
    delete_reason TEXT,
    created_at    TEXT NOT NULL,
    UNIQUE (project_id, idx)
);

-- Episode content is strictly append-only, like artifact_versions.
CREATE TABLE IF NOT EXISTS episode_versions (
    version_id TEXT PRIMARY KEY,
    episode_id TEXT NOT NULL REFERENCES episodes(episode_id),
    seq        INTEGER NOT NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (episode_id, seq)
);

-- One row per lock or amendment; content is the frozen copy as locked.
CREATE TABLE IF NOT EXISTS lock_events (
    lock_event_id TEXT PRIMARY KEY,
    episode_id    TEXT NOT NULL REFERENCES episodes(episode_id),
    version_id    TEXT NOT NULL REFERENCES episode_versions(version_id),
    content       TEXT NOT NULL,
    source        TEXT NOT NULL,             -- 'initial' | 'amendment'
    patch_run_id  TEXT,
    locked_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS continuity_notes (
    episode_id    TEXT PRIMARY KEY REFERENCES episodes(episode_id),
    tail_excerpt  TEXT NOT NULL,
    metadata      TEXT NOT NULL,             -- JSON ContinuityMetadata
    lock_event_id TEXT NOT NULL REFERENCES lock_events(lock_event_id),
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS change_events (
    change_event_id TEXT PRIMARY KEY,
    project_id      TEXT NOT NULL REFERENCES projects(project_id),
    summary         TEXT NOT NULL,
    affected        TEXT,                    -- JSON array of indices, NULL until analysed
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patch_runs (
    patch_run_id     TEXT PRIMARY KEY,
    change_event_id  TEXT NOT NULL REFERENCES change_events(change_event_id),
    episode_id       TEXT NOT NULL REFERENCES episodes(episode_id),
    episode_idx      INTEGER NOT NULL,
    status           TEXT NOT NULL,
    proposed_content TEXT,
    reject_reason    TEXT,
    created_at       TEXT NOT NULL,
    resolved_at      TEXT
);

CREATE TABLE IF NOT EXISTS batch_cursors (
    project_id     TEXT PRIMARY KEY REFERENCES projects(project_id),
    next_idx       INTEGER NOT NULL,
    stop_requested INTEGER NOT NULL DEFAULT 0,
    status         TEXT NOT NULL,
    started_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

-- At most one active snapshot and one template episode per project.
CREATE UNIQUE INDEX IF NOT EXISTS snapshots_one_active
  ON canon_snapshots(project_id) WHERE status = 'active';
CREATE UNIQUE INDEX IF NOT EXISTS episodes_one_template
  ON episodes(project_id) WHERE is_template = 1;
CREATE UNIQUE INDEX IF NOT EXISTS context_sets_one_default
  ON context_sets(project_id) WHERE is_default = 1;

CREATE INDEX IF NOT EXISTS artifacts_project_idx      ON artifacts(project_id);
CREATE INDEX IF NOT EXISTS episodes_project_idx       ON episodes(project_id);
CREATE INDEX IF NOT EXISTS episode_versions_ep_idx    ON episode_versions(episode_id);
CREATE INDEX IF NOT EXISTS lock_events_ep_idx         ON lock_events(episode_id);
CREATE INDEX IF NOT EXISTS patch_runs_change_idx      ON patch_runs(change_event_id);
CREATE INDEX IF NOT EXISTS patch_runs_status_idx      ON patch_runs(status);
CREATE INDEX IF NOT EXISTS change_events_project_idx  ON change_events(project_id);

PRAGMA user_version = 1;
";
