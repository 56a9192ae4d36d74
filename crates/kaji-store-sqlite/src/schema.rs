//! SQL schema for the Kaji SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS users (
    user_id     TEXT PRIMARY KEY,
    email       TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

-- state_revision is the single serialisation point for team-state writes.
CREATE TABLE IF NOT EXISTS teams (
    team_id             TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    utc_offset_minutes  INTEGER NOT NULL,
    state_revision      INTEGER NOT NULL DEFAULT 0 CHECK (state_revision >= 0),
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS team_members (
    team_id     TEXT NOT NULL REFERENCES teams(team_id),
    user_id     TEXT NOT NULL REFERENCES users(user_id),
    joined_at   TEXT NOT NULL,
    PRIMARY KEY (team_id, user_id)
);

-- Only the SHA-256 of a bearer token is stored.
CREATE TABLE IF NOT EXISTS sessions (
    token_hash  TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES users(user_id),
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    task_id            TEXT PRIMARY KEY,
    team_id            TEXT NOT NULL REFERENCES teams(team_id),
    title              TEXT NOT NULL,
    kind               TEXT NOT NULL,   -- 'daily' | 'weekly'
    penalty_points     INTEGER NOT NULL CHECK (penalty_points >= 0),
    required_per_week  INTEGER NOT NULL DEFAULT 1,
    created_at         TEXT NOT NULL,
    deleted_at         TEXT
);

CREATE TABLE IF NOT EXISTS task_completions (
    task_id       TEXT NOT NULL REFERENCES tasks(task_id),
    target_date   TEXT NOT NULL,       -- YYYY-MM-DD, team-local
    completed_by  TEXT NOT NULL REFERENCES users(user_id),
    created_at    TEXT NOT NULL,
    PRIMARY KEY (task_id, target_date)
);

CREATE TABLE IF NOT EXISTS penalty_rules (
    rule_id     TEXT PRIMARY KEY,
    team_id     TEXT NOT NULL REFERENCES teams(team_id),
    name        TEXT NOT NULL,
    threshold   INTEGER NOT NULL CHECK (threshold >= 0),
    created_at  TEXT NOT NULL,
    deleted_at  TEXT
);

-- Existence of a row means the window's aggregation already ran.
CREATE TABLE IF NOT EXISTS close_runs (
    team_id      TEXT NOT NULL REFERENCES teams(team_id),
    scope        TEXT NOT NULL,        -- 'close_day' | 'close_week' | 'close_month'
    target_date  TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    PRIMARY KEY (team_id, scope, target_date)
);

-- Finer-grained guard: one evaluation per task per window.
CREATE TABLE IF NOT EXISTS task_evaluations (
    team_id      TEXT NOT NULL REFERENCES teams(team_id),
    scope        TEXT NOT NULL,        -- 'penalty_day' | 'penalty_week'
    target_date  TEXT NOT NULL,
    task_id      TEXT NOT NULL REFERENCES tasks(task_id),
    created_at   TEXT NOT NULL,
    PRIMARY KEY (team_id, scope, target_date, task_id)
);

-- Totals are only ever incremented until is_closed is set.
CREATE TABLE IF NOT EXISTS monthly_summaries (
    team_id               TEXT NOT NULL REFERENCES teams(team_id),
    month_start           TEXT NOT NULL,
    daily_penalty_total   INTEGER NOT NULL DEFAULT 0,
    weekly_penalty_total  INTEGER NOT NULL DEFAULT 0,
    is_closed             INTEGER NOT NULL DEFAULT 0,
    closed_at             TEXT,
    PRIMARY KEY (team_id, month_start)
);

CREATE TABLE IF NOT EXISTS monthly_triggered_rules (
    team_id      TEXT NOT NULL,
    month_start  TEXT NOT NULL,
    rule_id      TEXT NOT NULL REFERENCES penalty_rules(rule_id),
    PRIMARY KEY (team_id, month_start, rule_id),
    FOREIGN KEY (team_id, month_start) REFERENCES monthly_summaries(team_id, month_start)
);

CREATE INDEX IF NOT EXISTS tasks_team_idx         ON tasks(team_id);
CREATE INDEX IF NOT EXISTS penalty_rules_team_idx ON penalty_rules(team_id);
CREATE INDEX IF NOT EXISTS team_members_user_idx  ON team_members(user_id);

PRAGMA user_version = 1;
";
