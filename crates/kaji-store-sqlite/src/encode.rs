//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with fixed microsecond precision
//! so they sort lexicographically. Calendar dates are `YYYY-MM-DD`. UUIDs are
//! stored as hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use kaji_core::task::{PenaltyRule, Task, TaskKind};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const TASK_COLUMNS: &str =
  "task_id, team_id, title, kind, penalty_points, required_per_week, created_at";

/// Raw values read directly from a `tasks` row.
pub struct RawTask {
  pub task_id:           String,
  pub team_id:           String,
  pub title:             String,
  pub kind:              String,
  pub penalty_points:    i64,
  pub required_per_week: i64,
  pub created_at:        String,
}

impl RawTask {
  /// Map a row selected with [`TASK_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      task_id:           row.get(0)?,
      team_id:           row.get(1)?,
      title:             row.get(2)?,
      kind:              row.get(3)?,
      penalty_points:    row.get(4)?,
      required_per_week: row.get(5)?,
      created_at:        row.get(6)?,
    })
  }

  pub fn into_task(self) -> Result<Task> {
    Ok(Task {
      task_id:           decode_uuid(&self.task_id)?,
      team_id:           decode_uuid(&self.team_id)?,
      title:             self.title,
      kind:              self.kind.parse::<TaskKind>()?,
      penalty_points:    self.penalty_points,
      required_per_week: self.required_per_week,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

pub const RULE_COLUMNS: &str = "rule_id, team_id, name, threshold, created_at";

/// Raw values read directly from a `penalty_rules` row.
pub struct RawRule {
  pub rule_id:    String,
  pub team_id:    String,
  pub name:       String,
  pub threshold:  i64,
  pub created_at: String,
}

impl RawRule {
  /// Map a row selected with [`RULE_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rule_id:    row.get(0)?,
      team_id:    row.get(1)?,
      name:       row.get(2)?,
      threshold:  row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_rule(self) -> Result<PenaltyRule> {
    Ok(PenaltyRule {
      rule_id:    decode_uuid(&self.rule_id)?,
      team_id:    decode_uuid(&self.team_id)?,
      name:       self.name,
      threshold:  self.threshold,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
