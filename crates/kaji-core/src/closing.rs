//! Closing vocabulary shared by the store, the HTTP layer and the ops tool.

use std::{fmt, future::Future, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  team::{Revision, TeamId},
};

/// A closable window granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseScope {
  Day,
  Week,
  Month,
}

impl CloseScope {
  /// Scope recorded in the close-run dedupe table.
  pub fn run_scope(self) -> &'static str {
    match self {
      Self::Day => "close_day",
      Self::Week => "close_week",
      Self::Month => "close_month",
    }
  }

  /// Scope recorded in the per-task evaluation dedupe table, if the window
  /// evaluates tasks individually.
  pub fn evaluation_scope(self) -> Option<&'static str> {
    match self {
      Self::Day => Some("penalty_day"),
      Self::Week => Some("penalty_week"),
      Self::Month => None,
    }
  }
}

impl fmt::Display for CloseScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Day => "day",
      Self::Week => "week",
      Self::Month => "month",
    })
  }
}

impl FromStr for CloseScope {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "day" => Ok(Self::Day),
      "week" => Ok(Self::Week),
      "month" => Ok(Self::Month),
      other => Err(Error::UnknownScope(other.to_string())),
    }
  }
}

/// Outcome of one close invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseReport {
  pub scope:     CloseScope,
  pub closed_at: DateTime<Utc>,
  /// The closed window's first day.
  pub target:    NaiveDate,
  /// `YYYY-MM` of the monthly summary the window affects.
  pub month:     String,
  /// `false` when the window had already been closed.
  pub applied:   bool,
  /// The team revision produced by an applied close.
  pub revision:  Option<Revision>,
}

/// Running and finalised penalty totals for one team-month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
  pub team_id:              TeamId,
  pub month:                String,
  pub daily_penalty_total:  i64,
  pub weekly_penalty_total: i64,
  pub is_closed:            bool,
  pub closed_at:            Option<DateTime<Utc>>,
  pub triggered_rule_ids:   Vec<Uuid>,
}

impl MonthlySummary {
  pub fn total(&self) -> i64 { self.daily_penalty_total + self.weekly_penalty_total }
}

/// Batch-closing seam used by the operator tool.
pub trait CloseRunner: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Teams eligible for closing, oldest first.
  fn list_closable_teams(
    &self,
  ) -> impl Future<Output = Result<Vec<TeamId>, Self::Error>> + Send + '_;

  /// Close every finished `scope` window of `team` that is still open as of
  /// `now`, oldest first, without a client precondition.
  fn close_team(
    &self,
    team: TeamId,
    scope: CloseScope,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<CloseReport>, Self::Error>> + Send + '_;
}
