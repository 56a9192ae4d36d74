//! Chores and penalty rules.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, team::TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
  /// Evaluated once per day: penalised if not completed that day.
  Daily,
  /// Evaluated once per week against `required_per_week`.
  Weekly,
}

impl TaskKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Daily => "daily",
      Self::Weekly => "weekly",
    }
  }
}

impl FromStr for TaskKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "daily" => Ok(Self::Daily),
      "weekly" => Ok(Self::Weekly),
      other => Err(Error::UnknownTaskKind(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub task_id:           Uuid,
  pub team_id:           TeamId,
  pub title:             String,
  pub kind:              TaskKind,
  pub penalty_points:    i64,
  pub required_per_week: i64,
  pub created_at:        DateTime<Utc>,
}

/// Input for creating a task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
  pub title:             String,
  pub kind:              TaskKind,
  pub penalty_points:    i64,
  /// Ignored for daily tasks; defaults to 1 for weekly ones.
  #[serde(default)]
  pub required_per_week: Option<i64>,
}

/// Result of toggling a completion mark.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionToggle {
  pub task_id:   Uuid,
  pub date:      NaiveDate,
  pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyRule {
  pub rule_id:    Uuid,
  pub team_id:    TeamId,
  pub name:       String,
  /// Month total at or above which this rule is triggered.
  pub threshold:  i64,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPenaltyRule {
  pub name:      String,
  pub threshold: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PenaltyRulePatch {
  pub name:      Option<String>,
  pub threshold: Option<i64>,
}
