//! The home screen read model; never stored, always derived.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::task::Task;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTaskStatus {
  pub task:            Task,
  pub completed_today: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTaskStatus {
  pub task:                 Task,
  pub week_completed_count: i64,
  pub required_per_week:    i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeView {
  /// `YYYY-MM` of today's month.
  pub month:                 String,
  pub today:                 NaiveDate,
  /// 1 on Monday through 7 on Sunday.
  pub elapsed_days_in_week:  u32,
  pub monthly_penalty_total: i64,
  pub daily_tasks:           Vec<DailyTaskStatus>,
  pub weekly_tasks:          Vec<WeeklyTaskStatus>,
}
