//! Batch closing across teams.

use chrono::{DateTime, Utc};
use kaji_core::{
  closing::{CloseRunner, CloseScope},
  team::TeamId,
};

/// Per-run counters reported at the end of a batch. `windows` counts the
/// windows newly closed across all successful teams.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CloseSummary {
  pub processed: usize,
  pub succeeded: usize,
  pub failed:    usize,
  pub windows:   usize,
}

impl CloseSummary {
  pub fn is_success(&self) -> bool { self.failed == 0 }
}

/// Catch up `scope` for `team`, or for every closable team when `team` is
/// `None`. One team failing does not stop the others.
pub async fn run_close<R: CloseRunner>(
  runner: &R,
  scope: CloseScope,
  team: Option<TeamId>,
  now: DateTime<Utc>,
) -> Result<CloseSummary, R::Error> {
  let teams = match team {
    Some(team) => vec![team],
    None => runner.list_closable_teams().await?,
  };

  let mut summary = CloseSummary::default();
  for team in teams {
    summary.processed += 1;
    match runner.close_team(team, scope, now).await {
      Ok(reports) => {
        summary.succeeded += 1;
        let applied = reports.iter().filter(|r| r.applied).count();
        summary.windows += applied;
        tracing::info!(
          team_id = %team,
          %scope,
          windows = applied,
          last_month = reports.last().map(|r| r.month.as_str()).unwrap_or("-"),
          "team closed"
        );
      }
      Err(e) => {
        summary.failed += 1;
        tracing::error!(team_id = %team, %scope, error = %e, "close failed");
      }
    }
  }

  tracing::info!(
    %scope,
    processed = summary.processed,
    succeeded = summary.succeeded,
    failed = summary.failed,
    windows = summary.windows,
    "close run finished"
  );
  Ok(summary)
}
