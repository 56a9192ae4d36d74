//! ClosingEngine: exactly-once evaluation of closed day/week/month windows.
//!
//! Each closer inserts a close-run dedupe row first. Zero affected rows means
//! the window was already closed and the call is a successful no-op that
//! neither bumps the revision nor emits an event. Per-task evaluation rows
//! guard individual penalties the same way. All steps of one close share the
//! coordinator's transaction, so a failure leaves no partial application.
//!
//! A window only sees the tasks and rules that existed before it ended.
//! Catch-up closes every finished window after the last recorded close run,
//! one transaction per window, so days nobody looked at still get closed.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use kaji_core::{
  calendar::{self, month_key},
  closing::{CloseReport, CloseRunner, CloseScope, MonthlySummary},
  event::{EntityKind, hints},
  task::TaskKind,
  team::TeamId,
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result, SqliteStore,
  store::Snapshot,
  coordinator::{Guard, Mutation},
  encode::{decode_date, decode_dt, decode_uuid, encode_date, encode_dt, encode_uuid},
  tx::TeamTx,
};

/// Totals row of `monthly_summaries`, without the triggered-rule set.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SummaryRow {
  pub daily_penalty_total:  i64,
  pub weekly_penalty_total: i64,
  pub is_closed:            bool,
  pub closed_at:            Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
enum PenaltyColumn {
  Daily,
  Weekly,
}

/// What a closer does when the month it books into is already finalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClosedMonth {
  /// Fail with `MonthClosed` and roll back.
  Reject,
  /// Record the window as closed without booking anything.
  Skip,
}

/// One closable window, resolved against a team's offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
  scope:   CloseScope,
  /// The window's first day.
  target:  NaiveDate,
  /// First day of the month the window books into.
  month:   NaiveDate,
  /// Local midnight after the window's last day.
  ends_at: DateTime<Utc>,
}

impl Window {
  fn new(scope: CloseScope, target: NaiveDate, offset: FixedOffset) -> Self {
    let (month, end) = match scope {
      CloseScope::Day => (calendar::month_start(target), calendar::next_day(target)),
      CloseScope::Week => {
        (calendar::week_attribution_month(target), calendar::next_week_start(target))
      }
      CloseScope::Month => (target, calendar::next_month_start(target)),
    };
    Self { scope, target, month, ends_at: calendar::local_midnight(end, offset) }
  }

  /// The most recent window of `scope` that has fully ended by `today`.
  fn latest_finished(scope: CloseScope, today: NaiveDate, offset: FixedOffset) -> Self {
    let target = match scope {
      CloseScope::Day => calendar::previous_day(today),
      CloseScope::Week => calendar::previous_week_start(today),
      CloseScope::Month => calendar::previous_month_start(today),
    };
    Self::new(scope, target, offset)
  }

  /// The window of `scope` containing `date`.
  fn containing(scope: CloseScope, date: NaiveDate, offset: FixedOffset) -> Self {
    let target = match scope {
      CloseScope::Day => date,
      CloseScope::Week => calendar::week_start(date),
      CloseScope::Month => calendar::month_start(date),
    };
    Self::new(scope, target, offset)
  }

  fn following(self, offset: FixedOffset) -> Self {
    let target = match self.scope {
      CloseScope::Day => calendar::next_day(self.target),
      CloseScope::Week => calendar::next_week_start(self.target),
      CloseScope::Month => calendar::next_month_start(self.target),
    };
    Self::new(self.scope, target, offset)
  }
}

// ─── Dedupe and summary primitives ───────────────────────────────────────────

impl TeamTx<'_> {
  /// Record that `scope` ran for `target`. Returns `false` if it already had.
  fn insert_close_run(&self, scope: CloseScope, target: NaiveDate) -> Result<bool> {
    let rows = self.conn.execute(
      "INSERT INTO close_runs (team_id, scope, target_date, created_at)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT DO NOTHING",
      rusqlite::params![
        self.team_param(),
        scope.run_scope(),
        encode_date(target),
        encode_dt(self.now()),
      ],
    )?;
    Ok(rows == 1)
  }

  /// Record that `task_id` was evaluated for `target` under `scope`.
  /// Returns `false` if it already was.
  fn insert_task_evaluation(&self, scope: CloseScope, target: NaiveDate, task_id: Uuid) -> Result<bool> {
    let scope = scope
      .evaluation_scope()
      .ok_or_else(|| Error::Invalid(format!("{scope} close does not evaluate tasks")))?;
    let rows = self.conn.execute(
      "INSERT INTO task_evaluations (team_id, scope, target_date, task_id, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5)
       ON CONFLICT DO NOTHING",
      rusqlite::params![
        self.team_param(),
        scope,
        encode_date(target),
        encode_uuid(task_id),
        encode_dt(self.now()),
      ],
    )?;
    Ok(rows == 1)
  }

  /// Idempotent get-or-create of the month's summary row. Write paths only.
  fn ensure_month_summary(&self, month: NaiveDate) -> Result<SummaryRow> {
    self.conn.execute(
      "INSERT INTO monthly_summaries (team_id, month_start) VALUES (?1, ?2)
       ON CONFLICT DO NOTHING",
      rusqlite::params![self.team_param(), encode_date(month)],
    )?;
    self.month_summary_row(month)
  }

  /// The month's summary row, or zero totals if nothing has touched the
  /// month yet. Never writes.
  pub(crate) fn month_summary_row(&self, month: NaiveDate) -> Result<SummaryRow> {
    let row: Option<(i64, i64, bool, Option<String>)> = self
      .conn
      .query_row(
        "SELECT daily_penalty_total, weekly_penalty_total, is_closed, closed_at
         FROM monthly_summaries WHERE team_id = ?1 AND month_start = ?2",
        rusqlite::params![self.team_param(), encode_date(month)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;
    let Some((daily, weekly, closed, closed_at)) = row else {
      return Ok(SummaryRow::default());
    };
    Ok(SummaryRow {
      daily_penalty_total:  daily,
      weekly_penalty_total: weekly,
      is_closed:            closed,
      closed_at:            closed_at.as_deref().map(decode_dt).transpose()?,
    })
  }

  /// Target date of the newest close run recorded for `scope`.
  fn latest_close_target(&self, scope: CloseScope) -> Result<Option<NaiveDate>> {
    let latest: Option<String> = self.conn.query_row(
      "SELECT MAX(target_date) FROM close_runs WHERE team_id = ?1 AND scope = ?2",
      rusqlite::params![self.team_param(), scope.run_scope()],
      |row| row.get(0),
    )?;
    latest.as_deref().map(decode_date).transpose()
  }

  pub(crate) fn triggered_rule_ids(&self, month: NaiveDate) -> Result<Vec<Uuid>> {
    let mut stmt = self.conn.prepare(
      "SELECT t.rule_id FROM monthly_triggered_rules t
       JOIN penalty_rules r ON r.rule_id = t.rule_id
       WHERE t.team_id = ?1 AND t.month_start = ?2
       ORDER BY r.threshold, r.created_at, r.rowid",
    )?;
    let ids = stmt
      .query_map(rusqlite::params![self.team_param(), encode_date(month)], |row| {
        row.get::<_, String>(0)
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    ids.iter().map(|id| decode_uuid(id)).collect()
  }

  pub(crate) fn monthly_summary(&self, month: NaiveDate) -> Result<MonthlySummary> {
    let row = self.month_summary_row(month)?;
    Ok(MonthlySummary {
      team_id:              self.team(),
      month:                month_key(month),
      daily_penalty_total:  row.daily_penalty_total,
      weekly_penalty_total: row.weekly_penalty_total,
      is_closed:            row.is_closed,
      closed_at:            row.closed_at,
      triggered_rule_ids:   self.triggered_rule_ids(month)?,
    })
  }

  /// Additively book `points` against the month. Never overwrites.
  fn add_penalty(&self, month: NaiveDate, column: PenaltyColumn, points: i64) -> Result<()> {
    let sql = match column {
      PenaltyColumn::Daily => {
        "UPDATE monthly_summaries SET daily_penalty_total = daily_penalty_total + ?3
         WHERE team_id = ?1 AND month_start = ?2 AND is_closed = 0"
      }
      PenaltyColumn::Weekly => {
        "UPDATE monthly_summaries SET weekly_penalty_total = weekly_penalty_total + ?3
         WHERE team_id = ?1 AND month_start = ?2 AND is_closed = 0"
      }
    };
    let rows =
      self.conn.execute(sql, rusqlite::params![self.team_param(), encode_date(month), points])?;
    if rows == 0 {
      return Err(Error::MonthClosed { month: month_key(month) });
    }
    Ok(())
  }

  /// Clear-then-insert the triggered rule set and freeze the month.
  fn finalize_month(&self, month: NaiveDate, triggered: &[Uuid]) -> Result<()> {
    let month_str = encode_date(month);
    self.conn.execute(
      "DELETE FROM monthly_triggered_rules WHERE team_id = ?1 AND month_start = ?2",
      rusqlite::params![self.team_param(), month_str],
    )?;
    let mut insert = self.conn.prepare(
      "INSERT INTO monthly_triggered_rules (team_id, month_start, rule_id) VALUES (?1, ?2, ?3)",
    )?;
    for rule_id in triggered {
      insert.execute(rusqlite::params![self.team_param(), month_str, encode_uuid(*rule_id)])?;
    }
    self.conn.execute(
      "UPDATE monthly_summaries SET is_closed = 1, closed_at = ?3
       WHERE team_id = ?1 AND month_start = ?2",
      rusqlite::params![self.team_param(), month_str, encode_dt(self.now())],
    )?;
    Ok(())
  }
}

// ─── Window closers ──────────────────────────────────────────────────────────

/// Close one day: penalise every daily task that existed by the end of the
/// day and has no completion on it.
fn close_day(tx: &TeamTx<'_>, window: Window, on_closed: ClosedMonth) -> Result<Mutation<()>> {
  if !tx.insert_close_run(CloseScope::Day, window.target)? {
    return Ok(Mutation::Unchanged(()));
  }
  if month_is_closed(tx, window, on_closed)? {
    return Ok(Mutation::Unchanged(()));
  }

  for task in tx.tasks_created_before(TaskKind::Daily, window.ends_at)? {
    if !tx.insert_task_evaluation(CloseScope::Day, window.target, task.task_id)? {
      continue;
    }
    if task.penalty_points > 0 && !tx.has_completion(task.task_id, window.target)? {
      tx.add_penalty(window.month, PenaltyColumn::Daily, task.penalty_points)?;
    }
  }
  Ok(Mutation::Applied(()))
}

/// Close one week: penalise every weekly task that existed by the end of
/// the week and was completed fewer times than it requires.
fn close_week(tx: &TeamTx<'_>, window: Window, on_closed: ClosedMonth) -> Result<Mutation<()>> {
  if !tx.insert_close_run(CloseScope::Week, window.target)? {
    return Ok(Mutation::Unchanged(()));
  }
  if month_is_closed(tx, window, on_closed)? {
    return Ok(Mutation::Unchanged(()));
  }

  let end = calendar::week_end(window.target);
  for task in tx.tasks_created_before(TaskKind::Weekly, window.ends_at)? {
    if !tx.insert_task_evaluation(CloseScope::Week, window.target, task.task_id)? {
      continue;
    }
    let done = tx.count_completions(task.task_id, window.target, end)?;
    if task.penalty_points > 0 && done < task.required_per_week {
      tx.add_penalty(window.month, PenaltyColumn::Weekly, task.penalty_points)?;
    }
  }
  Ok(Mutation::Applied(()))
}

/// Finalise one month: trigger every rule that existed by the end of the
/// month and whose threshold is at or below the month's combined total.
fn close_month(tx: &TeamTx<'_>, window: Window) -> Result<Mutation<()>> {
  let month = window.month;
  if !tx.insert_close_run(CloseScope::Month, month)? {
    return Ok(Mutation::Unchanged(()));
  }
  let summary = tx.ensure_month_summary(month)?;
  if summary.is_closed {
    return Ok(Mutation::Unchanged(()));
  }

  let total = summary.daily_penalty_total + summary.weekly_penalty_total;
  let triggered: Vec<Uuid> = tx
    .rules_created_before(window.ends_at)?
    .into_iter()
    .take_while(|rule| rule.threshold <= total)
    .map(|rule| rule.rule_id)
    .collect();
  tx.finalize_month(month, &triggered)?;
  tracing::info!(
    team_id = %tx.team(),
    month = %month_key(month),
    total,
    triggered = triggered.len(),
    "month finalised"
  );
  Ok(Mutation::Applied(()))
}

/// Whether a day or week must stop because its month is final. Errors
/// under [`ClosedMonth::Reject`].
fn month_is_closed(tx: &TeamTx<'_>, window: Window, on_closed: ClosedMonth) -> Result<bool> {
  if !tx.ensure_month_summary(window.month)?.is_closed {
    return Ok(false);
  }
  match on_closed {
    ClosedMonth::Reject => Err(Error::MonthClosed { month: month_key(window.month) }),
    ClosedMonth::Skip => {
      tracing::warn!(
        team_id = %tx.team(),
        scope = %window.scope,
        target = %encode_date(window.target),
        month = %month_key(window.month),
        "month already final; window recorded without penalties"
      );
      Ok(true)
    }
  }
}

fn apply_window(tx: &TeamTx<'_>, window: Window, on_closed: ClosedMonth) -> Result<Mutation<()>> {
  match window.scope {
    CloseScope::Day => close_day(tx, window, on_closed),
    CloseScope::Week => close_week(tx, window, on_closed),
    CloseScope::Month => close_month(tx, window),
  }
}

// ─── Store entry points ──────────────────────────────────────────────────────

impl SqliteStore {
  /// Close the most recent finished `scope` window for `team` as of `now`.
  ///
  /// Safe to repeat: a window that was already closed yields a report with
  /// `applied == false` and leaves the revision untouched. A day or week
  /// whose month is already final fails with `MonthClosed`.
  pub async fn close(
    &self,
    team: TeamId,
    scope: CloseScope,
    now: DateTime<Utc>,
    guard: Guard,
  ) -> Result<CloseReport> {
    let offset = self.team_offset(team).await?;
    let window = Window::latest_finished(scope, calendar::local_date(now, offset), offset);
    self.close_window(team, window, now, guard, ClosedMonth::Reject).await
  }

  pub async fn close_day(&self, team: TeamId, now: DateTime<Utc>, guard: Guard) -> Result<CloseReport> {
    self.close(team, CloseScope::Day, now, guard).await
  }

  pub async fn close_week(&self, team: TeamId, now: DateTime<Utc>, guard: Guard) -> Result<CloseReport> {
    self.close(team, CloseScope::Week, now, guard).await
  }

  pub async fn close_month(&self, team: TeamId, now: DateTime<Utc>, guard: Guard) -> Result<CloseReport> {
    self.close(team, CloseScope::Month, now, guard).await
  }

  /// Close every finished `scope` window not closed yet, oldest first.
  ///
  /// Starts after the newest recorded close run, or at the window holding
  /// the team's first task when there is none. A team without tasks has
  /// nothing to close. Each window is its own transaction and revision bump.
  /// Windows whose month is already final are recorded without penalties.
  pub async fn catch_up(
    &self,
    team: TeamId,
    scope: CloseScope,
    now: DateTime<Utc>,
  ) -> Result<Vec<CloseReport>> {
    let offset = self.team_offset(team).await?;
    let last = Window::latest_finished(scope, calendar::local_date(now, offset), offset);

    let first = self
      .read_team(team, move |tx| {
        if let Some(latest) = tx.latest_close_target(scope)? {
          return Ok(Some(Window::new(scope, latest, offset).following(offset)));
        }
        Ok(
          tx.earliest_task_created_at()?
            .map(|at| Window::containing(scope, calendar::local_date(at, offset), offset)),
        )
      })
      .await?
      .value;

    let mut reports = Vec::new();
    let mut next = first;
    while let Some(window) = next.filter(|w| w.target <= last.target) {
      reports.push(self.close_window(team, window, now, Guard::Internal, ClosedMonth::Skip).await?);
      next = Some(window.following(offset));
    }
    if !reports.is_empty() {
      tracing::info!(team_id = %team, %scope, windows = reports.len(), "caught up");
    }
    Ok(reports)
  }

  async fn close_window(
    &self,
    team: TeamId,
    window: Window,
    now: DateTime<Utc>,
    guard: Guard,
    on_closed: ClosedMonth,
  ) -> Result<CloseReport> {
    let scope = window.scope;
    let target_str = encode_date(window.target);
    let hint_target = target_str.clone();

    let committed = self
      .run_mutation(
        team,
        guard,
        EntityKind::Closing,
        now,
        move |_| hints([("action", scope.run_scope()), ("target", hint_target.as_str())]),
        move |tx| apply_window(tx, window, on_closed),
      )
      .await?;

    let report = CloseReport {
      scope,
      closed_at: now,
      target: window.target,
      month: month_key(window.month),
      applied: committed.revision.is_some(),
      revision: committed.revision,
    };
    if report.applied {
      tracing::info!(team_id = %team, %scope, target = %target_str, month = %report.month, "window closed");
    } else {
      tracing::debug!(team_id = %team, %scope, target = %target_str, "window already closed");
    }
    Ok(report)
  }

  /// Opportunistic closing for read paths: catch up days, then weeks, then
  /// months, so a month close always sees final daily and weekly totals.
  pub async fn auto_close(&self, team: TeamId, now: DateTime<Utc>) -> Result<Vec<CloseReport>> {
    let mut reports = self.catch_up(team, CloseScope::Day, now).await?;
    reports.extend(self.catch_up(team, CloseScope::Week, now).await?);
    reports.extend(self.catch_up(team, CloseScope::Month, now).await?);
    Ok(reports)
  }

  /// The summary for `month` with its triggered rules. A month nothing has
  /// touched yet reads as open with zero totals.
  pub async fn monthly_summary(
    &self,
    team: TeamId,
    month: NaiveDate,
  ) -> Result<Snapshot<MonthlySummary>> {
    self.read_team(team, move |tx| tx.monthly_summary(month)).await
  }

  /// Teams with at least one member, oldest first.
  pub async fn list_closable_teams(&self) -> Result<Vec<TeamId>> {
    let ids: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT t.team_id FROM teams t
           WHERE EXISTS (SELECT 1 FROM team_members m WHERE m.team_id = t.team_id)
           ORDER BY t.created_at, t.rowid",
        )?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    ids.iter().map(|id| decode_uuid(id)).collect()
  }

  pub(crate) async fn team_offset(&self, team: TeamId) -> Result<FixedOffset> {
    let team_str = encode_uuid(team);
    let minutes: Option<i32> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT utc_offset_minutes FROM teams WHERE team_id = ?1",
              rusqlite::params![team_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    let minutes = minutes.ok_or(Error::TeamNotFound(team))?;
    Ok(calendar::offset_from_minutes(minutes)?)
  }
}

impl CloseRunner for SqliteStore {
  type Error = Error;

  async fn list_closable_teams(&self) -> Result<Vec<TeamId>> {
    SqliteStore::list_closable_teams(self).await
  }

  async fn close_team(
    &self,
    team: TeamId,
    scope: CloseScope,
    now: DateTime<Utc>,
  ) -> Result<Vec<CloseReport>> {
    self.catch_up(team, scope, now).await
  }
}
