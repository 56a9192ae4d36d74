//! [`TeamTx`]: transaction-scoped data access handed to mutate functions.
//!
//! Mutate functions receive a `TeamTx` opened by the mutation coordinator over
//! a `BEGIN IMMEDIATE` transaction; everything done through it commits or
//! rolls back together with the revision bump. Read paths reuse the same
//! accessor over a deferred read transaction.

use chrono::{DateTime, NaiveDate, Utc};
use kaji_core::{
  task::{CompletionToggle, NewPenaltyRule, NewTask, PenaltyRule, PenaltyRulePatch, Task, TaskKind},
  team::TeamId,
};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RULE_COLUMNS, RawRule, RawTask, TASK_COLUMNS, decode_dt, encode_date, encode_dt, encode_uuid,
  },
};

pub struct TeamTx<'a> {
  pub(crate) conn: &'a Connection,
  team:            TeamId,
  team_str:        String,
  now:             DateTime<Utc>,
}

impl<'a> TeamTx<'a> {
  pub(crate) fn new(conn: &'a Connection, team: TeamId, now: DateTime<Utc>) -> Self {
    Self { conn, team, team_str: encode_uuid(team), now }
  }

  pub fn team(&self) -> TeamId { self.team }

  /// The time this transaction stamps onto the rows it writes.
  pub fn now(&self) -> DateTime<Utc> { self.now }

  pub(crate) fn team_param(&self) -> &str { &self.team_str }

  // ── Tasks ─────────────────────────────────────────────────────────────────

  pub fn insert_task(&self, task_id: Uuid, input: NewTask) -> Result<Task> {
    let title = input.title.trim().to_string();
    if title.is_empty() {
      return Err(Error::Invalid("title cannot be empty".into()));
    }
    if input.penalty_points < 0 {
      return Err(Error::Invalid("penaltyPoints must be non-negative".into()));
    }
    let required_per_week = match input.kind {
      TaskKind::Daily => 1,
      TaskKind::Weekly => input.required_per_week.unwrap_or(1),
    };
    if required_per_week < 1 {
      return Err(Error::Invalid("requiredPerWeek must be at least 1".into()));
    }

    let task = Task {
      task_id,
      team_id: self.team,
      title,
      kind: input.kind,
      penalty_points: input.penalty_points,
      required_per_week,
      created_at: self.now,
    };
    self.conn.execute(
      "INSERT INTO tasks (
         task_id, team_id, title, kind, penalty_points, required_per_week, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      rusqlite::params![
        encode_uuid(task.task_id),
        self.team_str,
        task.title,
        task.kind.as_str(),
        task.penalty_points,
        task.required_per_week,
        encode_dt(task.created_at),
      ],
    )?;
    Ok(task)
  }

  /// Active tasks of this team, oldest first.
  pub fn active_tasks(&self) -> Result<Vec<Task>> {
    let mut stmt = self.conn.prepare(&format!(
      "SELECT {TASK_COLUMNS} FROM tasks
       WHERE team_id = ?1 AND deleted_at IS NULL
       ORDER BY created_at, rowid"
    ))?;
    let raws = stmt
      .query_map(rusqlite::params![self.team_str], RawTask::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawTask::into_task).collect()
  }

  /// Active tasks of `kind` that already existed before `cutoff`, oldest
  /// first. A window only evaluates tasks created before it ended.
  pub fn tasks_created_before(&self, kind: TaskKind, cutoff: DateTime<Utc>) -> Result<Vec<Task>> {
    let mut stmt = self.conn.prepare(&format!(
      "SELECT {TASK_COLUMNS} FROM tasks
       WHERE team_id = ?1 AND deleted_at IS NULL AND kind = ?2 AND created_at < ?3
       ORDER BY created_at, rowid"
    ))?;
    let raws = stmt
      .query_map(
        rusqlite::params![self.team_str, kind.as_str(), encode_dt(cutoff)],
        RawTask::from_row,
      )?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawTask::into_task).collect()
  }

  /// Creation time of the team's first task, deleted ones included.
  pub fn earliest_task_created_at(&self) -> Result<Option<DateTime<Utc>>> {
    let at: Option<String> = self.conn.query_row(
      "SELECT MIN(created_at) FROM tasks WHERE team_id = ?1",
      rusqlite::params![self.team_str],
      |row| row.get(0),
    )?;
    at.as_deref().map(decode_dt).transpose()
  }

  pub fn active_task(&self, task_id: Uuid) -> Result<Task> {
    self
      .conn
      .query_row(
        &format!(
          "SELECT {TASK_COLUMNS} FROM tasks
           WHERE task_id = ?1 AND team_id = ?2 AND deleted_at IS NULL"
        ),
        rusqlite::params![encode_uuid(task_id), self.team_str],
        RawTask::from_row,
      )
      .optional()?
      .ok_or(Error::TaskNotFound(task_id))?
      .into_task()
  }

  pub fn soft_delete_task(&self, task_id: Uuid) -> Result<()> {
    let rows = self.conn.execute(
      "UPDATE tasks SET deleted_at = ?3
       WHERE task_id = ?1 AND team_id = ?2 AND deleted_at IS NULL",
      rusqlite::params![encode_uuid(task_id), self.team_str, encode_dt(self.now)],
    )?;
    if rows == 0 {
      return Err(Error::TaskNotFound(task_id));
    }
    Ok(())
  }

  // ── Completions ───────────────────────────────────────────────────────────

  pub fn has_completion(&self, task_id: Uuid, date: NaiveDate) -> Result<bool> {
    Ok(
      self
        .conn
        .query_row(
          "SELECT 1 FROM task_completions WHERE task_id = ?1 AND target_date = ?2",
          rusqlite::params![encode_uuid(task_id), encode_date(date)],
          |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false),
    )
  }

  /// Completions of `task_id` on dates in `from..=to`.
  pub fn count_completions(&self, task_id: Uuid, from: NaiveDate, to: NaiveDate) -> Result<i64> {
    Ok(self.conn.query_row(
      "SELECT COUNT(*) FROM task_completions
       WHERE task_id = ?1 AND target_date BETWEEN ?2 AND ?3",
      rusqlite::params![encode_uuid(task_id), encode_date(from), encode_date(to)],
      |row| row.get(0),
    )?)
  }

  /// Flip the completion mark of an active task for `date`.
  pub fn toggle_completion(
    &self,
    task_id: Uuid,
    date: NaiveDate,
    user: Uuid,
  ) -> Result<CompletionToggle> {
    self.active_task(task_id)?;
    let task_str = encode_uuid(task_id);
    let date_str = encode_date(date);

    let removed = self.conn.execute(
      "DELETE FROM task_completions WHERE task_id = ?1 AND target_date = ?2",
      rusqlite::params![task_str, date_str],
    )?;
    if removed == 0 {
      self.conn.execute(
        "INSERT INTO task_completions (task_id, target_date, completed_by, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![task_str, date_str, encode_uuid(user), encode_dt(self.now)],
      )?;
    }
    Ok(CompletionToggle { task_id, date, completed: removed == 0 })
  }

  // ── Penalty rules ─────────────────────────────────────────────────────────

  pub fn insert_rule(&self, rule_id: Uuid, input: NewPenaltyRule) -> Result<PenaltyRule> {
    let name = validate_rule_name(&input.name)?;
    validate_threshold(input.threshold)?;
    let rule = PenaltyRule {
      rule_id,
      team_id: self.team,
      name,
      threshold: input.threshold,
      created_at: self.now,
    };
    self.conn.execute(
      "INSERT INTO penalty_rules (rule_id, team_id, name, threshold, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        encode_uuid(rule.rule_id),
        self.team_str,
        rule.name,
        rule.threshold,
        encode_dt(rule.created_at),
      ],
    )?;
    Ok(rule)
  }

  pub fn active_rule(&self, rule_id: Uuid) -> Result<PenaltyRule> {
    self
      .conn
      .query_row(
        &format!(
          "SELECT {RULE_COLUMNS} FROM penalty_rules
           WHERE rule_id = ?1 AND team_id = ?2 AND deleted_at IS NULL"
        ),
        rusqlite::params![encode_uuid(rule_id), self.team_str],
        RawRule::from_row,
      )
      .optional()?
      .ok_or(Error::RuleNotFound(rule_id))?
      .into_rule()
  }

  /// Active rules of this team sorted ascending by threshold.
  pub fn active_rules(&self) -> Result<Vec<PenaltyRule>> {
    let mut stmt = self.conn.prepare(&format!(
      "SELECT {RULE_COLUMNS} FROM penalty_rules
       WHERE team_id = ?1 AND deleted_at IS NULL
       ORDER BY threshold, created_at, rowid"
    ))?;
    let raws = stmt
      .query_map(rusqlite::params![self.team_str], RawRule::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawRule::into_rule).collect()
  }

  /// Active rules created before `cutoff`, sorted ascending by threshold.
  pub fn rules_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<PenaltyRule>> {
    let mut stmt = self.conn.prepare(&format!(
      "SELECT {RULE_COLUMNS} FROM penalty_rules
       WHERE team_id = ?1 AND deleted_at IS NULL AND created_at < ?2
       ORDER BY threshold, created_at, rowid"
    ))?;
    let raws = stmt
      .query_map(rusqlite::params![self.team_str, encode_dt(cutoff)], RawRule::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawRule::into_rule).collect()
  }

  pub fn update_rule(&self, rule_id: Uuid, patch: PenaltyRulePatch) -> Result<PenaltyRule> {
    let mut rule = self.active_rule(rule_id)?;
    if let Some(name) = patch.name {
      rule.name = validate_rule_name(&name)?;
    }
    if let Some(threshold) = patch.threshold {
      validate_threshold(threshold)?;
      rule.threshold = threshold;
    }
    self.conn.execute(
      "UPDATE penalty_rules SET name = ?2, threshold = ?3 WHERE rule_id = ?1",
      rusqlite::params![encode_uuid(rule_id), rule.name, rule.threshold],
    )?;
    Ok(rule)
  }

  pub fn soft_delete_rule(&self, rule_id: Uuid) -> Result<()> {
    let rows = self.conn.execute(
      "UPDATE penalty_rules SET deleted_at = ?3
       WHERE rule_id = ?1 AND team_id = ?2 AND deleted_at IS NULL",
      rusqlite::params![encode_uuid(rule_id), self.team_str, encode_dt(self.now)],
    )?;
    if rows == 0 {
      return Err(Error::RuleNotFound(rule_id));
    }
    Ok(())
  }
}

fn validate_rule_name(name: &str) -> Result<String> {
  let name = name.trim();
  if name.is_empty() {
    return Err(Error::Invalid("name cannot be empty".into()));
  }
  Ok(name.to_string())
}

fn validate_threshold(threshold: i64) -> Result<()> {
  if threshold < 0 {
    return Err(Error::Invalid("threshold must be non-negative".into()));
  }
  Ok(())
}
