//! [`SqliteStore`]: handle over the SQLite file plus the team event hub.
//!
//! Accounts, sessions and team-scoped reads live here. Every team-state
//! write goes through [`run_with_revision_cas`](SqliteStore::run_with_revision_cas)
//! so it bumps the revision and notifies subscribers exactly once.

use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use kaji_core::{
  calendar,
  event::{EntityKind, Hints, hints},
  home::{DailyTaskStatus, HomeView, WeeklyTaskStatus},
  hub::TeamEventHub,
  task::{
    CompletionToggle, NewPenaltyRule, NewTask, PenaltyRule, PenaltyRulePatch, Task, TaskKind,
  },
  team::{EntityTag, TeamId, UserId},
};
use rand_core::{OsRng, RngCore as _};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use crate::{
  Error, Result,
  coordinator::{Committed, Mutation},
  encode::{decode_uuid, encode_dt, encode_uuid},
  revision,
  schema::SCHEMA,
  tx::TeamTx,
};

/// A team-scoped read together with the tag of the revision it observed.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
  pub etag:  EntityTag,
  pub value: T,
}

/// Length in bytes of a freshly issued bearer token, before hex encoding.
const TOKEN_BYTES: usize = 32;

// ─── Store ───────────────────────────────────────────────────────────────────

/// Kaji team state backed by a single SQLite file.
///
/// Cloning is cheap: the connection and the hub are both reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  pub(crate) hub:  TeamEventHub,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, hub: TeamEventHub::new() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, hub: TeamEventHub::new() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the hub events are published to.
  pub fn with_hub(mut self, hub: TeamEventHub) -> Self {
    self.hub = hub;
    self
  }

  pub fn hub(&self) -> &TeamEventHub { &self.hub }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a read closure over the team inside one deferred transaction, so
  /// the value and the returned tag come from the same snapshot.
  pub(crate) async fn read_team<T, F>(&self, team: TeamId, read: F) -> Result<Snapshot<T>>
  where
    F: FnOnce(&TeamTx<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let snapshot = revision::current_revision(&tx, team).and_then(|revision| {
          let value = read(&TeamTx::new(&tx, team, Utc::now()))?;
          Ok(Snapshot { etag: EntityTag::new(team, revision), value })
        });
        if snapshot.is_ok() {
          tx.commit()?;
        }
        Ok(snapshot)
      })
      .await?
  }
}

// ─── Users, teams, membership ────────────────────────────────────────────────

impl SqliteStore {
  pub async fn create_user(&self, email: &str) -> Result<UserId> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
      return Err(Error::Invalid("email cannot be empty".into()));
    }
    let user_id = Uuid::new_v4();
    let id_str = encode_uuid(user_id);
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (user_id, email, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, email, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(user_id)
  }

  /// Create a team owned by `owner`. The new team starts at revision 0.
  pub async fn create_team(
    &self,
    name: &str,
    owner: UserId,
    utc_offset_minutes: i32,
  ) -> Result<TeamId> {
    let name = name.trim().to_string();
    if name.is_empty() {
      return Err(Error::Invalid("team name cannot be empty".into()));
    }
    calendar::offset_from_minutes(utc_offset_minutes)?;

    let team_id = Uuid::new_v4();
    let team_str = encode_uuid(team_id);
    let owner_str = encode_uuid(owner);
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
          "INSERT INTO teams (team_id, name, utc_offset_minutes, state_revision, created_at)
           VALUES (?1, ?2, ?3, 0, ?4)",
          rusqlite::params![team_str, name, utc_offset_minutes, at_str],
        )?;
        tx.execute(
          "INSERT INTO team_members (team_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![team_str, owner_str, at_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::info!(team_id = %team_id, owner = %owner, "team created");
    Ok(team_id)
  }

  /// Add `user` to `team`. Joining twice is a no-op; a fresh join bumps the
  /// team revision outside any client precondition.
  pub async fn add_member(&self, team: TeamId, user: UserId) -> Result<bool> {
    let team_str = encode_uuid(team);
    let user_str = encode_uuid(user);
    let at_str = encode_dt(Utc::now());

    let joined = self
      .conn
      .call(move |conn| {
        let rows = conn.execute(
          "INSERT INTO team_members (team_id, user_id, joined_at) VALUES (?1, ?2, ?3)
           ON CONFLICT DO NOTHING",
          rusqlite::params![team_str, user_str, at_str],
        )?;
        Ok(rows == 1)
      })
      .await?;

    if joined {
      let user_hint = encode_uuid(user);
      self
        .bump_revision_best_effort(
          team,
          EntityKind::TeamMember,
          hints([("action", "join"), ("userId", user_hint.as_str())]),
        )
        .await?;
    }
    Ok(joined)
  }

  /// The team the user joined first.
  pub async fn primary_team(&self, user: UserId) -> Result<TeamId> {
    let user_str = encode_uuid(user);
    let team: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT team_id FROM team_members WHERE user_id = ?1
               ORDER BY joined_at, rowid LIMIT 1",
              rusqlite::params![user_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    decode_uuid(&team.ok_or(Error::NoTeam(user))?)
  }

  /// The team's local calendar date at `now`.
  pub async fn local_today(&self, team: TeamId, now: DateTime<Utc>) -> Result<NaiveDate> {
    Ok(calendar::local_date(now, self.team_offset(team).await?))
  }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

fn hash_token(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

impl SqliteStore {
  /// Issue a bearer token for `user`. Only its SHA-256 digest is persisted.
  pub async fn create_session(&self, user: UserId) -> Result<String> {
    let mut raw = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut raw);
    let token = hex::encode(raw);

    let hash = hash_token(&token);
    let user_str = encode_uuid(user);
    let at_str = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions (token_hash, user_id, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![hash, user_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(token)
  }

  pub async fn user_for_token(&self, token: &str) -> Result<UserId> {
    let hash = hash_token(token.trim());
    let user: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT user_id FROM sessions WHERE token_hash = ?1",
              rusqlite::params![hash],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    decode_uuid(&user.ok_or(Error::SessionNotFound)?)
  }
}

// ─── Team-scoped reads ───────────────────────────────────────────────────────

impl SqliteStore {
  pub async fn list_tasks(&self, team: TeamId) -> Result<Snapshot<Vec<Task>>> {
    self.read_team(team, |tx| tx.active_tasks()).await
  }

  pub async fn list_penalty_rules(&self, team: TeamId) -> Result<Snapshot<Vec<PenaltyRule>>> {
    self.read_team(team, |tx| tx.active_rules()).await
  }

  /// The home screen for `team` at `now`. Closes any stale windows first.
  pub async fn home(&self, team: TeamId, now: DateTime<Utc>) -> Result<Snapshot<HomeView>> {
    self.auto_close(team, now).await?;
    let today = self.local_today(team, now).await?;

    self
      .read_team(team, move |tx| {
        let month = calendar::month_start(today);
        let summary = tx.month_summary_row(month)?;
        let week_start = calendar::week_start(today);
        let week_end = calendar::week_end(week_start);

        let mut daily_tasks = Vec::new();
        let mut weekly_tasks = Vec::new();
        for task in tx.active_tasks()? {
          match task.kind {
            TaskKind::Daily => {
              let completed_today = tx.has_completion(task.task_id, today)?;
              daily_tasks.push(DailyTaskStatus { task, completed_today });
            }
            TaskKind::Weekly => {
              let week_completed_count = tx.count_completions(task.task_id, week_start, week_end)?;
              let required_per_week = task.required_per_week;
              weekly_tasks.push(WeeklyTaskStatus { task, week_completed_count, required_per_week });
            }
          }
        }

        Ok(HomeView {
          month: calendar::month_key(month),
          today,
          elapsed_days_in_week: today.weekday().number_from_monday(),
          monthly_penalty_total: summary.daily_penalty_total + summary.weekly_penalty_total,
          daily_tasks,
          weekly_tasks,
        })
      })
      .await
  }
}

// ─── Team-scoped writes ──────────────────────────────────────────────────────

impl SqliteStore {
  pub async fn create_task(
    &self,
    team: TeamId,
    if_match: Option<&str>,
    input: NewTask,
  ) -> Result<Committed<Task>> {
    self
      .run_with_revision_cas(
        team,
        if_match,
        EntityKind::Task,
        |task: &Task| task_hints("create", task.task_id),
        move |tx| tx.insert_task(Uuid::new_v4(), input).map(Mutation::Applied),
      )
      .await
  }

  pub async fn delete_task(
    &self,
    team: TeamId,
    if_match: Option<&str>,
    task_id: Uuid,
  ) -> Result<Committed<()>> {
    self
      .run_with_revision_cas(
        team,
        if_match,
        EntityKind::Task,
        move |_| task_hints("delete", task_id),
        move |tx| tx.soft_delete_task(task_id).map(Mutation::Applied),
      )
      .await
  }

  /// Flip the completion of `task_id` on `date`. The event's `action` hint
  /// reflects the state the transaction left behind.
  pub async fn toggle_completion(
    &self,
    team: TeamId,
    if_match: Option<&str>,
    user: UserId,
    task_id: Uuid,
    date: NaiveDate,
  ) -> Result<Committed<CompletionToggle>> {
    self
      .run_with_revision_cas(
        team,
        if_match,
        EntityKind::TaskCompletion,
        |toggle: &CompletionToggle| {
          let action = if toggle.completed { "complete" } else { "uncomplete" };
          task_hints(action, toggle.task_id)
        },
        move |tx| tx.toggle_completion(task_id, date, user).map(Mutation::Applied),
      )
      .await
  }

  pub async fn create_rule(
    &self,
    team: TeamId,
    if_match: Option<&str>,
    input: NewPenaltyRule,
  ) -> Result<Committed<PenaltyRule>> {
    self
      .run_with_revision_cas(
        team,
        if_match,
        EntityKind::PenaltyRule,
        |rule: &PenaltyRule| rule_hints("create", rule.rule_id),
        move |tx| tx.insert_rule(Uuid::new_v4(), input).map(Mutation::Applied),
      )
      .await
  }

  pub async fn patch_rule(
    &self,
    team: TeamId,
    if_match: Option<&str>,
    rule_id: Uuid,
    patch: PenaltyRulePatch,
  ) -> Result<Committed<PenaltyRule>> {
    self
      .run_with_revision_cas(
        team,
        if_match,
        EntityKind::PenaltyRule,
        |rule: &PenaltyRule| rule_hints("update", rule.rule_id),
        move |tx| tx.update_rule(rule_id, patch).map(Mutation::Applied),
      )
      .await
  }

  pub async fn delete_rule(
    &self,
    team: TeamId,
    if_match: Option<&str>,
    rule_id: Uuid,
  ) -> Result<Committed<()>> {
    self
      .run_with_revision_cas(
        team,
        if_match,
        EntityKind::PenaltyRule,
        move |_| rule_hints("delete", rule_id),
        move |tx| tx.soft_delete_rule(rule_id).map(Mutation::Applied),
      )
      .await
  }
}

fn task_hints(action: &str, task_id: Uuid) -> Hints {
  hints([("action", action), ("taskId", encode_uuid(task_id).as_str())])
}

fn rule_hints(action: &str, rule_id: Uuid) -> Hints {
  hints([("action", action), ("ruleId", encode_uuid(rule_id).as_str())])
}
