//! MutationCoordinator: every team-state write runs here.
//!
//! A write executes its mutate function and the revision compare-and-swap in
//! one transaction. Only after commit is a [`TeamEvent`] published, and
//! publication can never undo or fail the committed write.

use chrono::{DateTime, Utc};
use kaji_core::{
  event::{EntityKind, Hints, TeamEvent},
  team::{EntityTag, Revision, TeamId},
};
use rusqlite::{Connection, TransactionBehavior};

use crate::{Error, Result, SqliteStore, revision, tx::TeamTx};

/// Attempts made by [`SqliteStore::bump_revision_best_effort`].
pub const BEST_EFFORT_ATTEMPTS: u32 = 3;

/// What a mutate function reports back to the coordinator.
#[derive(Debug)]
pub enum Mutation<T> {
  /// State changed; bump the revision and notify subscribers.
  Applied(T),
  /// Nothing effectively changed (e.g. a duplicate close run).
  Unchanged(T),
}

/// Result of a coordinated write. `revision` is `None` for no-ops.
#[derive(Debug)]
pub struct Committed<T> {
  pub revision: Option<Revision>,
  pub value:    T,
}

/// Which revision a write must start from.
#[derive(Debug, Clone)]
pub enum Guard {
  /// Client-asserted `If-Match` header value, possibly absent.
  IfMatch(Option<String>),
  /// Internal or background caller: whatever is current inside the
  /// transaction.
  Internal,
}

#[derive(Debug, Clone, Copy)]
enum Expected {
  Asserted(Revision),
  Current,
}

impl SqliteStore {
  /// Run `mutate` under a client-asserted `If-Match` precondition.
  ///
  /// Fails with `PreconditionRequired` when no tag was supplied and with
  /// `PreconditionFailed` when the tag is malformed, names another team, or
  /// loses the compare-and-swap.
  pub async fn run_with_revision_cas<T, H, F>(
    &self,
    team: TeamId,
    if_match: Option<&str>,
    entity: EntityKind,
    describe: H,
    mutate: F,
  ) -> Result<Committed<T>>
  where
    F: FnOnce(&TeamTx<'_>) -> Result<Mutation<T>> + Send + 'static,
    H: FnOnce(&T) -> Hints + Send,
    T: Send + 'static,
  {
    let guard = Guard::IfMatch(if_match.map(str::to_owned));
    self.run_mutation(team, guard, entity, Utc::now(), describe, mutate).await
  }

  /// Run `mutate` in a revision-bumping transaction under `guard`.
  ///
  /// `now` is the time the transaction records for rows it writes.
  /// `describe` builds the event hints from the committed value, so they
  /// always reflect what the transaction actually did.
  pub async fn run_mutation<T, H, F>(
    &self,
    team: TeamId,
    guard: Guard,
    entity: EntityKind,
    now: DateTime<Utc>,
    describe: H,
    mutate: F,
  ) -> Result<Committed<T>>
  where
    F: FnOnce(&TeamTx<'_>) -> Result<Mutation<T>> + Send + 'static,
    H: FnOnce(&T) -> Hints + Send,
    T: Send + 'static,
  {
    let expected = match guard {
      Guard::IfMatch(raw) => Expected::Asserted(self.check_precondition(team, raw.as_deref()).await?),
      Guard::Internal => Expected::Current,
    };

    let (revision, value) = self
      .conn
      .call(move |conn| Ok(apply_in_transaction(conn, team, now, expected, mutate)))
      .await??;

    match revision {
      Some(revision) => {
        tracing::debug!(team_id = %team, entity = entity.as_str(), %revision, "team state committed");
        self.publish(TeamEvent::new(team, entity, revision, describe(&value)));
      }
      None => {
        tracing::debug!(team_id = %team, entity = entity.as_str(), "mutation was a no-op");
      }
    }
    Ok(Committed { revision, value })
  }

  /// Bump a team's revision outside any client precondition.
  ///
  /// Used after internal writes (membership changes, seeding). Retries the
  /// read-then-swap loop up to [`BEST_EFFORT_ATTEMPTS`] times. A missing team
  /// means there is nothing to update and yields `Ok(None)`.
  pub async fn bump_revision_best_effort(
    &self,
    team: TeamId,
    entity: EntityKind,
    hints: Hints,
  ) -> Result<Option<Revision>> {
    for attempt in 1..=BEST_EFFORT_ATTEMPTS {
      let current = match self.current_revision(team).await {
        Ok(current) => current,
        Err(Error::TeamNotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
      };
      match self.compare_and_swap(team, current).await {
        Ok(revision) => {
          self.publish(TeamEvent::new(team, entity, revision, hints));
          return Ok(Some(revision));
        }
        Err(Error::RevisionConflict { .. }) => {
          tracing::debug!(team_id = %team, attempt, "best-effort revision bump lost a race");
        }
        Err(e) => return Err(e),
      }
    }
    tracing::warn!(team_id = %team, attempts = BEST_EFFORT_ATTEMPTS, "giving up on revision bump");
    Err(Error::RevisionContention { team, attempts: BEST_EFFORT_ATTEMPTS })
  }

  async fn check_precondition(&self, team: TeamId, raw: Option<&str>) -> Result<Revision> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
      return Err(Error::PreconditionRequired);
    };
    let tag: EntityTag = raw.parse().map_err(|_| Error::PreconditionFailed {
      reason:  "If-Match header is invalid".into(),
      current: None,
    })?;
    if tag.team != team {
      return Err(Error::PreconditionFailed {
        reason:  "entity tag belongs to another team; refresh and retry".into(),
        current: Some(self.team_etag(team).await?),
      });
    }
    Ok(tag.revision)
  }

  /// Best-effort notification; never affects the committed write.
  fn publish(&self, event: TeamEvent) {
    let delivered = self.hub.publish(&event);
    tracing::debug!(
      team_id = %event.team_id,
      revision = %event.revision,
      delivered,
      "team event published"
    );
  }
}

fn apply_in_transaction<T, F>(
  conn: &mut Connection,
  team: TeamId,
  now: DateTime<Utc>,
  expected: Expected,
  mutate: F,
) -> Result<(Option<Revision>, T)>
where
  F: FnOnce(&TeamTx<'_>) -> Result<Mutation<T>>,
{
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  // Dropping `tx` on any early return rolls everything back.
  let outcome = mutate(&TeamTx::new(&tx, team, now))?;
  let value = match outcome {
    Mutation::Applied(value) => value,
    Mutation::Unchanged(value) => {
      tx.commit()?;
      return Ok((None, value));
    }
  };

  let expected = match expected {
    Expected::Asserted(revision) => revision,
    Expected::Current => revision::current_revision(&tx, team)?,
  };

  match revision::compare_and_swap(&tx, team, expected) {
    Ok(revision) => {
      tx.commit()?;
      Ok((Some(revision), value))
    }
    Err(Error::RevisionConflict { .. }) => {
      let current = revision::current_revision(&tx, team)?;
      Err(Error::PreconditionFailed {
        reason:  "team state changed; refresh and retry".into(),
        current: Some(EntityTag::new(team, current)),
      })
    }
    Err(e) => Err(e),
  }
}
