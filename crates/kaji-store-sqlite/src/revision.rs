//! RevisionStore: read and compare-and-swap of a team's state revision.
//!
//! The conditional `UPDATE` below is the only place a revision ever changes.
//! Under concurrent callers presenting the same `expected` value at most one
//! matches the `WHERE` clause; every other caller sees zero affected rows.

use kaji_core::team::{EntityTag, Revision, TeamId};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{Error, Result, SqliteStore, encode::encode_uuid};

pub(crate) fn current_revision(conn: &Connection, team: TeamId) -> Result<Revision> {
  conn
    .query_row(
      "SELECT state_revision FROM teams WHERE team_id = ?1",
      rusqlite::params![encode_uuid(team)],
      |row| row.get::<_, i64>(0),
    )
    .optional()?
    .map(Revision)
    .ok_or(Error::TeamNotFound(team))
}

pub(crate) fn compare_and_swap(
  conn: &Connection,
  team: TeamId,
  expected: Revision,
) -> Result<Revision> {
  conn
    .query_row(
      "UPDATE teams SET state_revision = state_revision + 1
       WHERE team_id = ?1 AND state_revision = ?2
       RETURNING state_revision",
      rusqlite::params![encode_uuid(team), expected.0],
      |row| row.get::<_, i64>(0),
    )
    .optional()?
    .map(Revision)
    .ok_or(Error::RevisionConflict { team, expected })
}

impl SqliteStore {
  /// Read the team's current revision. Fails with `TeamNotFound`.
  pub async fn current_revision(&self, team: TeamId) -> Result<Revision> {
    self
      .conn
      .call(move |conn| Ok(current_revision(conn, team)))
      .await?
  }

  /// Atomically bump the revision iff it still equals `expected`.
  ///
  /// Fails with `RevisionConflict` otherwise; callers re-read
  /// [`current_revision`](Self::current_revision) to report the real value.
  pub async fn compare_and_swap(&self, team: TeamId, expected: Revision) -> Result<Revision> {
    self
      .conn
      .call(move |conn| Ok(compare_and_swap(conn, team, expected)))
      .await?
  }

  /// Entity tag for the team's current state.
  pub async fn team_etag(&self, team: TeamId) -> Result<EntityTag> {
    Ok(EntityTag::new(team, self.current_revision(team).await?))
  }
}
