//! Error type for `kaji-store-sqlite`.

use kaji_core::{
  ErrorKind,
  team::{EntityTag, Revision, TeamId},
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] kaji_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("team not found: {0}")]
  TeamNotFound(TeamId),

  #[error("user {0} does not belong to a team")]
  NoTeam(Uuid),

  #[error("task not found: {0}")]
  TaskNotFound(Uuid),

  #[error("penalty rule not found: {0}")]
  RuleNotFound(Uuid),

  #[error("session not found")]
  SessionNotFound,

  #[error("invalid input: {0}")]
  Invalid(String),

  #[error("If-Match header is required")]
  PreconditionRequired,

  /// The asserted precondition no longer holds. `current` is the tag the
  /// client should refetch with, when known.
  #[error("{reason}")]
  PreconditionFailed {
    reason:  String,
    current: Option<EntityTag>,
  },

  /// A compare-and-swap found a revision other than `expected`.
  #[error("revision conflict on team {team}: expected {expected}")]
  RevisionConflict { team: TeamId, expected: Revision },

  #[error("gave up bumping revision of team {team} after {attempts} attempts")]
  RevisionContention { team: TeamId, attempts: u32 },

  #[error("month {month} is already closed")]
  MonthClosed { month: String },
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::TeamNotFound(_)
      | Self::NoTeam(_)
      | Self::TaskNotFound(_)
      | Self::RuleNotFound(_)
      | Self::SessionNotFound => ErrorKind::NotFound,
      Self::Invalid(_) => ErrorKind::Invalid,
      Self::Core(e) => match e {
        kaji_core::Error::InvalidMonth(_)
        | kaji_core::Error::InvalidOffset(_)
        | kaji_core::Error::UnknownTaskKind(_)
        | kaji_core::Error::UnknownScope(_) => ErrorKind::Invalid,
        kaji_core::Error::EmptyEntityTag | kaji_core::Error::InvalidEntityTag(_) => {
          ErrorKind::PreconditionFailed
        }
      },
      Self::PreconditionRequired => ErrorKind::PreconditionRequired,
      Self::PreconditionFailed { .. } | Self::RevisionConflict { .. } => {
        ErrorKind::PreconditionFailed
      }
      Self::MonthClosed { .. } => ErrorKind::Conflict,
      Self::Database(_)
      | Self::Sqlite(_)
      | Self::Uuid(_)
      | Self::DateParse(_)
      | Self::RevisionContention { .. } => ErrorKind::Internal,
    }
  }

  /// The tag a client should retry with, for precondition failures.
  pub fn current_etag(&self) -> Option<EntityTag> {
    match self {
      Self::PreconditionFailed { current, .. } => *current,
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
