//! Error types for `kaji-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("entity tag is empty")]
  EmptyEntityTag,

  #[error("invalid entity tag: {0:?}")]
  InvalidEntityTag(String),

  #[error("invalid month key: {0:?}")]
  InvalidMonth(String),

  #[error("invalid utc offset: {0} minutes")]
  InvalidOffset(i32),

  #[error("unknown task kind: {0:?}")]
  UnknownTaskKind(String),

  #[error("unknown close scope: {0:?}")]
  UnknownScope(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Transport-independent classification of failures.
///
/// Every crate-level error type maps onto one of these so the HTTP layer can
/// choose a status code without knowing the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Team, task, rule, user or session absent or deleted.
  NotFound,
  /// Malformed input.
  Invalid,
  /// A write arrived without an `If-Match` precondition.
  PreconditionRequired,
  /// Stale or malformed precondition, or a lost revision race.
  PreconditionFailed,
  /// The request conflicts with finalised state.
  Conflict,
  /// Store or transaction failure; safe to retry.
  Internal,
}

impl ErrorKind {
  /// Stable machine-readable code used in JSON error bodies.
  pub fn code(self) -> &'static str {
    match self {
      Self::NotFound => "not_found",
      Self::Invalid => "invalid_request",
      Self::PreconditionRequired => "precondition_required",
      Self::PreconditionFailed => "precondition_failed",
      Self::Conflict => "conflict",
      Self::Internal => "internal_error",
    }
  }
}
