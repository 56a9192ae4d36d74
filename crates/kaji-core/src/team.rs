//! Team identity, state revisions and entity tags.
//!
//! Every team carries a single integer revision. Any successful mutation of
//! team-scoped state bumps it by exactly one, and the pair (team, revision) is
//! exposed to clients as a weak entity tag for `If-Match` / `ETag` exchange.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

pub type TeamId = Uuid;
pub type UserId = Uuid;

// ─── Revision ────────────────────────────────────────────────────────────────

/// Monotonic per-team state counter. Never decreases.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct Revision(pub i64);

impl Revision {
  pub const INITIAL: Revision = Revision(0);

  /// The revision a successful compare-and-swap from `self` produces.
  pub fn next(self) -> Revision { Revision(self.0 + 1) }
}

impl fmt::Display for Revision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── Entity tag ──────────────────────────────────────────────────────────────

/// Opaque validator derived from (team, revision).
///
/// Rendered as `W/"team:<uuid>:rev:<n>"`. Parsing accepts the weak prefix and
/// surrounding quotes as optional so bare tags from sloppy clients still match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityTag {
  pub team:     TeamId,
  pub revision: Revision,
}

impl EntityTag {
  pub fn new(team: TeamId, revision: Revision) -> Self { Self { team, revision } }
}

impl fmt::Display for EntityTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "W/\"team:{}:rev:{}\"", self.team.hyphenated(), self.revision)
  }
}

impl FromStr for EntityTag {
  type Err = Error;

  fn from_str(raw: &str) -> Result<Self> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Err(Error::EmptyEntityTag);
    }
    let bare = trimmed.strip_prefix("W/").unwrap_or(trimmed).trim_matches('"');
    let invalid = || Error::InvalidEntityTag(raw.to_string());

    let mut parts = bare.split(':');
    let (Some("team"), Some(team), Some("rev"), Some(rev), None) = (
      parts.next(),
      parts.next(),
      parts.next(),
      parts.next(),
      parts.next(),
    ) else {
      return Err(invalid());
    };

    let team = Uuid::parse_str(team).map_err(|_| invalid())?;
    let revision: i64 = rev.parse().map_err(|_| invalid())?;
    if revision < 0 {
      return Err(invalid());
    }
    Ok(Self { team, revision: Revision(revision) })
  }
}
