//! Team change notifications.
//!
//! A [`TeamEvent`] is constructed after a revision-bumping transaction commits
//! and is delivered best-effort to live subscribers. Events are never
//! persisted; clients that miss one resynchronise by refetching with the
//! current entity tag.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::team::{Revision, TeamId};

/// Which part of team state a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Task,
  TaskCompletion,
  PenaltyRule,
  TeamMember,
  TeamState,
  Closing,
}

impl EntityKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Task => "task",
      Self::TaskCompletion => "task_completion",
      Self::PenaltyRule => "penalty_rule",
      Self::TeamMember => "team_member",
      Self::TeamState => "team_state",
      Self::Closing => "closing",
    }
  }
}

/// Free-form key/value hints attached to an event (`taskId`, `action`, ...).
pub type Hints = BTreeMap<String, String>;

/// Build a [`Hints`] map from string pairs.
pub fn hints<const N: usize>(pairs: [(&str, &str); N]) -> Hints {
  pairs
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamEvent {
  pub team_id:    TeamId,
  pub entity:     EntityKind,
  pub revision:   Revision,
  pub changed_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub hints:      Hints,
}

impl TeamEvent {
  pub fn new(
    team_id: TeamId,
    entity: EntityKind,
    revision: Revision,
    hints: Hints,
  ) -> Self {
    Self { team_id, entity, revision, changed_at: Utc::now(), hints }
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  #[test]
  fn serialises_with_camel_case_keys_and_omits_empty_hints() {
    let event = TeamEvent::new(Uuid::nil(), EntityKind::TaskCompletion, Revision(3), Hints::new());
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["teamId"], Uuid::nil().to_string());
    assert_eq!(json["entity"], "task_completion");
    assert_eq!(json["revision"], 3);
    assert!(json.get("changedAt").is_some());
    assert!(json.get("hints").is_none());
  }

  #[test]
  fn hints_helper_collects_pairs() {
    let h = hints([("action", "create"), ("taskId", "abc")]);
    assert_eq!(h.get("action").map(String::as_str), Some("create"));
    assert_eq!(h.len(), 2);
  }
}
