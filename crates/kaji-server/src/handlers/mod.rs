//! Route handlers, one module per resource.

pub mod close;
pub mod events;
pub mod home;
pub mod rules;
pub mod tasks;

use kaji_core::team::{EntityTag, Revision, TeamId};

use crate::{AppState, error::Result};

/// Tag to hand back after a write: the committed revision, or the current
/// one when the write turned out to be a no-op.
pub(crate) async fn tag_after_write(
  state: &AppState,
  team: TeamId,
  revision: Option<Revision>,
) -> Result<EntityTag> {
  match revision {
    Some(revision) => Ok(EntityTag::new(team, revision)),
    None => Ok(state.store.team_etag(team).await?),
  }
}
