//! `GET /api/events`: per-team change stream over Server-Sent Events.
//!
//! The stream opens with a `connected` event carrying the current revision,
//! then relays one `team-state-changed` event per committed write and a
//! `heartbeat` whenever the team has been quiet for the configured interval.
//! Events are invalidation signals only; clients refetch on receipt.
//! Dropping the response stream drops the subscription, which deregisters it.

use std::{convert::Infallible, time::Duration};

use axum::{
  extract::State,
  response::sse::{Event, Sse},
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt as _, stream};
use kaji_core::{
  event::TeamEvent,
  hub::Subscription,
  team::{Revision, TeamId},
};
use serde::Serialize;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::{AppState, auth::Session, error::Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Connected {
  team_id:    TeamId,
  revision:   Revision,
  changed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct Heartbeat {
  at: DateTime<Utc>,
}

fn sse_event(name: &str, data: &impl Serialize) -> Event {
  match serde_json::to_string(data) {
    Ok(json) => Event::default().event(name).data(json),
    Err(e) => {
      tracing::warn!(error = %e, event = name, "failed to encode stream event");
      Event::default().comment("encoding error")
    }
  }
}

fn heartbeat_interval(period: Duration) -> Interval {
  let mut interval = tokio::time::interval_at(Instant::now() + period, period);
  interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
  interval
}

/// The relay half of the stream: events as they arrive, heartbeats in
/// between. Ends once the subscription is cancelled.
fn relay(
  subscription: Subscription,
  period: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
  stream::unfold(
    (subscription, heartbeat_interval(period)),
    |(mut subscription, mut heartbeat)| async move {
      let event = tokio::select! {
        received = subscription.recv() => {
          let received: TeamEvent = received?;
          heartbeat.reset();
          sse_event("team-state-changed", &received)
        }
        _ = heartbeat.tick() => sse_event("heartbeat", &Heartbeat { at: Utc::now() }),
      };
      Some((Ok(event), (subscription, heartbeat)))
    },
  )
}

pub async fn stream(
  State(state): State<AppState>,
  session: Session,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
  // Subscribe before reading the revision so no commit falls in between.
  let subscription = state.store.hub().subscribe(session.team);
  let etag = state.store.team_etag(session.team).await?;
  tracing::info!(
    team_id = %session.team,
    subscription = subscription.id,
    subscribers = state.store.hub().team_subscriber_count(session.team),
    "event stream opened"
  );

  let connected = sse_event(
    "connected",
    &Connected { team_id: session.team, revision: etag.revision, changed_at: Utc::now() },
  );
  let period = Duration::from_secs(state.config.heartbeat_secs.max(1));
  let events = stream::once(async move { Ok::<_, Infallible>(connected) }).chain(relay(subscription, period));
  Ok(Sse::new(events))
}
