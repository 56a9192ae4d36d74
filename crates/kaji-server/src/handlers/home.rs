//! Read models: the home screen and monthly summaries.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/home` | Closes stale windows first |
//! | `GET`  | `/api/summary` | `?month=YYYY-MM`, defaults to the team's current month |

use axum::{
  Json,
  extract::{Query, State},
  response::IntoResponse,
};
use chrono::Utc;
use kaji_core::calendar;
use serde::Deserialize;

use crate::{AppState, auth::Session, error::Result, etag::etag_header};

/// `GET /api/home`
pub async fn show(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
  let snapshot = state.store.home(session.team, Utc::now()).await?;
  Ok((etag_header(&snapshot.etag), Json(snapshot.value)))
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
  pub month: Option<String>,
}

/// `GET /api/summary[?month=YYYY-MM]`
pub async fn summary(
  State(state): State<AppState>,
  session: Session,
  Query(params): Query<SummaryParams>,
) -> Result<impl IntoResponse> {
  let month = match params.month.as_deref() {
    Some(key) => calendar::parse_month_key(key)?,
    None => calendar::month_start(state.store.local_today(session.team, Utc::now()).await?),
  };
  let snapshot = state.store.monthly_summary(session.team, month).await?;
  Ok((etag_header(&snapshot.etag), Json(snapshot.value)))
}
