//! `POST /api/admin/close/{scope}`: operator-triggered closing of the most
//! recent finished day, week or month. Requires `If-Match`.

use axum::{
  Json,
  extract::{Path, State},
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use kaji_core::{closing::CloseScope, team::Revision};
use kaji_store_sqlite::Guard;
use serde::Serialize;

use super::tag_after_write;
use crate::{
  AppState,
  auth::Session,
  error::Result,
  etag::{IfMatch, etag_header},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseResponse {
  pub closed_at: DateTime<Utc>,
  pub month:     String,
  pub applied:   bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub revision:  Option<Revision>,
}

pub async fn close(
  State(state): State<AppState>,
  session: Session,
  if_match: IfMatch,
  Path(scope): Path<String>,
) -> Result<impl IntoResponse> {
  let scope: CloseScope = scope.parse()?;
  let guard = Guard::IfMatch(if_match.0);
  let report = state.store.close(session.team, scope, Utc::now(), guard).await?;
  tracing::info!(
    team_id = %session.team,
    user_id = %session.user,
    %scope,
    applied = report.applied,
    "admin close"
  );

  let tag = tag_after_write(&state, session.team, report.revision).await?;
  let body = CloseResponse {
    closed_at: report.closed_at,
    month:     report.month,
    applied:   report.applied,
    revision:  report.revision,
  };
  Ok((etag_header(&tag), Json(body)))
}
