//! Handlers for `/api/penalty-rules` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/api/penalty-rules` | Active rules, ascending threshold |
//! | `POST`   | `/api/penalty-rules` | Body: `{"name","threshold"}`; returns 201 |
//! | `PATCH`  | `/api/penalty-rules/{id}` | Body: any of `name`, `threshold` |
//! | `DELETE` | `/api/penalty-rules/{id}` | Soft delete; returns 204 |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use kaji_core::task::{NewPenaltyRule, PenaltyRulePatch};
use uuid::Uuid;

use super::tag_after_write;
use crate::{
  AppState,
  auth::Session,
  error::Result,
  etag::{IfMatch, etag_header},
};

/// `GET /api/penalty-rules`
pub async fn list(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
  let snapshot = state.store.list_penalty_rules(session.team).await?;
  Ok((etag_header(&snapshot.etag), Json(snapshot.value)))
}

/// `POST /api/penalty-rules`
pub async fn create(
  State(state): State<AppState>,
  session: Session,
  if_match: IfMatch,
  Json(body): Json<NewPenaltyRule>,
) -> Result<impl IntoResponse> {
  let committed = state.store.create_rule(session.team, if_match.as_deref(), body).await?;
  let tag = tag_after_write(&state, session.team, committed.revision).await?;
  Ok((StatusCode::CREATED, etag_header(&tag), Json(committed.value)))
}

/// `PATCH /api/penalty-rules/{id}`
pub async fn update(
  State(state): State<AppState>,
  session: Session,
  if_match: IfMatch,
  Path(rule_id): Path<Uuid>,
  Json(body): Json<PenaltyRulePatch>,
) -> Result<impl IntoResponse> {
  let committed =
    state.store.patch_rule(session.team, if_match.as_deref(), rule_id, body).await?;
  let tag = tag_after_write(&state, session.team, committed.revision).await?;
  Ok((etag_header(&tag), Json(committed.value)))
}

/// `DELETE /api/penalty-rules/{id}`
pub async fn remove(
  State(state): State<AppState>,
  session: Session,
  if_match: IfMatch,
  Path(rule_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
  let committed = state.store.delete_rule(session.team, if_match.as_deref(), rule_id).await?;
  let tag = tag_after_write(&state, session.team, committed.revision).await?;
  Ok((StatusCode::NO_CONTENT, etag_header(&tag)))
}
