//! Handlers for `/api/tasks` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/api/tasks` | Active tasks, oldest first |
//! | `POST`   | `/api/tasks` | Body: [`NewTask`]; returns 201 |
//! | `DELETE` | `/api/tasks/{id}` | Soft delete; returns 204 |
//! | `POST`   | `/api/tasks/{id}/completions/toggle` | Body: `{"date":"YYYY-MM-DD"}` |
//!
//! Every write requires `If-Match` and answers with the new `ETag`.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::NaiveDate;
use kaji_core::task::NewTask;
use serde::Deserialize;
use uuid::Uuid;

use super::tag_after_write;
use crate::{
  AppState,
  auth::Session,
  error::Result,
  etag::{IfMatch, etag_header},
};

/// `GET /api/tasks`
pub async fn list(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
  let snapshot = state.store.list_tasks(session.team).await?;
  Ok((etag_header(&snapshot.etag), Json(snapshot.value)))
}

/// `POST /api/tasks`
pub async fn create(
  State(state): State<AppState>,
  session: Session,
  if_match: IfMatch,
  Json(body): Json<NewTask>,
) -> Result<impl IntoResponse> {
  let committed = state.store.create_task(session.team, if_match.as_deref(), body).await?;
  let tag = tag_after_write(&state, session.team, committed.revision).await?;
  Ok((StatusCode::CREATED, etag_header(&tag), Json(committed.value)))
}

/// `DELETE /api/tasks/{id}`
pub async fn remove(
  State(state): State<AppState>,
  session: Session,
  if_match: IfMatch,
  Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
  let committed = state.store.delete_task(session.team, if_match.as_deref(), task_id).await?;
  let tag = tag_after_write(&state, session.team, committed.revision).await?;
  Ok((StatusCode::NO_CONTENT, etag_header(&tag)))
}

#[derive(Debug, Deserialize)]
pub struct ToggleBody {
  pub date: NaiveDate,
}

/// `POST /api/tasks/{id}/completions/toggle`
pub async fn toggle(
  State(state): State<AppState>,
  session: Session,
  if_match: IfMatch,
  Path(task_id): Path<Uuid>,
  Json(body): Json<ToggleBody>,
) -> Result<impl IntoResponse> {
  let committed = state
    .store
    .toggle_completion(session.team, if_match.as_deref(), session.user, task_id, body.date)
    .await?;
  let tag = tag_after_write(&state, session.team, committed.revision).await?;
  Ok((etag_header(&tag), Json(committed.value)))
}
