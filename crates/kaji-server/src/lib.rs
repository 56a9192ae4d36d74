//! HTTP surface for Kaji.
//!
//! Exposes an axum [`Router`] over a [`SqliteStore`]: JSON read and write
//! endpoints guarded by `If-Match`, administrative close triggers, and the
//! per-team change stream.

pub mod auth;
pub mod error;
pub mod etag;
pub mod handlers;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, patch, post},
};
use kaji_store_sqlite::SqliteStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use handlers::{close, events, home, rules, tasks};

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_heartbeat_secs() -> u64 { 25 }

/// Runtime server configuration, deserialised from `config.toml` and
/// `KAJI_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:           String,
  #[serde(default = "default_port")]
  pub port:           u16,
  pub store_path:     PathBuf,
  /// Quiet period after which the change stream emits a heartbeat.
  #[serde(default = "default_heartbeat_secs")]
  pub heartbeat_secs: u64,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState {
  pub store:  Arc<SqliteStore>,
  pub config: Arc<ServerConfig>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API [`Router`].
pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/api/home",                          get(home::show))
    .route("/api/summary",                       get(home::summary))
    .route("/api/tasks",                         get(tasks::list).post(tasks::create))
    .route("/api/tasks/{id}",                    axum::routing::delete(tasks::remove))
    .route("/api/tasks/{id}/completions/toggle", post(tasks::toggle))
    .route("/api/penalty-rules",                 get(rules::list).post(rules::create))
    .route("/api/penalty-rules/{id}",            patch(rules::update).delete(rules::remove))
    .route("/api/admin/close/{scope}",           post(close::close))
    .route("/api/events",                        get(events::stream))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
  };
  use chrono::{Duration, Utc};
  use kaji_core::{
    event::{EntityKind, Hints},
    task::{NewTask, TaskKind},
    team::{EntityTag, Revision, TeamId},
  };
  use kaji_store_sqlite::{Guard, Mutation};
  use serde_json::{Value, json};
  use uuid::Uuid;
  use tower::ServiceExt as _;

  struct Fixture {
    state: AppState,
    team:  TeamId,
    token: String,
  }

  async fn fixture() -> Fixture {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let user = store.create_user("owner@example.com").await.unwrap();
    let team = store.create_team("home", user, 0).await.unwrap();
    let token = store.create_session(user).await.unwrap();

    let state = AppState {
      store:  Arc::new(store),
      config: Arc::new(ServerConfig {
        host:           default_host(),
        port:           default_port(),
        store_path:     PathBuf::from(":memory:"),
        heartbeat_secs: default_heartbeat_secs(),
      }),
    };
    Fixture { state, team, token }
  }

  impl Fixture {
    async fn send(
      &self,
      method: &str,
      uri: &str,
      if_match: Option<&str>,
      body: Option<Value>,
    ) -> Response {
      let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", self.token));
      if let Some(tag) = if_match {
        builder = builder.header(header::IF_MATCH, tag);
      }
      let body = match body {
        Some(json) => {
          builder = builder.header(header::CONTENT_TYPE, "application/json");
          Body::from(json.to_string())
        }
        None => Body::empty(),
      };
      router(self.state.clone()).oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    fn tag(&self, revision: i64) -> String {
      EntityTag::new(self.team, Revision(revision)).to_string()
    }
  }

  fn etag_of(resp: &Response) -> String {
    resp.headers().get(header::ETAG).unwrap().to_str().unwrap().to_string()
  }

  async fn json_of(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn new_task() -> Value {
    json!({ "title": "dishes", "kind": "daily", "penaltyPoints": 3 })
  }

  // ── Auth ────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn missing_token_is_unauthorized() {
    let f = fixture().await;
    let req = Request::builder().uri("/api/tasks").body(Body::empty()).unwrap();
    let resp = router(f.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  #[tokio::test]
  async fn unknown_token_is_unauthorized() {
    let f = fixture().await;
    let req = Request::builder()
      .uri("/api/home")
      .header(header::AUTHORIZATION, "Bearer nope")
      .body(Body::empty())
      .unwrap();
    let resp = router(f.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  // ── Reads ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn reads_carry_etag() {
    let f = fixture().await;
    let resp = f.send("GET", "/api/tasks", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(etag_of(&resp), f.tag(0));
    assert_eq!(json_of(resp).await, json!([]));
  }

  #[tokio::test]
  async fn home_without_tasks_has_nothing_to_close() {
    let f = fixture().await;
    let resp = f.send("GET", "/api/home", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(etag_of(&resp), f.tag(0));
    assert_eq!(json_of(resp).await["monthlyPenaltyTotal"], 0);
  }

  #[tokio::test]
  async fn home_runs_auto_close_before_tagging() {
    let f = fixture().await;
    let input = NewTask {
      title:             "dishes".into(),
      kind:              TaskKind::Daily,
      penalty_points:    3,
      required_per_week: None,
    };
    f.state
      .store
      .run_mutation(
        f.team,
        Guard::Internal,
        EntityKind::Task,
        Utc::now() - Duration::days(3),
        |_| Hints::new(),
        move |tx| tx.insert_task(Uuid::new_v4(), input).map(Mutation::Applied),
      )
      .await
      .unwrap();

    // Three unclosed days lie behind the task, so the tag has moved.
    let resp = f.send("GET", "/api/home", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let first = etag_of(&resp);
    assert_ne!(first, f.tag(1));

    let again = f.send("GET", "/api/home", None, None).await;
    assert_eq!(etag_of(&again), first);
  }

  #[tokio::test]
  async fn summary_rejects_malformed_month() {
    let f = fixture().await;
    let resp = f.send("GET", "/api/summary?month=2026-13", None, None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(resp).await["error"], "invalid_request");

    let resp = f.send("GET", "/api/summary?month=2026-10", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_of(resp).await["month"], "2026-10");
  }

  // ── Writes ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn write_without_if_match_is_428() {
    let f = fixture().await;
    let resp = f.send("POST", "/api/tasks", None, Some(new_task())).await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(json_of(resp).await["error"], "precondition_required");
  }

  #[tokio::test]
  async fn write_with_current_tag_returns_new_tag() {
    let f = fixture().await;
    let resp = f.send("POST", "/api/tasks", Some(&f.tag(0)), Some(new_task())).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(etag_of(&resp), f.tag(1));
    let task = json_of(resp).await;
    assert_eq!(task["title"], "dishes");
    assert_eq!(task["requiredPerWeek"], 1);
  }

  #[tokio::test]
  async fn stale_tag_is_412_with_current_tag() {
    let f = fixture().await;
    f.send("POST", "/api/tasks", Some(&f.tag(0)), Some(new_task())).await;

    let resp = f.send("POST", "/api/tasks", Some(&f.tag(0)), Some(new_task())).await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(etag_of(&resp), f.tag(1));
    let body = json_of(resp).await;
    assert_eq!(body["error"], "precondition_failed");
    assert_eq!(body["currentEtag"], f.tag(1));
  }

  #[tokio::test]
  async fn malformed_tag_is_412_without_current_tag() {
    let f = fixture().await;
    let resp = f.send("POST", "/api/tasks", Some("\"nonsense\""), Some(new_task())).await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    assert!(!resp.headers().contains_key(header::ETAG));
    assert!(json_of(resp).await.get("currentEtag").is_none());
  }

  #[tokio::test]
  async fn toggle_then_delete_task() {
    let f = fixture().await;
    let resp = f.send("POST", "/api/tasks", Some(&f.tag(0)), Some(new_task())).await;
    let id = json_of(resp).await["taskId"].as_str().unwrap().to_string();

    let uri = format!("/api/tasks/{id}/completions/toggle");
    let resp = f.send("POST", &uri, Some(&f.tag(1)), Some(json!({ "date": "2026-10-20" }))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_of(resp).await["completed"], true);

    let resp = f.send("DELETE", &format!("/api/tasks/{id}"), Some(&f.tag(2)), None).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(etag_of(&resp), f.tag(3));

    let resp = f.send("DELETE", &format!("/api/tasks/{id}"), Some(&f.tag(3)), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn penalty_rule_lifecycle() {
    let f = fixture().await;
    let body = json!({ "name": "coffee", "threshold": 5 });
    let resp = f.send("POST", "/api/penalty-rules", Some(&f.tag(0)), Some(body)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let id = json_of(resp).await["ruleId"].as_str().unwrap().to_string();

    let uri = format!("/api/penalty-rules/{id}");
    let resp = f.send("PATCH", &uri, Some(&f.tag(1)), Some(json!({ "threshold": 8 }))).await;
    assert_eq!(json_of(resp).await["threshold"], 8);

    let resp = f.send("PATCH", &uri, Some(&f.tag(2)), Some(json!({ "threshold": -1 }))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = f.send("DELETE", &uri, Some(&f.tag(2)), None).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = f.send("GET", "/api/penalty-rules", None, None).await;
    assert_eq!(json_of(resp).await, json!([]));
  }

  // ── Admin close ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn admin_close_is_idempotent() {
    let f = fixture().await;
    let resp = f.send("POST", "/api/admin/close/day", Some(&f.tag(0)), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_of(resp).await;
    assert_eq!(body["applied"], true);
    assert_eq!(body["revision"], 1);

    let resp = f.send("POST", "/api/admin/close/day", Some(&f.tag(1)), None).await;
    assert_eq!(etag_of(&resp), f.tag(1));
    let body = json_of(resp).await;
    assert_eq!(body["applied"], false);
    assert!(body.get("revision").is_none());
  }

  #[tokio::test]
  async fn admin_close_requires_if_match_and_known_scope() {
    let f = fixture().await;
    let resp = f.send("POST", "/api/admin/close/week", None, None).await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_REQUIRED);

    let resp = f.send("POST", "/api/admin/close/year", Some(&f.tag(0)), None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  // ── Events ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn event_stream_is_sse() {
    let f = fixture().await;
    let resp = f.send("GET", "/api/events", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
    assert_eq!(f.state.store.hub().team_subscriber_count(f.team), 1);

    drop(resp);
    assert_eq!(f.state.store.hub().team_subscriber_count(f.team), 0);
  }
}
