//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use kaji_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("missing or unknown bearer token")]
  Unauthorized,
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error(transparent)]
  Core(#[from] kaji_core::Error),
  #[error(transparent)]
  Store(#[from] kaji_store_sqlite::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::Invalid => StatusCode::BAD_REQUEST,
    ErrorKind::PreconditionRequired => StatusCode::PRECONDITION_REQUIRED,
    ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
    ErrorKind::Conflict => StatusCode::CONFLICT,
    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    if let Error::Unauthorized = self {
      let body = json!({ "error": "unauthorized", "message": self.to_string() });
      let mut res = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
      res
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer realm=\"kaji\""));
      return res;
    }

    let (kind, current) = match &self {
      Error::Store(e) => (e.kind(), e.current_etag()),
      Error::Core(_) | Error::BadRequest(_) => (ErrorKind::Invalid, None),
      Error::Unauthorized => (ErrorKind::Internal, None),
    };

    // Internal details stay in the log.
    let message = if kind == ErrorKind::Internal {
      tracing::error!(error = %self, "request failed");
      "internal server error".to_string()
    } else {
      self.to_string()
    };

    let mut body = json!({ "error": kind.code(), "message": message });
    if let Some(tag) = current {
      body["currentEtag"] = json!(tag.to_string());
    }
    let mut res = (status_for(kind), Json(body)).into_response();
    if let Some(tag) = current
      && let Ok(value) = HeaderValue::from_str(&tag.to_string())
    {
      res.headers_mut().insert(header::ETAG, value);
    }
    res
  }
}
