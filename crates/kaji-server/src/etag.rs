//! `If-Match` extraction and `ETag` response headers.
//!
//! Tags are opaque to clients. They are echoed back verbatim in `If-Match`
//! and only ever interpreted by the store.

use std::convert::Infallible;

use axum::{
  extract::FromRequestParts,
  http::{HeaderName, header, request::Parts},
};
use kaji_core::team::EntityTag;

/// The raw `If-Match` header, if present and valid UTF-8.
#[derive(Debug, Clone, Default)]
pub struct IfMatch(pub Option<String>);

impl IfMatch {
  pub fn as_deref(&self) -> Option<&str> { self.0.as_deref() }
}

impl<S: Send + Sync> FromRequestParts<S> for IfMatch {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
    let value = parts
      .headers
      .get(header::IF_MATCH)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned);
    Ok(IfMatch(value))
  }
}

/// A response header pair carrying `tag`.
pub fn etag_header(tag: &EntityTag) -> [(HeaderName, String); 1] {
  [(header::ETAG, tag.to_string())]
}
