//! Bearer-session extractor.
//!
//! Resolves `Authorization: Bearer <token>` to the calling user and the team
//! every request is scoped to.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use kaji_core::{
  ErrorKind,
  team::{TeamId, UserId},
};

use crate::{AppState, error::Error};

/// An authenticated caller and the team the request acts on.
#[derive(Debug, Clone, Copy)]
pub struct Session {
  pub user: UserId,
  pub team: TeamId,
}

/// The token of a well-formed `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let (scheme, token) = value.trim().split_once(' ')?;
  let token = token.trim();
  (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for Session {
  type Rejection = Error;

  async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
    let token = bearer_token(&parts.headers).ok_or(Error::Unauthorized)?;
    let user = match state.store.user_for_token(token).await {
      Ok(user) => user,
      Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::Unauthorized),
      Err(e) => return Err(e.into()),
    };
    let team = state.store.primary_team(user).await?;
    Ok(Session { user, team })
  }
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  fn headers(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
  }

  #[test]
  fn accepts_bearer_scheme_case_insensitively() {
    assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
    assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
  }

  #[test]
  fn rejects_other_schemes_and_empty_tokens() {
    assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
    assert_eq!(bearer_token(&headers("Bearer ")), None);
    assert_eq!(bearer_token(&HeaderMap::new()), None);
  }
}
