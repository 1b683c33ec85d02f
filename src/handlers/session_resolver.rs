//! Session resolution from the request.
//!
//! A token is read from the `sessionId` query parameter first, then from the
//! `sessionId` cookie. Empty values count as absent.

use axum::{
    extract::{FromRequestParts, Query},
    http::{HeaderMap, HeaderValue, header, request::Parts},
};
use serde::Deserialize;
use std::convert::Infallible;

use crate::services::session_service::SessionStore;

pub const SESSION_COOKIE: &str = "sessionId";

#[derive(Debug, Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Whatever token the client presented, if any.
#[derive(Debug, Clone)]
pub struct PresentedSession(pub Option<String>);

impl PresentedSession {
    /// Use the presented token or issue a new one.
    pub fn resolve(self) -> ResolvedSession {
        let (token, issued) = SessionStore::resolve_token(self.0.as_deref());
        ResolvedSession { token, issued }
    }
}

impl<S> FromRequestParts<S> for PresentedSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_query = Query::<SessionQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.session_id);
        let token = non_empty(from_query)
            .or_else(|| non_empty(cookie_value(&parts.headers, SESSION_COOKIE)));
        Ok(PresentedSession(token))
    }
}

/// A token ready for use, and whether it was issued for this request.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub token: String,
    pub issued: bool,
}

impl ResolvedSession {
    /// `Set-Cookie` value pinning the browser to this session.
    pub fn cookie_header(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE, self.token
        ))
        .ok()
    }

    /// Attach the cookie only when the token is new.
    pub fn apply_cookie(&self, headers: &mut HeaderMap) {
        if !self.issued {
            return;
        }
        if let Some(value) = self.cookie_header() {
            headers.insert(header::SET_COOKIE, value);
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Find `name` among the request's `Cookie` headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
}
