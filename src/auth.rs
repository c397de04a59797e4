//! Static API token authentication
//!
//! Tokens may arrive in the `token` query parameter, the `X-API-Token` header
//! or a `token` cookie. Carriers are checked in that order and the first one
//! holding a configured token wins.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use std::borrow::Cow;
use std::collections::HashSet;

pub const TOKEN_HEADER: &str = "x-api-token";
pub const TOKEN_QUERY_PARAM: &str = "token";
pub const TOKEN_COOKIE: &str = "token";

/// Place a caller may put its token in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Query,
    Header,
    Cookie,
}

/// Carriers in priority order.
pub const TOKEN_SOURCES: [TokenSource; 3] = [TokenSource::Query, TokenSource::Header, TokenSource::Cookie];

impl TokenSource {
    pub fn extract<'a>(&self, query_token: Option<&'a str>, headers: &'a HeaderMap) -> Option<Cow<'a, str>> {
        let candidate = match self {
            TokenSource::Query => query_token.map(|t| Cow::Borrowed(t.trim())),
            TokenSource::Header => headers
                .get(TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|t| Cow::Borrowed(t.trim())),
            TokenSource::Cookie => CookieJar::from_headers(headers)
                .get(TOKEN_COOKIE)
                .map(|c| Cow::Owned(c.value_trimmed().trim().to_string())),
        };
        candidate.filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Carries the accepted token, or `None` when authentication is disabled.
    Authorized(Option<String>),
    Unauthorized,
}

impl AuthOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthOutcome::Authorized(_))
    }
}

pub struct Authenticator {
    tokens: HashSet<String>,
}

impl Authenticator {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = tokens
            .into_iter()
            .map(Into::<String>::into)
            .filter(|t| !t.is_empty())
            .collect();
        Self { tokens }
    }

    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Accepts the first present candidate that is a configured token.
    ///
    /// Candidates are consumed lazily, so later carriers are not inspected once
    /// one matches.
    pub fn authenticate<I, S>(&self, candidates: I) -> AuthOutcome
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        if !self.is_enabled() {
            return AuthOutcome::Authorized(None);
        }

        candidates
            .into_iter()
            .flatten()
            .find(|candidate| self.tokens.contains(candidate.as_ref()))
            .map(|token| AuthOutcome::Authorized(Some(token.as_ref().to_string())))
            .unwrap_or(AuthOutcome::Unauthorized)
    }

    pub fn authenticate_request(&self, query_token: Option<&str>, headers: &HeaderMap) -> AuthOutcome {
        self.authenticate(
            TOKEN_SOURCES
                .iter()
                .map(|source| source.extract(query_token, headers)),
        )
    }
}
