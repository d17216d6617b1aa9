// ============================
// crates/backend-lib/src/middleware/authenticate.rs
// ============================
//! Request extractors: the authenticated account and the client origin.
//!
//! Credentials are read from `Authorization: Bearer <token>` (the `Token`
//! keyword is accepted too) or, failing that, the `sessionid` cookie.
//!
//! The client address is the TCP peer. Forwarding headers only count when
//! the peer is listed in `server.trusted_proxies`.
use crate::auth::SESSION_COOKIE;
use crate::error::{AppError, CredentialError};
use crate::models::{Account, ClientMeta};
use crate::storage::Storage;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

const AUTH_KEYWORDS: [&str; 2] = ["bearer", "token"];

/// How the current request authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Access credential from the `Authorization` header
    Bearer(String),
    /// Cookie session id
    Session(String),
}

/// The account behind the request
#[derive(Debug, Clone)]
pub struct CurrentAccount {
    pub account: Account,
    pub source: CredentialSource,
}

/// Credential from the `Authorization` header.
///
/// `Ok(None)` when the header is absent or names another scheme. A header
/// that uses our keyword but is otherwise garbled is `Invalid`.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, CredentialError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| CredentialError::Invalid)?;
    let mut parts = value.split_whitespace();
    let Some(keyword) = parts.next() else {
        return Err(CredentialError::Invalid);
    };
    if !AUTH_KEYWORDS.contains(&keyword.to_ascii_lowercase().as_str()) {
        return Ok(None);
    }
    match (parts.next(), parts.next()) {
        (Some(token), None) => Ok(Some(token.to_string())),
        _ => Err(CredentialError::Invalid),
    }
}

/// Value of the session cookie, if sent
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value for a fresh session
pub fn session_set_cookie(session_id: &str) -> String {
    format!("{SESSION_COOKIE}={session_id}; HttpOnly; SameSite=Lax; Path=/")
}

/// `Set-Cookie` value that removes the session cookie
pub fn session_clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}

impl<S: Storage + Clone> FromRequestParts<Arc<AppState<S>>> for CurrentAccount {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(&parts.headers)? {
            let account = state.auth.authenticate(&token).await?;
            return Ok(Self {
                account,
                source: CredentialSource::Bearer(token),
            });
        }
        if let Some(session_id) = session_cookie(&parts.headers) {
            let account = state.auth.authenticate_session(&session_id).await?;
            return Ok(Self {
                account,
                source: CredentialSource::Session(session_id),
            });
        }
        Err(AppError::Auth(
            "Authentication credentials were not provided.".to_string(),
        ))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address named by the forwarding headers of a trusted proxy. In
/// `X-Forwarded-For` the right-most hop that is not a trusted proxy wins.
fn forwarded_client(headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> Option<IpAddr> {
    if let Some(chain) = header_str(headers, "x-forwarded-for") {
        let hops = chain
            .split(',')
            .map(|hop| hop.trim().parse::<IpAddr>().ok())
            .collect::<Option<Vec<_>>>()?;
        return hops
            .iter()
            .rev()
            .find(|hop| !trusted_proxies.contains(hop))
            .or(hops.first())
            .copied();
    }
    header_str(headers, "x-real-ip").and_then(|v| v.parse().ok())
}

/// Origin of a request: the peer address, or what a trusted proxy says the
/// client was, plus the user agent
pub fn client_meta(parts: &Parts, trusted_proxies: &[IpAddr]) -> ClientMeta {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let ip_address = match peer {
        Some(peer) if trusted_proxies.contains(&peer) => {
            Some(forwarded_client(&parts.headers, trusted_proxies).unwrap_or(peer))
        }
        other => other,
    };
    let user_agent = header_str(&parts.headers, header::USER_AGENT.as_str()).map(str::to_string);

    ClientMeta {
        ip_address: ip_address.map(|ip| ip.to_string()),
        user_agent,
    }
}

impl<S: Storage + Clone> FromRequestParts<Arc<AppState<S>>> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        Ok(client_meta(parts, &state.settings.server.trusted_proxies))
    }
}
