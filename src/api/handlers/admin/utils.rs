//! Request guards shared by the admin handlers.
//!
//! Flow Overview: every admin handler first calls [`enforce_rate_limit`] with
//! the caller's address, then (for protected routes) [`require_admin`] to turn
//! the bearer token into an [`Identity`]. Both return a ready-made error
//! response on rejection so handlers can return early.

use axum::{
    extract::ConnectInfo,
    http::{header::AUTHORIZATION, header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::net::SocketAddr;
use tracing::{debug, error};

use super::types::{ErrorResponse, RateLimitResponse};
use crate::security::{error::AuthError, rate_limit::whole_seconds, Identity, Security};

pub(super) const INVALID_REQUEST_BODY: &str = "invalid request body";
const AUTH_HEADER_REQUIRED: &str = "authorization header required";
const AUTH_HEADER_FORMAT: &str = "invalid authorization header format";
const RATE_LIMIT_EXCEEDED: &str = "rate limit exceeded";

pub(super) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Map a security error to its public status and message.
pub(super) fn auth_error_response(err: &AuthError) -> Response {
    if let AuthError::RateLimitExceeded { retry_after } = err {
        return rate_limited(whole_seconds(*retry_after));
    }

    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(kind = err.kind(), "request failed: {err}");
    }
    error_response(status, err.public_message())
}

fn rate_limited(retry_after: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RateLimitResponse {
            error: RATE_LIMIT_EXCEEDED.to_string(),
            retry_after,
        }),
    )
        .into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// The socket peer, or the proxy headers first when `trust_proxy_headers` is set.
pub(crate) fn client_key(
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy_headers: bool,
) -> String {
    trust_proxy_headers
        .then(|| extract_client_ip(headers))
        .flatten()
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Count this request against the caller's window.
pub(super) fn enforce_rate_limit(
    security: &Security,
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
) -> Result<(), Response> {
    let limiter = security.rate_limiter();
    if !limiter.config().enabled() {
        return Ok(());
    }

    let key = client_key(headers, peer, limiter.config().trust_proxy_headers());
    let admission = limiter.check(&key);
    if admission.allowed {
        Ok(())
    } else {
        debug!(client = %key, "admin request rate limited");
        Err(rate_limited(admission.retry_after_seconds()))
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Err(AUTH_HEADER_REQUIRED);
    };
    let value = value.to_str().map_err(|_| AUTH_HEADER_FORMAT)?;
    if value.is_empty() {
        return Err(AUTH_HEADER_REQUIRED);
    }

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] => Ok(*token),
        _ => Err(AUTH_HEADER_FORMAT),
    }
}

/// Resolve the bearer token into the calling admin, or a 401 response.
pub(super) fn require_admin(security: &Security, headers: &HeaderMap) -> Result<Identity, Response> {
    let token =
        bearer_token(headers).map_err(|message| error_response(StatusCode::UNAUTHORIZED, message))?;
    security
        .authorize(token)
        .map_err(|err| auth_error_response(&err))
}
