use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;

use super::types::{ErrorResponse, ProfileResponse, RateLimitResponse};
use super::utils::{auth_error_response, enforce_rate_limit, error_response, require_admin};
use crate::security::{error::AuthError, Security};

#[utoipa::path(
    get,
    path= "/admin/profile",
    responses (
        (status = 200, description = "Profile of the calling admin", body = ProfileResponse),
        (status = 401, description = "Missing, malformed, invalid or expired bearer token", body = ErrorResponse),
        (status = 404, description = "Admin no longer exists", body = ErrorResponse),
        (status = 429, description = "Too many requests from this client", body = RateLimitResponse),
    ),
    security(("bearer" = [])),
    tag= "admin"
)]
#[instrument(skip(headers, peer, security))]
pub async fn profile(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    security: Extension<Arc<Security>>,
) -> Response {
    if let Err(response) = enforce_rate_limit(&security, &headers, peer.as_ref()) {
        return response;
    }
    let identity = match require_admin(&security, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    match security.profile(identity.admin_id).await {
        Ok(account) => (
            StatusCode::OK,
            Json(ProfileResponse {
                id: account.id,
                login: account.login,
                active: account.active,
                last_login_at: account.last_login_at,
            }),
        )
            .into_response(),
        Err(AuthError::AccountNotFound) => {
            error_response(StatusCode::NOT_FOUND, "admin not found")
        }
        Err(err) => auth_error_response(&err),
    }
}
