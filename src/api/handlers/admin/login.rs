use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;

use super::types::{ErrorResponse, LoginRequest, LoginResponse, RateLimitResponse};
use super::utils::{auth_error_response, enforce_rate_limit, error_response, INVALID_REQUEST_BODY};
use crate::security::Security;

#[utoipa::path(
    post,
    path= "/admin/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Credentials accepted, session token issued", body = LoginResponse),
        (status = 400, description = "Missing or malformed body", body = ErrorResponse),
        (status = 401, description = "Invalid login or password", body = ErrorResponse),
        (status = 429, description = "Too many requests from this client", body = RateLimitResponse),
    ),
    tag= "admin"
)]
#[instrument(skip(headers, peer, security, payload))]
pub async fn login(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    security: Extension<Arc<Security>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    if let Err(response) = enforce_rate_limit(&security, &headers, peer.as_ref()) {
        return response;
    }

    let request: LoginRequest = match payload {
        Some(Json(payload)) if !payload.login.is_empty() && !payload.password.is_empty() => {
            payload
        }
        _ => return error_response(StatusCode::BAD_REQUEST, INVALID_REQUEST_BODY),
    };

    match security.login(&request.login, &request.password).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(LoginResponse {
                token: outcome.token,
                expires_at: outcome.expires_at,
            }),
        )
            .into_response(),
        Err(err) => auth_error_response(&err),
    }
}
