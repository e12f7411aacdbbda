use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;

use super::types::{ChangePasswordRequest, ErrorResponse, MessageResponse, RateLimitResponse};
use super::utils::{
    auth_error_response, enforce_rate_limit, error_response, require_admin, INVALID_REQUEST_BODY,
};
use crate::security::{error::AuthError, Security};

#[utoipa::path(
    post,
    path= "/admin/change-password",
    request_body = ChangePasswordRequest,
    responses (
        (status = 200, description = "Password replaced", body = MessageResponse),
        (status = 400, description = "Malformed body or new password too short", body = ErrorResponse),
        (status = 401, description = "Bad bearer token or wrong current password", body = ErrorResponse),
        (status = 404, description = "Admin no longer exists", body = ErrorResponse),
        (status = 429, description = "Too many requests from this client", body = RateLimitResponse),
    ),
    security(("bearer" = [])),
    tag= "admin"
)]
#[instrument(skip(headers, peer, security, payload))]
pub async fn change_password(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    security: Extension<Arc<Security>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Response {
    if let Err(response) = enforce_rate_limit(&security, &headers, peer.as_ref()) {
        return response;
    }
    let identity = match require_admin(&security, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    let request: ChangePasswordRequest = match payload {
        Some(Json(payload)) if !payload.current_password.is_empty() => payload,
        _ => return error_response(StatusCode::BAD_REQUEST, INVALID_REQUEST_BODY),
    };

    match security
        .change_password(
            identity.admin_id,
            &request.current_password,
            &request.new_password,
        )
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "password updated successfully".to_string(),
            }),
        )
            .into_response(),
        Err(AuthError::AccountNotFound) => {
            error_response(StatusCode::NOT_FOUND, "admin not found")
        }
        Err(err) => auth_error_response(&err),
    }
}
