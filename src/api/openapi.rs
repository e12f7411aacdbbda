#![allow(clippy::needless_for_each)]

use crate::api::handlers::{
    admin::{self, types},
    health,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        admin::login::login,
        admin::profile::profile,
        admin::change_password::change_password
    ),
    components(
        schemas(
            health::Health,
            types::LoginRequest,
            types::LoginResponse,
            types::ProfileResponse,
            types::ChangePasswordRequest,
            types::MessageResponse,
            types::ErrorResponse,
            types::RateLimitResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "admin", description = "Admin session API"),
        (name = "health", description = "Service health"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc
}
