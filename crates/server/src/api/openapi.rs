//! OpenAPI/Utoipa configuration.

use crate::api::{auth::AUTH_TAG, health::MISC_TAG};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let bearer = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .bearer_format("JWT")
            .description(Some(
                "Token obtained from `POST /auth` or `GET /auth/callback`.",
            ))
            .build();
        components.add_security_scheme("Authorization", SecurityScheme::Http(bearer));
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Auth Broker API",
        version = "1.0.0",
        description = "Exchanges Discord OAuth2 codes for RS256-signed identity tokens."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = AUTH_TAG, description = "Discord login and token endpoints")
    )
)]
pub struct ApiDoc;
