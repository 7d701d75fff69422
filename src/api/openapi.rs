//! OpenAPI document served next to the API.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::error::FieldError;
use super::handlers;
use super::handlers::auth::types::{
    AuthResponse, LoginRequest, MeResponse, RegisterRequest, SendCodeRequest, SendCodeResponse,
    UserResponse,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::send_code::send_code,
        handlers::auth::register::register,
        handlers::auth::login::login,
        handlers::auth::me::me,
    ),
    components(schemas(
        SendCodeRequest,
        SendCodeResponse,
        RegisterRequest,
        LoginRequest,
        AuthResponse,
        MeResponse,
        UserResponse,
        FieldError,
        handlers::health::Health,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Email verification-code authentication"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_token",
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_all_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/health"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/auth/send-code"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/auth/register"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/auth/login"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/auth/me"));
    }
}
