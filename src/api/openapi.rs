use super::handlers::{
    auth::{accounts, login, recovery, session},
    health,
};
use utoipa::openapi::{InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Generate the `OpenAPI` document from the same wiring that serves routes.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both
/// served and documented. The bare `/` route is added outside and stays
/// undocumented on purpose.
pub(crate) fn api_router() -> OpenApiRouter {
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(accounts::create_super_user))
        .routes(routes!(accounts::create_user))
        .routes(routes!(login::login))
        .routes(routes!(recovery::two_factor_recovery))
        .routes(routes!(session::check_session))
        .routes(routes!(session::logout))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    let identifier = env!("CARGO_PKG_LICENSE");
    if !identifier.is_empty() {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        info.license = Some(license);
    }

    let mut auth_tag = Tag::new("auth");
    auth_tag.description =
        Some("Account creation, login, two-factor recovery, and sessions".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and database liveness".to_string());

    OpenApiBuilder::new()
        .info(info)
        .tags(Some(vec![auth_tag, health_tag]))
        .build()
}
