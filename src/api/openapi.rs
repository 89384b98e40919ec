use super::handlers::{flow, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Documented `GET` routes. The `POST` aliases are added by [`super::app`].
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(flow::start_discovery))
        .routes(routes!(flow::discovery_redirect))
        .routes(routes!(flow::start_authorization))
        .routes(routes!(flow::authorization_redirect))
        .routes(routes!(flow::mobile_connect_error));

    let mut flow_tag = Tag::new("mobileconnect");
    flow_tag.description = Some("Operator discovery and authorization flow".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service status".to_string());

    router.get_openapi_mut().tags = Some(vec![flow_tag, health_tag]);

    router
}

// Info comes from the package manifest rather than utoipa-axum's defaults.
fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let description = Some(env!("CARGO_PKG_DESCRIPTION").trim()).filter(|d| !d.is_empty());
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(description)
        .build();

    // only the first of the `;` separated authors is listed
    info.contact = env!("CARGO_PKG_AUTHORS")
        .split(';')
        .next()
        .and_then(author_contact);
    info.license = Some(env!("CARGO_PKG_LICENSE").trim())
        .filter(|spdx| !spdx.is_empty())
        .map(|spdx| {
            let mut license = License::new(spdx);
            license.identifier = Some(spdx.to_string());
            license
        });

    OpenApiBuilder::new().info(info).build()
}

fn author_contact(author: &str) -> Option<Contact> {
    let (name, email) = parse_author(author);
    if name.is_none() && email.is_none() {
        return None;
    }
    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

/// Split `Name <email>` into its parts; either may be missing.
fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    let (name, email) = match author.split_once('<') {
        Some((name, rest)) => (name, Some(rest.trim_end().trim_end_matches('>'))),
        None => (author, None),
    };
    let name = Some(name.trim()).filter(|name| !name.is_empty());
    let email = email.map(str::trim).filter(|email| !email.is_empty());
    (name, email)
}
