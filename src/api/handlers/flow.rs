//! Handlers for the four flow entry points and the error page.
//!
//! Both AJAX endpoints always answer `200` with a [`FlowResponse`]; both redirect
//! targets always answer with a page, the error page included.

use crate::{
    api::{
        pages,
        session::{ResolvedSession, SessionRegistry},
    },
    flow::{FlowOrchestrator, FlowRequest, FlowResponse, Page, status::UNKNOWN_ERROR},
};
use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Json, Response},
};
use std::{collections::HashMap, sync::Arc};
use tracing::error;

async fn flow_request(
    sessions: &SessionRegistry,
    headers: HeaderMap,
    query: HashMap<String, String>,
) -> anyhow::Result<(FlowRequest, Option<HeaderValue>)> {
    let ResolvedSession {
        session,
        set_cookie,
    } = sessions.resolve(&headers).await?;
    let request = FlowRequest::new(session)
        .with_query(query)
        .with_headers(headers);
    Ok((request, set_cookie))
}

fn with_cookie(mut response: Response, set_cookie: Option<HeaderValue>) -> Response {
    if let Some(cookie) = set_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

fn session_failure_json(err: &anyhow::Error) -> Response {
    error!("Failed to resolve session: {err:#}");
    Json(FlowResponse::error("internal error", "Could not start a session")).into_response()
}

fn session_failure_page(err: &anyhow::Error) -> Response {
    error!("Failed to resolve session: {err:#}");
    pages::render(&Page::error("internal error", "Could not start a session")).into_response()
}

#[utoipa::path(
    get,
    path = "/mobileconnect/start_discovery",
    params(
        ("msisdn" = Option<String>, Query, description = "Subscriber number, skips operator selection"),
        ("mcc" = Option<String>, Query, description = "Mobile country code"),
        ("mnc" = Option<String>, Query, description = "Mobile network code"),
    ),
    responses(
        (status = 200, description = "Next step for the page script", body = FlowResponse)
    ),
    tag = "mobileconnect"
)]
/// Start operator discovery.
pub async fn start_discovery(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    orchestrator: Extension<Arc<FlowOrchestrator>>,
    sessions: Extension<Arc<SessionRegistry>>,
) -> Response {
    match flow_request(&sessions, headers, query).await {
        Ok((request, set_cookie)) => {
            let response = orchestrator.start_discovery(&request).await;
            with_cookie(Json(response).into_response(), set_cookie)
        }
        Err(err) => session_failure_json(&err),
    }
}

#[utoipa::path(
    get,
    path = "/mobileconnect/discovery_redirect",
    params(
        ("mcc_mnc" = Option<String>, Query, description = "Selected operator as MCC_MNC"),
        ("subscriber_id" = Option<String>, Query, description = "Encrypted subscriber number"),
        ("error" = Option<String>, Query, description = "Error returned by the discovery service"),
    ),
    responses(
        (status = 200, description = "Page that continues or ends the flow", body = String, content_type = "text/html")
    ),
    tag = "mobileconnect"
)]
/// Return target of the operator selection page.
pub async fn discovery_redirect(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    orchestrator: Extension<Arc<FlowOrchestrator>>,
    sessions: Extension<Arc<SessionRegistry>>,
) -> Response {
    match flow_request(&sessions, headers, query).await {
        Ok((request, set_cookie)) => {
            let page = orchestrator.discovery_redirect(&request).await;
            with_cookie(pages::render(&page).into_response(), set_cookie)
        }
        Err(err) => session_failure_page(&err),
    }
}

#[utoipa::path(
    get,
    path = "/mobileconnect/start_authorization",
    responses(
        (status = 200, description = "Next step for the page script", body = FlowResponse)
    ),
    tag = "mobileconnect"
)]
/// Start authorization with the discovered operator.
pub async fn start_authorization(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    orchestrator: Extension<Arc<FlowOrchestrator>>,
    sessions: Extension<Arc<SessionRegistry>>,
) -> Response {
    match flow_request(&sessions, headers, query).await {
        Ok((request, set_cookie)) => {
            let response = orchestrator.start_authorization(&request).await;
            with_cookie(Json(response).into_response(), set_cookie)
        }
        Err(err) => session_failure_json(&err),
    }
}

#[utoipa::path(
    get,
    path = "/mobile_connect",
    params(
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "State sent with the authorization request"),
        ("error" = Option<String>, Query, description = "Error returned by the operator"),
        ("error_description" = Option<String>, Query, description = "Error description returned by the operator"),
    ),
    responses(
        (status = 200, description = "Page that continues or ends the flow", body = String, content_type = "text/html")
    ),
    tag = "mobileconnect"
)]
/// Return target of the operator's authorization page.
pub async fn authorization_redirect(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    orchestrator: Extension<Arc<FlowOrchestrator>>,
    sessions: Extension<Arc<SessionRegistry>>,
) -> Response {
    match flow_request(&sessions, headers, query).await {
        Ok((request, set_cookie)) => {
            let page = orchestrator.authorization_redirect(&request).await;
            with_cookie(pages::render(&page).into_response(), set_cookie)
        }
        Err(err) => session_failure_page(&err),
    }
}

#[utoipa::path(
    get,
    path = "/mobileconnect/mobile_connect_error",
    params(
        ("error" = Option<String>, Query, description = "Error code"),
        ("error_description" = Option<String>, Query, description = "Human readable description"),
    ),
    responses(
        (status = 200, description = "Error page", body = String, content_type = "text/html")
    ),
    tag = "mobileconnect"
)]
/// Show an error reported by the page script.
pub async fn mobile_connect_error(Query(mut query): Query<HashMap<String, String>>) -> Response {
    let page = Page::error(
        query
            .remove("error")
            .filter(|error| !error.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        query.remove("error_description").unwrap_or_default(),
    );
    pages::render(&page).into_response()
}
