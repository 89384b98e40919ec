//! Drives the whole popup flow through the router with a session cookie.

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    http::{
        Request, StatusCode,
        header::{COOKIE, SET_COOKIE},
    },
};
use mobileconnect::{
    api::{self, SessionRegistry},
    flow::{
        AuthConfig, AuthorizationBackend, ClientSettings, DiscoveryBackend, FailureDetail,
        FlowOrchestrator, FlowRequest, FlowStatus, SessionConfigStore,
        backend::BackendFuture,
        session::{load, store},
        status::{DiscoveryResult, TokenResult},
    },
};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

const OPERATOR_KEY: &str = "test:operator";

/// Walks a session through discovery and authorization using session attributes.
#[derive(Debug, Default)]
struct SessionBackend;

fn discovery(operator: &str) -> DiscoveryResult {
    DiscoveryResult {
        cached: false,
        response_code: Some(200),
        headers: Vec::new(),
        payload: json!({ "response": { "serving_operator": operator } }),
    }
}

fn remember(request: &FlowRequest, operator: &str) -> FlowStatus {
    store(request.session(), OPERATOR_KEY, Arc::new(operator.to_string()));
    FlowStatus::AuthorizationReady {
        discovery: discovery(operator),
    }
}

impl DiscoveryBackend for SessionBackend {
    fn begin_discovery<'a>(
        &'a self,
        _config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            Ok(match request.param("msisdn") {
                Some(_) => remember(request, "direct-operator"),
                None => FlowStatus::OperatorSelectionRequired {
                    redirect_url: "https://discovery.example/select".to_string(),
                },
            })
        })
    }

    fn complete_discovery_redirect<'a>(
        &'a self,
        _config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            if let Some(error) = request.param("error") {
                return Ok(FlowStatus::Failed(FailureDetail::new(
                    error,
                    request.param("error_description").unwrap_or_default(),
                )));
            }
            Ok(match request.param("mcc_mnc") {
                Some(selected) => remember(request, selected),
                None => FlowStatus::DiscoveryRequired,
            })
        })
    }
}

impl AuthorizationBackend for SessionBackend {
    fn begin_authorization<'a>(
        &'a self,
        config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            let Some(operator) = load::<String>(request.session(), OPERATOR_KEY) else {
                return Ok(FlowStatus::DiscoveryRequired);
            };
            Ok(FlowStatus::AuthorizationRequired {
                redirect_url: format!(
                    "https://operator.example/authorize?state={}&nonce={}",
                    config.authorization_state(),
                    config.authorization_nonce()
                ),
                discovery: discovery(&operator),
            })
        })
    }

    fn complete_authorization_redirect<'a>(
        &'a self,
        config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            if load::<String>(request.session(), OPERATOR_KEY).is_none() {
                return Ok(FlowStatus::DiscoveryRequired);
            }
            if request.param("state") != Some(config.authorization_state()) {
                return Ok(FlowStatus::Failed(FailureDetail::new(
                    "invalid_state",
                    "State does not match the authorization request",
                )));
            }
            Ok(FlowStatus::Complete {
                authorization: None,
                token: TokenResult {
                    response_code: 200,
                    headers: Vec::new(),
                    response_data: None,
                },
            })
        })
    }
}

fn router() -> Router {
    let settings = ClientSettings::new(
        "client-id",
        SecretString::from("client-secret"),
        "https://discovery.example/v2/discovery",
    );
    let backend = Arc::new(SessionBackend);
    let orchestrator = Arc::new(FlowOrchestrator::new(
        SessionConfigStore::new(settings),
        backend.clone(),
        backend,
    ));
    api::app(
        orchestrator,
        Arc::new(SessionRegistry::new(Duration::from_secs(60))),
    )
}

struct Reply {
    status: StatusCode,
    set_cookie: Option<String>,
    body: String,
}

impl Reply {
    fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

async fn call(router: &Router, uri: &str, cookie: Option<&str>) -> Result<Reply> {
    let mut request = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, cookie);
    }
    let response = router.clone().oneshot(request.body(Body::empty())?).await?;

    let status = response.status();
    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .map(|value| value.to_str().map(str::to_string))
        .transpose()?;
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(Reply {
        status,
        set_cookie,
        body: String::from_utf8(bytes.to_vec())?,
    })
}

fn cookie_pair(set_cookie: Option<&str>) -> Result<String> {
    set_cookie
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
        .context("response did not set a session cookie")
}

fn query_value(url: &str, name: &str) -> Result<String> {
    let parsed = url::Url::parse(url)?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .with_context(|| format!("{name} missing from {url}"))
}

#[tokio::test]
async fn operator_selection_flow() -> Result<()> {
    let router = router();

    let start = call(&router, "/mobileconnect/start_discovery", None).await?;
    assert_eq!(start.status, StatusCode::OK);
    let cookie = cookie_pair(start.set_cookie.as_deref())?;
    let body = start.json()?;
    assert_eq!(body["outcome"], "operator_selection");
    assert_eq!(body["url"], "https://discovery.example/select");

    let redirect = call(
        &router,
        "/mobileconnect/discovery_redirect?mcc_mnc=901_01",
        Some(&cookie),
    )
    .await?;
    assert!(redirect.set_cookie.is_none());
    assert!(redirect.body.contains(r#"data-page="request_authorization""#));

    let authorize = call(&router, "/mobileconnect/start_authorization", Some(&cookie)).await?;
    let body = authorize.json()?;
    assert_eq!(body["outcome"], "authorization");
    let url = body["url"].as_str().context("authorization url")?;
    let state = query_value(url, "state")?;
    let nonce = query_value(url, "nonce")?;
    assert!(state.starts_with("state_"));
    assert!(nonce.starts_with("nonce_"));

    // the same session keeps the same state across calls
    let again = call(&router, "/mobileconnect/start_authorization", Some(&cookie)).await?;
    let again_url = again.json()?["url"].as_str().map(str::to_string);
    assert_eq!(again_url.as_deref(), Some(url));

    let done = call(
        &router,
        &format!("/mobile_connect?code=abc&state={state}"),
        Some(&cookie),
    )
    .await?;
    assert_eq!(done.status, StatusCode::OK);
    assert!(done.body.contains(r#"data-page="authorized""#));
    Ok(())
}

#[tokio::test]
async fn msisdn_goes_straight_to_authorization() -> Result<()> {
    let router = router();

    let start = call(
        &router,
        "/mobileconnect/start_discovery?msisdn=447700900000",
        None,
    )
    .await?;
    let cookie = cookie_pair(start.set_cookie.as_deref())?;
    assert_eq!(start.json()?["outcome"], "start_authorization");

    let authorize = call(&router, "/mobileconnect/start_authorization", Some(&cookie)).await?;
    assert_eq!(authorize.json()?["outcome"], "authorization");
    Ok(())
}

#[tokio::test]
async fn state_from_another_session_is_rejected() -> Result<()> {
    let router = router();

    let first = call(&router, "/mobileconnect/start_discovery?msisdn=1", None).await?;
    let first_cookie = cookie_pair(first.set_cookie.as_deref())?;
    let first_url = call(
        &router,
        "/mobileconnect/start_authorization",
        Some(&first_cookie),
    )
    .await?
    .json()?["url"]
        .as_str()
        .map(str::to_string)
        .context("authorization url")?;
    let first_state = query_value(&first_url, "state")?;

    let second = call(&router, "/mobileconnect/start_discovery?msisdn=2", None).await?;
    let second_cookie = cookie_pair(second.set_cookie.as_deref())?;
    assert_ne!(first_cookie, second_cookie);

    let done = call(
        &router,
        &format!("/mobile_connect?code=abc&state={first_state}"),
        Some(&second_cookie),
    )
    .await?;
    assert!(done.body.contains(r#"data-page="error""#));
    assert!(done.body.contains("invalid_state"));
    Ok(())
}

#[tokio::test]
async fn fresh_session_is_sent_back_to_discovery() -> Result<()> {
    let router = router();

    let authorize = call(&router, "/mobileconnect/start_authorization", None).await?;
    assert!(authorize.set_cookie.is_some());
    assert_eq!(authorize.json()?["outcome"], "start_discovery");

    let page = call(&router, "/mobile_connect?code=abc&state=x", None).await?;
    assert!(page.body.contains(r#"data-page="request_discovery""#));
    assert!(page.body.contains("startDiscovery()"));
    Ok(())
}

#[tokio::test]
async fn discovery_error_renders_error_page() -> Result<()> {
    let router = router();

    let page = call(
        &router,
        "/mobileconnect/discovery_redirect?error=invalid_request&error_description=missing%20operator",
        None,
    )
    .await?;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains(r#"data-page="error""#));
    assert!(page.body.contains("invalid_request"));
    assert!(page.body.contains("missing operator"));
    Ok(())
}
