use crate::{api::handlers::flow, flow::FlowOrchestrator};
use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request, Response, header::CONTENT_TYPE},
    routing::{options, post},
};
use std::{any::Any, sync::Arc};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, debug, error, info, info_span};
use ulid::Ulid;

pub mod handlers;
mod openapi;
pub mod pages;
pub mod session;

pub use openapi::openapi;
pub use session::SessionRegistry;

/// Build the application router with every route and layer attached.
#[must_use]
pub fn app(orchestrator: Arc<FlowOrchestrator>, sessions: Arc<SessionRegistry>) -> Router {
    let (router, _openapi) = openapi::api_router().split_for_parts();

    // the page script may call any entry point with POST as well
    let router = router
        .route("/mobileconnect/start_discovery", post(flow::start_discovery))
        .route(
            "/mobileconnect/discovery_redirect",
            post(flow::discovery_redirect),
        )
        .route(
            "/mobileconnect/start_authorization",
            post(flow::start_authorization),
        )
        .route("/mobile_connect", post(flow::authorization_redirect))
        .route(
            "/mobileconnect/mobile_connect_error",
            post(flow::mobile_connect_error),
        )
        .route("/health", options(handlers::health::health));

    with_layers(router, orchestrator, sessions)
}

fn with_layers(
    router: Router,
    orchestrator: Arc<FlowOrchestrator>,
    sessions: Arc<SessionRegistry>,
) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(Extension(orchestrator))
            .layer(Extension(sessions)),
    )
}

/// Serve the application until ctrl-c or SIGTERM.
/// # Errors
/// Returns an error if the server fails to start
pub async fn new(
    port: u16,
    orchestrator: Arc<FlowOrchestrator>,
    sessions: Arc<SessionRegistry>,
) -> Result<()> {
    let purge = Arc::clone(&sessions);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge.ttl().max(std::time::Duration::from_secs(1)));
        loop {
            interval.tick().await;
            let removed = purge.purge_expired().await;
            if removed > 0 {
                debug!(removed, "Purged expired sessions");
            }
        }
    });

    let app = app(orchestrator, sessions);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => error!("Failed to listen for SIGTERM: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

// A panic escaping a handler ends on the error page.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<String> {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %detail, "Uncaught exception");

    let page = pages::render(&crate::flow::Page::error(
        "internal error",
        "An unexpected error occurred",
    ));
    let mut response = Response::new(page.0);
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}
