//! Backend contract for discovery and authorization.
//!
//! The orchestrator only knows these traits. [`http::HttpBackend`] talks to a
//! real discovery service and operator; tests plug in scripted backends.

pub mod http;

use super::{config::AuthConfig, error::FlowError, session::SessionHandle, status::FlowStatus};
use axum::http::HeaderMap;
use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<FlowStatus, FlowError>> + Send + 'a>>;

/// Inbound request data handed to a backend step.
#[derive(Clone)]
pub struct FlowRequest {
    query: HashMap<String, String>,
    headers: HeaderMap,
    session: Arc<dyn SessionHandle>,
}

impl FlowRequest {
    #[must_use]
    pub fn new(session: Arc<dyn SessionHandle>) -> Self {
        Self {
            query: HashMap::new(),
            headers: HeaderMap::new(),
            session,
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Non-empty query parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    #[must_use]
    pub fn session(&self) -> &dyn SessionHandle {
        self.session.as_ref()
    }
}

impl fmt::Debug for FlowRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowRequest")
            .field("query", &self.query)
            .field("session", &self.session.id())
            .finish_non_exhaustive()
    }
}

/// Locates the user's identity operator.
pub trait DiscoveryBackend: Send + Sync {
    /// First step, called from the page script.
    fn begin_discovery<'a>(
        &'a self,
        config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a>;

    /// The discovery service redirected the browser back after operator selection.
    fn complete_discovery_redirect<'a>(
        &'a self,
        config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a>;
}

/// Authorizes the user with the operator found by discovery.
pub trait AuthorizationBackend: Send + Sync {
    fn begin_authorization<'a>(
        &'a self,
        config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a>;

    /// The operator redirected the browser back with a code (or an error).
    fn complete_authorization_redirect<'a>(
        &'a self,
        config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::session::MemorySession;
    use axum::http::HeaderValue;

    #[test]
    fn param_ignores_blank_values() {
        let query = HashMap::from([
            ("msisdn".to_string(), " 447700900000 ".to_string()),
            ("mcc".to_string(), "   ".to_string()),
        ]);
        let request = FlowRequest::new(Arc::new(MemorySession::new("s"))).with_query(query);
        assert_eq!(request.param("msisdn"), Some("447700900000"));
        assert_eq!(request.param("mcc"), None);
        assert_eq!(request.param("mnc"), None);
        assert_eq!(request.session().id(), "s");
    }

    #[test]
    fn header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("x-source-ip", HeaderValue::from_static("10.0.0.1"));
        let request = FlowRequest::new(Arc::new(MemorySession::new("s"))).with_headers(headers);
        assert_eq!(request.header("x-source-ip"), Some("10.0.0.1"));
        assert_eq!(request.header("x-missing"), None);
    }
}
