//! Entry points of the flow.
//!
//! Each method obtains the session's config, runs a single backend step and
//! interprets the result. No lock is held while a backend step runs.

use super::{
    backend::{AuthorizationBackend, DiscoveryBackend, FlowRequest},
    config::{AuthConfig, SessionConfigStore},
    error::FlowError,
    interpret::{Page, page_for},
    render::{FlowResponse, log_discovery_result, log_failure, log_outcome},
    status::FlowStatus,
};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct FlowOrchestrator {
    configs: SessionConfigStore,
    discovery: Arc<dyn DiscoveryBackend>,
    authorization: Arc<dyn AuthorizationBackend>,
}

impl FlowOrchestrator {
    #[must_use]
    pub fn new(
        configs: SessionConfigStore,
        discovery: Arc<dyn DiscoveryBackend>,
        authorization: Arc<dyn AuthorizationBackend>,
    ) -> Self {
        Self {
            configs,
            discovery,
            authorization,
        }
    }

    async fn config(&self, request: &FlowRequest) -> Arc<AuthConfig> {
        self.configs.get_or_create(request.session()).await
    }

    /// Start operator discovery. Answers with JSON for the page script.
    #[instrument(skip_all, fields(session = request.session().id()))]
    pub async fn start_discovery(&self, request: &FlowRequest) -> FlowResponse {
        let config = self.config(request).await;
        let status = settle(self.discovery.begin_discovery(&config, request).await);

        match &status {
            FlowStatus::OperatorSelectionRequired { redirect_url } => {
                debug!(url = %redirect_url, "Operator selection required");
                FlowResponse::operator_selection(redirect_url.clone())
            }
            FlowStatus::AuthorizationRequired { discovery, .. }
            | FlowStatus::AuthorizationReady { discovery } => {
                log_discovery_result(discovery);
                FlowResponse::start_authorization()
            }
            FlowStatus::Failed(detail) => {
                log_failure(detail);
                FlowResponse::failed(detail)
            }
            FlowStatus::DiscoveryRequired | FlowStatus::Complete { .. } => {
                debug!(status = %status, "Unexpected status from discovery");
                FlowResponse::unexpected(&status)
            }
        }
    }

    /// Browser returns from the operator selection page.
    #[instrument(skip_all, fields(session = request.session().id()))]
    pub async fn discovery_redirect(&self, request: &FlowRequest) -> Page {
        let config = self.config(request).await;
        let status = settle(
            self.discovery
                .complete_discovery_redirect(&config, request)
                .await,
        );

        match &status {
            FlowStatus::Failed(detail) => log_failure(detail),
            FlowStatus::DiscoveryRequired => debug!("Discovery has to be restarted"),
            FlowStatus::AuthorizationRequired { discovery, .. }
            | FlowStatus::AuthorizationReady { discovery } => log_discovery_result(discovery),
            FlowStatus::OperatorSelectionRequired { .. } | FlowStatus::Complete { .. } => {
                debug!(status = %status, "Unexpected status from discovery redirect");
            }
        }

        page_for(&status)
    }

    /// Start authorization with the discovered operator. Answers with JSON.
    #[instrument(skip_all, fields(session = request.session().id()))]
    pub async fn start_authorization(&self, request: &FlowRequest) -> FlowResponse {
        let config = self.config(request).await;
        let status = settle(
            self.authorization
                .begin_authorization(&config, request)
                .await,
        );

        match &status {
            FlowStatus::Failed(detail) => {
                log_failure(detail);
                FlowResponse::failed(detail)
            }
            FlowStatus::DiscoveryRequired => FlowResponse::start_discovery(),
            FlowStatus::AuthorizationRequired {
                redirect_url,
                discovery,
            } => {
                log_discovery_result(discovery);
                debug!(url = %redirect_url, "Authorization URL");
                FlowResponse::authorization(redirect_url.clone())
            }
            // the page script needs a URL to open, a bare "ready" is not enough here
            FlowStatus::AuthorizationReady { .. }
            | FlowStatus::OperatorSelectionRequired { .. }
            | FlowStatus::Complete { .. } => {
                debug!(status = %status, "Unexpected status from authorization");
                FlowResponse::unexpected(&status)
            }
        }
    }

    /// Browser returns from the operator with an authorization code.
    #[instrument(skip_all, fields(session = request.session().id()))]
    pub async fn authorization_redirect(&self, request: &FlowRequest) -> Page {
        let config = self.config(request).await;
        let status = settle(
            self.authorization
                .complete_authorization_redirect(&config, request)
                .await,
        );

        match &status {
            FlowStatus::Failed(detail) => log_failure(detail),
            FlowStatus::DiscoveryRequired => debug!("Discovery required before authorization"),
            FlowStatus::Complete {
                authorization,
                token,
            } => log_outcome(authorization.as_ref(), token),
            FlowStatus::OperatorSelectionRequired { .. }
            | FlowStatus::AuthorizationRequired { .. }
            | FlowStatus::AuthorizationReady { .. } => {
                debug!(status = %status, "Unexpected status from authorization redirect");
            }
        }

        page_for(&status)
    }
}

fn settle(result: Result<FlowStatus, FlowError>) -> FlowStatus {
    result.unwrap_or_else(FlowStatus::from)
}
