//! JSON responses for the AJAX endpoints and diagnostic logging of results.

use super::{
    interpret::UNEXPECTED_STATUS,
    status::{AuthorizationResult, DiscoveryResult, FailureDetail, FlowStatus, TokenResult},
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

/// What the page script should do next.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Open `url` so the user can pick an operator.
    OperatorSelection,
    /// Call `start_authorization`.
    StartAuthorization,
    /// Call `start_discovery`.
    StartDiscovery,
    /// Open `url` to authorize with the operator.
    Authorization,
    Error,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FlowResponse {
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl FlowResponse {
    fn outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            url: None,
            error: None,
            error_description: None,
        }
    }

    #[must_use]
    pub fn operator_selection(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::outcome(Outcome::OperatorSelection)
        }
    }

    #[must_use]
    pub fn start_authorization() -> Self {
        Self::outcome(Outcome::StartAuthorization)
    }

    #[must_use]
    pub fn start_discovery() -> Self {
        Self::outcome(Outcome::StartDiscovery)
    }

    #[must_use]
    pub fn authorization(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::outcome(Outcome::Authorization)
        }
    }

    #[must_use]
    pub fn error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            error_description: Some(description.into()),
            ..Self::outcome(Outcome::Error)
        }
    }

    #[must_use]
    pub fn failed(detail: &FailureDetail) -> Self {
        Self::error(detail.code(), detail.error_description.clone())
    }

    #[must_use]
    pub fn unexpected(status: &FlowStatus) -> Self {
        Self::error(
            UNEXPECTED_STATUS,
            format!("Unexpected flow status: {}", status.kind()),
        )
    }
}

pub fn log_discovery_result(discovery: &DiscoveryResult) {
    let response_code = discovery
        .response_code
        .map_or_else(|| "none".to_string(), |code| code.to_string());
    debug!(
        cached = discovery.cached,
        response_code = %response_code,
        "Discovery result"
    );
    for (name, value) in &discovery.headers {
        debug!(header = %name, value = %value, "Discovery response header");
    }
    debug!(
        serving_operator = %discovery.serving_operator().unwrap_or("absent"),
        "Discovery serving operator"
    );
}

/// Log a completed authorization: code, token response and ID token claims.
pub fn log_outcome(authorization: Option<&AuthorizationResult>, token: &TokenResult) {
    if let Some(authorization) = authorization {
        debug!(
            code = %authorization.code.as_deref().unwrap_or("none"),
            state = %authorization.state.as_deref().unwrap_or("none"),
            "Authorization result"
        );
    }

    debug!(response_code = token.response_code, "Token response");
    for (name, value) in &token.headers {
        debug!(header = %name, value = %value, "Token response header");
    }

    let Some(data) = &token.response_data else {
        return;
    };
    debug!(time_received = %data.time_received.to_rfc3339(), "Token received");

    if let Some(parsed) = &data.parsed_id_token {
        if let Some(nonce) = &parsed.nonce {
            debug!(nonce = %nonce, "ID token nonce");
        }
        if let Some(pcr) = &parsed.pcr {
            debug!(pcr = %pcr, "Pseudonymous customer reference");
        }
    }
}

pub fn log_failure(detail: &FailureDetail) {
    debug!(
        error = %detail.code(),
        error_description = %detail.error_description,
        "Flow failed"
    );

    let Some(cause) = &detail.cause else {
        return;
    };
    debug!(
        phase = cause.phase.as_str(),
        reason = %cause.message,
        request_uri = %cause.request_uri.as_deref().unwrap_or("none"),
        response_code = %cause
            .response_code
            .map_or_else(|| "none".to_string(), |code| code.to_string()),
        contents = %cause.contents.as_deref().unwrap_or(""),
        "Failure cause"
    );
    for (name, value) in &cause.headers {
        debug!(header = %name, value = %value, "Failure response header");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{
        status::{FailureCause, FailurePhase, ParsedIdToken, TokenResponseData, UNKNOWN_ERROR},
        test_support::LogCapture,
    };
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn json_shape_skips_absent_fields() -> anyhow::Result<()> {
        let value = serde_json::to_value(FlowResponse::operator_selection(
            "https://op.example/select",
        ))?;
        assert_eq!(
            value,
            json!({ "outcome": "operator_selection", "url": "https://op.example/select" })
        );

        let value = serde_json::to_value(FlowResponse::start_authorization())?;
        assert_eq!(value, json!({ "outcome": "start_authorization" }));

        let value = serde_json::to_value(FlowResponse::error("invalid_request", "bad"))?;
        assert_eq!(
            value,
            json!({ "outcome": "error", "error": "invalid_request", "error_description": "bad" })
        );
        Ok(())
    }

    #[test]
    fn unexpected_names_the_status() {
        let response = FlowResponse::unexpected(&FlowStatus::DiscoveryRequired);
        assert_eq!(response.outcome, Outcome::Error);
        assert_eq!(response.error.as_deref(), Some(UNEXPECTED_STATUS));
        assert!(
            response
                .error_description
                .is_some_and(|description| description.contains("discovery_required"))
        );
    }

    #[test]
    fn log_outcome_emits_claims() {
        let capture = LogCapture::default();
        capture.scope(|| {
            log_outcome(
                Some(&AuthorizationResult {
                    code: Some("abc".to_string()),
                    state: None,
                }),
                &TokenResult {
                    response_code: 200,
                    headers: vec![("cache-control".to_string(), "no-store".to_string())],
                    response_data: Some(TokenResponseData {
                        time_received: Utc::now(),
                        access_token: None,
                        token_type: None,
                        expires_in: None,
                        id_token: None,
                        parsed_id_token: Some(ParsedIdToken {
                            nonce: Some("nonce_xyz".to_string()),
                            pcr: Some("abc123".to_string()),
                        }),
                    }),
                },
            );
        });
        let output = capture.output();
        assert!(output.contains("pcr=abc123"), "{output}");
        assert!(output.contains("nonce=nonce_xyz"), "{output}");
        assert!(output.contains("state=none"), "{output}");
        assert!(output.contains("header=cache-control"), "{output}");
    }

    #[test]
    fn log_discovery_result_handles_missing_fields() {
        let capture = LogCapture::default();
        capture.scope(|| log_discovery_result(&DiscoveryResult::default()));
        let output = capture.output();
        assert!(output.contains("response_code=none"), "{output}");
        assert!(output.contains("serving_operator=absent"), "{output}");
    }

    #[test]
    fn log_failure_includes_transport() {
        let detail = FailureDetail::new("discovery_failed", "Failed to obtain operator details")
            .with_cause(FailureCause {
                phase: FailurePhase::Discovery,
                message: "timed out".to_string(),
                request_uri: Some("https://discovery.example".to_string()),
                response_code: Some(504),
                contents: Some("gateway timeout".to_string()),
                headers: vec![("server".to_string(), "edge".to_string())],
            });
        let capture = LogCapture::default();
        capture.scope(|| log_failure(&detail));
        let output = capture.output();
        assert!(output.contains("error=discovery_failed"), "{output}");
        assert!(output.contains("phase=\"discovery\""), "{output}");
        assert!(output.contains("response_code=504"), "{output}");
        assert!(output.contains("header=server"), "{output}");
    }

    #[test]
    fn failed_with_blank_code_reports_unknown_error() {
        let detail = FailureDetail {
            error_code: String::new(),
            error_description: String::new(),
            cause: None,
        };
        let response = FlowResponse::failed(&detail);
        assert_eq!(response.error.as_deref(), Some(UNKNOWN_ERROR));

        let capture = LogCapture::default();
        capture.scope(|| log_failure(&detail));
        let output = capture.output();
        assert!(output.contains("error=unknown_error"), "{output}");
    }
}
