//! Pure mapping from a [`FlowStatus`] to what happens next.

use super::status::FlowStatus;

/// Error code used when an endpoint receives a status it cannot act on.
pub const UNEXPECTED_STATUS: &str = "unexpected_status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    SelectOperator,
    StartDiscovery,
    StartAuthorization,
    Authorize,
    Complete,
    Fail,
}

#[must_use]
pub fn classify(status: &FlowStatus) -> NextAction {
    match status {
        FlowStatus::OperatorSelectionRequired { .. } => NextAction::SelectOperator,
        FlowStatus::DiscoveryRequired => NextAction::StartDiscovery,
        FlowStatus::AuthorizationReady { .. } => NextAction::StartAuthorization,
        FlowStatus::AuthorizationRequired { .. } => NextAction::Authorize,
        FlowStatus::Complete { .. } => NextAction::Complete,
        FlowStatus::Failed(_) => NextAction::Fail,
    }
}

/// Page shown at the end of a browser redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Authorized,
    RequestDiscovery,
    RequestAuthorization,
    Error { error: String, description: String },
}

impl Page {
    #[must_use]
    pub fn error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            description: description.into(),
        }
    }

    #[must_use]
    pub fn unexpected(status: &FlowStatus) -> Self {
        Self::error(
            UNEXPECTED_STATUS,
            format!("Unexpected flow status: {}", status.kind()),
        )
    }

    /// Page name as used by templates and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authorized => "authorized",
            Self::RequestDiscovery => "request_discovery",
            Self::RequestAuthorization => "request_authorization",
            Self::Error { .. } => "error",
        }
    }
}

/// Page rule shared by both redirect endpoints.
#[must_use]
pub fn page_for(status: &FlowStatus) -> Page {
    match classify(status) {
        NextAction::Complete => Page::Authorized,
        NextAction::StartDiscovery => Page::RequestDiscovery,
        NextAction::StartAuthorization | NextAction::Authorize => Page::RequestAuthorization,
        NextAction::Fail | NextAction::SelectOperator => match status {
            FlowStatus::Failed(detail) => {
                Page::error(detail.code(), detail.error_description.clone())
            }
            other => Page::unexpected(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::status::{
        AuthorizationResult, DiscoveryResult, FailureDetail, ParsedIdToken, TokenResponseData,
        TokenResult, UNKNOWN_ERROR,
    };
    use chrono::Utc;
    use serde_json::json;

    fn complete() -> FlowStatus {
        FlowStatus::Complete {
            authorization: Some(AuthorizationResult {
                code: Some("code".to_string()),
                state: Some("state_1".to_string()),
            }),
            token: TokenResult {
                response_code: 200,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                response_data: Some(TokenResponseData {
                    time_received: Utc::now(),
                    access_token: Some("at".to_string()),
                    token_type: Some("Bearer".to_string()),
                    expires_in: Some(3600),
                    id_token: Some("a.b.c".to_string()),
                    parsed_id_token: Some(ParsedIdToken {
                        nonce: Some("nonce_1".to_string()),
                        pcr: Some("pcr".to_string()),
                    }),
                }),
            },
        }
    }

    fn all_statuses() -> Vec<FlowStatus> {
        vec![
            FlowStatus::OperatorSelectionRequired {
                redirect_url: "https://op.example/select".to_string(),
            },
            FlowStatus::DiscoveryRequired,
            FlowStatus::AuthorizationRequired {
                redirect_url: "https://op.example/authorize".to_string(),
                discovery: DiscoveryResult::default(),
            },
            FlowStatus::AuthorizationReady {
                discovery: DiscoveryResult::default(),
            },
            complete(),
            FlowStatus::Failed(FailureDetail::new("invalid_request", "missing operator")),
            FlowStatus::decode(json!({ "status": "bogus" })),
        ]
    }

    #[test]
    fn page_names() {
        let names: Vec<&str> = all_statuses()
            .iter()
            .map(|status| page_for(status).name())
            .collect();
        assert_eq!(
            names,
            vec![
                "error",
                "request_discovery",
                "request_authorization",
                "request_authorization",
                "authorized",
                "error",
                "error",
            ]
        );
    }

    #[test]
    fn mapping_is_deterministic() {
        for status in all_statuses() {
            assert_eq!(page_for(&status), page_for(&status));
            assert_eq!(classify(&status), classify(&status));
        }
    }

    #[test]
    fn error_pages_carry_a_code() {
        for status in all_statuses() {
            if let Page::Error { error, description } = page_for(&status) {
                assert!(!error.is_empty(), "empty code for {status}");
                assert!(!description.is_empty(), "empty description for {status}");
            }
        }
    }

    #[test]
    fn fully_populated_complete_is_authorized() {
        assert_eq!(page_for(&complete()), Page::Authorized);
        assert_eq!(classify(&complete()), NextAction::Complete);
    }

    #[test]
    fn failure_page_keeps_detail() {
        let page = page_for(&FlowStatus::Failed(FailureDetail::new(
            "invalid_request",
            "missing operator",
        )));
        assert_eq!(page, Page::error("invalid_request", "missing operator"));
    }

    #[test]
    fn operator_selection_is_unexpected_on_a_page() {
        let page = page_for(&FlowStatus::OperatorSelectionRequired {
            redirect_url: "https://op.example".to_string(),
        });
        let Page::Error { error, .. } = page else {
            panic!("expected error page");
        };
        assert_eq!(error, UNEXPECTED_STATUS);
    }

    #[test]
    fn decoded_failure_with_blank_code_shows_unknown_error() {
        let status = FlowStatus::decode(json!({
            "status": "failed",
            "error_code": "",
            "error_description": "",
        }));
        let Page::Error { error, .. } = page_for(&status) else {
            panic!("expected error page");
        };
        assert_eq!(error, UNKNOWN_ERROR);
    }
}
