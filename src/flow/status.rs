//! Outcome of a backend step.
//!
//! Every backend call settles into exactly one [`FlowStatus`]. Statuses that
//! arrive in serialized form go through [`FlowStatus::decode`], which never
//! fails: a shape that does not match a known variant becomes
//! [`FlowStatus::Failed`] with the `unrecognized_status` code.

use super::error::FlowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub type HeaderPairs = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlowStatus {
    /// The user must pick an operator on the discovery service's page.
    OperatorSelectionRequired { redirect_url: String },
    /// Discovery has to run (again) before anything else can happen.
    DiscoveryRequired,
    /// The operator is known and the user must be sent to `redirect_url`.
    AuthorizationRequired {
        redirect_url: String,
        discovery: DiscoveryResult,
    },
    /// The operator is known; the authorization URL is built on the next step.
    AuthorizationReady { discovery: DiscoveryResult },
    Complete {
        #[serde(default)]
        authorization: Option<AuthorizationResult>,
        token: TokenResult,
    },
    Failed(FailureDetail),
}

impl FlowStatus {
    /// Decode a serialized status. Unknown or malformed shapes become a failure.
    #[must_use]
    pub fn decode(value: Value) -> Self {
        serde_json::from_value(value)
            .unwrap_or_else(|err| FlowError::UnrecognizedStatus(err.to_string()).into())
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OperatorSelectionRequired { .. } => "operator_selection_required",
            Self::DiscoveryRequired => "discovery_required",
            Self::AuthorizationRequired { .. } => "authorization_required",
            Self::AuthorizationReady { .. } => "authorization_ready",
            Self::Complete { .. } => "complete",
            Self::Failed(_) => "failed",
        }
    }
}

impl From<FlowError> for FlowStatus {
    fn from(err: FlowError) -> Self {
        Self::Failed(FailureDetail::from(err))
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Response of the operator discovery service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Served from the session instead of a fresh discovery call.
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub response_code: Option<u16>,
    #[serde(default)]
    pub headers: HeaderPairs,
    #[serde(default)]
    pub payload: Value,
}

impl DiscoveryResult {
    #[must_use]
    pub fn serving_operator(&self) -> Option<&str> {
        self.payload
            .pointer("/response/serving_operator")
            .and_then(Value::as_str)
    }

    /// Find the `href` of the operator link with the given `rel`.
    #[must_use]
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.payload
            .pointer("/response/apis/operatorid/link")
            .and_then(Value::as_array)
            .and_then(|links| find_link(links, rel))
    }

    /// Client id issued by the operator, if the discovery response carries one.
    #[must_use]
    pub fn operator_client_id(&self) -> Option<&str> {
        self.payload
            .pointer("/response/client_id")
            .and_then(Value::as_str)
    }

    /// Client secret issued by the operator, if the discovery response carries one.
    #[must_use]
    pub fn operator_client_secret(&self) -> Option<&str> {
        self.payload
            .pointer("/response/client_secret")
            .and_then(Value::as_str)
    }

    #[must_use]
    pub fn as_cached(&self) -> Self {
        Self {
            cached: true,
            ..self.clone()
        }
    }
}

pub(crate) fn find_link<'a>(links: &'a [Value], rel: &str) -> Option<&'a str> {
    links
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some(rel))
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResult {
    pub response_code: u16,
    #[serde(default)]
    pub headers: HeaderPairs,
    #[serde(default)]
    pub response_data: Option<TokenResponseData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponseData {
    pub time_received: DateTime<Utc>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub parsed_id_token: Option<ParsedIdToken>,
}

/// Claims read from the ID token. The signature is not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIdToken {
    #[serde(default)]
    pub nonce: Option<String>,
    /// Pseudonymous customer reference, carried in the `sub` claim.
    #[serde(default)]
    pub pcr: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    Discovery,
    Authorization,
}

impl FailurePhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Authorization => "authorization",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FailureFields")]
pub struct FailureDetail {
    pub error_code: String,
    pub error_description: String,
    #[serde(default)]
    pub cause: Option<FailureCause>,
}

/// Code shown in place of a blank one.
pub const UNKNOWN_ERROR: &str = "unknown_error";

impl FailureDetail {
    /// Build a failure without a cause. Empty codes are replaced so callers
    /// always have something to show.
    #[must_use]
    pub fn new(error_code: impl Into<String>, error_description: impl Into<String>) -> Self {
        let error_code = error_code.into();
        Self {
            error_code: if error_code.trim().is_empty() {
                UNKNOWN_ERROR.to_string()
            } else {
                error_code
            },
            error_description: error_description.into(),
            cause: None,
        }
    }

    /// Error code to show. Never empty, even for a literally built detail.
    #[must_use]
    pub fn code(&self) -> &str {
        if self.error_code.trim().is_empty() {
            UNKNOWN_ERROR
        } else {
            &self.error_code
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: FailureCause) -> Self {
        self.cause = Some(cause);
        self
    }
}

#[derive(Deserialize)]
struct FailureFields {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    error_description: String,
    #[serde(default)]
    cause: Option<FailureCause>,
}

impl From<FailureFields> for FailureDetail {
    fn from(fields: FailureFields) -> Self {
        let detail = Self::new(fields.error_code, fields.error_description);
        match fields.cause {
            Some(cause) => detail.with_cause(cause),
            None => detail,
        }
    }
}

/// Transport details of the request that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub phase: FailurePhase,
    pub message: String,
    #[serde(default)]
    pub request_uri: Option<String>,
    #[serde(default)]
    pub response_code: Option<u16>,
    #[serde(default)]
    pub contents: Option<String>,
    #[serde(default)]
    pub headers: HeaderPairs,
}
