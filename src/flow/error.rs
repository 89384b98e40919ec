use super::status::{FailureCause, FailureDetail, FailurePhase, HeaderPairs};
use thiserror::Error;

/// What was on the wire when a backend request failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transport {
    pub request_uri: Option<String>,
    pub response_code: Option<u16>,
    pub contents: Option<String>,
    pub headers: HeaderPairs,
}

impl Transport {
    #[must_use]
    pub fn for_uri(uri: impl Into<String>) -> Self {
        Self {
            request_uri: Some(uri.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("discovery failed: {message}")]
    Discovery { message: String, transport: Transport },

    #[error("authorization failed: {message}")]
    Authorization { message: String, transport: Transport },

    /// The operator or the discovery service answered with an OAuth error.
    #[error("{error}: {description}")]
    Rejected { error: String, description: String },

    /// A backend endpoint answered with an OAuth error body.
    #[error("{error}: {description}")]
    Refused {
        phase: FailurePhase,
        error: String,
        description: String,
        transport: Transport,
    },

    #[error("unrecognized status: {0}")]
    UnrecognizedStatus(String),
}

impl FlowError {
    pub fn discovery(message: impl Into<String>, transport: Transport) -> Self {
        Self::Discovery {
            message: message.into(),
            transport,
        }
    }

    pub fn authorization(message: impl Into<String>, transport: Transport) -> Self {
        Self::Authorization {
            message: message.into(),
            transport,
        }
    }

    pub fn rejected(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Rejected {
            error: error.into(),
            description: description.into(),
        }
    }

    pub fn refused(
        phase: FailurePhase,
        error: impl Into<String>,
        description: impl Into<String>,
        transport: Transport,
    ) -> Self {
        Self::Refused {
            phase,
            error: error.into(),
            description: description.into(),
            transport,
        }
    }

    /// Stable error code shown to the user.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Discovery { .. } => "discovery_failed",
            Self::Authorization { .. } => "authorization_failed",
            Self::Rejected { error, .. } | Self::Refused { error, .. } => error,
            Self::UnrecognizedStatus(_) => "unrecognized_status",
        }
    }
}

impl From<FlowError> for FailureDetail {
    fn from(err: FlowError) -> Self {
        let code = err.code().to_string();
        match err {
            FlowError::Discovery { message, transport } => {
                Self::new(code, "Failed to obtain operator details")
                    .with_cause(cause(FailurePhase::Discovery, message, transport))
            }
            FlowError::Authorization { message, transport } => {
                Self::new(code, "Failed to obtain a token from the operator")
                    .with_cause(cause(FailurePhase::Authorization, message, transport))
            }
            FlowError::Rejected { description, .. } => Self::new(code, description),
            FlowError::Refused {
                phase,
                error,
                description,
                transport,
            } => {
                let message = format!("{error}: {description}");
                Self::new(code, description).with_cause(cause(phase, message, transport))
            }
            FlowError::UnrecognizedStatus(reason) => {
                Self::new(code, format!("Backend returned an unrecognized status ({reason})"))
            }
        }
    }
}

fn cause(phase: FailurePhase, message: String, transport: Transport) -> FailureCause {
    FailureCause {
        phase,
        message,
        request_uri: transport.request_uri,
        response_code: transport.response_code,
        contents: transport.contents,
        headers: transport.headers,
    }
}
