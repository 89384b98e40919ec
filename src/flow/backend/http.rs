//! Discovery and authorization over HTTP.
//!
//! The discovery response is kept in the session so the authorization steps
//! can find the operator's endpoints without another discovery round trip.
//! ID tokens are decoded for their claims only; the signature is not checked.

use super::{AuthorizationBackend, BackendFuture, DiscoveryBackend, FlowRequest};
use crate::flow::{
    config::AuthConfig,
    error::{FlowError, Transport},
    session::{load, store},
    status::{
        AuthorizationResult, DiscoveryResult, FailurePhase, FlowStatus, HeaderPairs,
        ParsedIdToken, TokenResponseData, TokenResult, find_link,
    },
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use reqwest::{
    Client,
    header::{ACCEPT, HeaderMap},
};
use serde::Deserialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::debug;
use url::Url;

/// Session attribute holding the last [`DiscoveryResult`].
pub const DISCOVERY_SESSION_KEY: &str = "mobileconnect:discovery";

pub const DEFAULT_SCOPE: &str = "openid";
pub const DEFAULT_ACR_VALUES: &str = "2";

const OPERATOR_SELECTION_REL: &str = "operatorSelection";
const AUTHORIZATION_REL: &str = "authorization";
const TOKEN_REL: &str = "token";

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    scope: String,
    acr_values: String,
}

#[derive(Debug, Default)]
struct Selection<'a> {
    msisdn: Option<&'a str>,
    mcc: Option<&'a str>,
    mnc: Option<&'a str>,
    subscriber_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    nonce: Option<String>,
    sub: Option<String>,
}

impl HttpBackend {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            scope: DEFAULT_SCOPE.to_string(),
            acr_values: DEFAULT_ACR_VALUES.to_string(),
        })
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    #[must_use]
    pub fn with_acr_values(mut self, acr_values: impl Into<String>) -> Self {
        self.acr_values = acr_values.into();
        self
    }

    async fn discover(
        &self,
        config: &AuthConfig,
        selection: &Selection<'_>,
        request: &FlowRequest,
    ) -> Result<FlowStatus, FlowError> {
        let mut url = Url::parse(config.discovery_url()).map_err(|err| {
            FlowError::discovery(
                format!("invalid discovery URL: {err}"),
                Transport::for_uri(config.discovery_url()),
            )
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("Redirect_URL", config.discovery_redirect_url());
            if let Some(msisdn) = selection.msisdn {
                pairs.append_pair("MSISDN", msisdn);
            }
            if let (Some(mcc), Some(mnc)) = (selection.mcc, selection.mnc) {
                pairs.append_pair("Selected-MCC", mcc);
                pairs.append_pair("Selected-MNC", mnc);
            }
        }
        let uri = url.to_string();
        debug!(url = %uri, "Calling discovery service");

        let mut builder = self
            .client
            .get(url)
            .basic_auth(config.client_id(), Some(config.client_secret()))
            .header(ACCEPT, "application/json");
        if let Some(source_ip) = request.header("x-source-ip") {
            builder = builder.header("X-Source-IP", source_ip);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| FlowError::discovery(err.to_string(), Transport::for_uri(&uri)))?;
        let status = response.status();
        let headers = header_pairs(response.headers());
        let body = response
            .text()
            .await
            .map_err(|err| FlowError::discovery(err.to_string(), Transport::for_uri(&uri)))?;

        let transport = Transport {
            request_uri: Some(uri),
            response_code: Some(status.as_u16()),
            contents: Some(body.clone()),
            headers: headers.clone(),
        };

        let payload: Value = match serde_json::from_str(&body) {
            Ok(payload) => payload,
            Err(err) => {
                return Err(FlowError::discovery(
                    format!("invalid discovery response: {err}"),
                    transport,
                ));
            }
        };

        if let Some(error) = payload.get("error").and_then(Value::as_str) {
            let description = payload
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(FlowError::refused(
                FailurePhase::Discovery,
                error,
                description,
                transport,
            ));
        }
        if !status.is_success() {
            return Err(FlowError::discovery(
                format!("discovery service returned {status}"),
                transport,
            ));
        }

        if let Some(href) = payload
            .get("links")
            .and_then(Value::as_array)
            .and_then(|links| find_link(links, OPERATOR_SELECTION_REL))
        {
            return Ok(FlowStatus::OperatorSelectionRequired {
                redirect_url: href.to_string(),
            });
        }

        let mut discovery = DiscoveryResult {
            cached: false,
            response_code: Some(status.as_u16()),
            headers,
            payload,
        };
        if discovery.link(AUTHORIZATION_REL).is_none() {
            return Err(FlowError::discovery(
                "discovery response has no operator endpoints",
                transport,
            ));
        }
        if let (Some(subscriber_id), Some(object)) =
            (selection.subscriber_id, discovery.payload.as_object_mut())
        {
            object
                .entry("subscriber_id")
                .or_insert_with(|| Value::String(subscriber_id.to_string()));
        }

        store(
            request.session(),
            DISCOVERY_SESSION_KEY,
            Arc::new(discovery.clone()),
        );
        Ok(FlowStatus::AuthorizationReady { discovery })
    }

    async fn discovery_start(
        &self,
        config: &AuthConfig,
        request: &FlowRequest,
    ) -> Result<FlowStatus, FlowError> {
        if let Some(cached) = load::<DiscoveryResult>(request.session(), DISCOVERY_SESSION_KEY) {
            return Ok(FlowStatus::AuthorizationReady {
                discovery: cached.as_cached(),
            });
        }

        let selection = Selection {
            msisdn: request.param("msisdn"),
            mcc: request.param("mcc"),
            mnc: request.param("mnc"),
            subscriber_id: None,
        };
        self.discover(config, &selection, request).await
    }

    async fn discovery_redirect(
        &self,
        config: &AuthConfig,
        request: &FlowRequest,
    ) -> Result<FlowStatus, FlowError> {
        if let Some(error) = request.param("error") {
            return Err(FlowError::rejected(
                error,
                request
                    .param("error_description")
                    .unwrap_or("operator selection failed"),
            ));
        }

        let Some(mcc_mnc) = request.param("mcc_mnc") else {
            return Ok(FlowStatus::DiscoveryRequired);
        };
        let Some((mcc, mnc)) = mcc_mnc.split_once('_') else {
            return Err(FlowError::rejected(
                "invalid_request",
                format!("malformed mcc_mnc: {mcc_mnc}"),
            ));
        };

        // a new selection replaces whatever operator was found before
        request.session().remove_attribute(DISCOVERY_SESSION_KEY);

        let selection = Selection {
            msisdn: None,
            mcc: Some(mcc),
            mnc: Some(mnc),
            subscriber_id: request.param("subscriber_id"),
        };
        self.discover(config, &selection, request).await
    }

    fn authorization_url(
        &self,
        config: &AuthConfig,
        discovery: &DiscoveryResult,
    ) -> Result<String, FlowError> {
        let endpoint = discovery.link(AUTHORIZATION_REL).ok_or_else(|| {
            FlowError::authorization(
                "discovery response has no authorization endpoint",
                Transport::default(),
            )
        })?;
        let mut url = Url::parse(endpoint).map_err(|err| {
            FlowError::authorization(
                format!("invalid authorization endpoint: {err}"),
                Transport::for_uri(endpoint),
            )
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair(
                    "client_id",
                    discovery
                        .operator_client_id()
                        .unwrap_or(config.client_id()),
                )
                .append_pair("redirect_uri", config.application_url())
                .append_pair("response_type", "code")
                .append_pair("scope", &self.scope)
                .append_pair("acr_values", &self.acr_values)
                .append_pair("state", config.authorization_state())
                .append_pair("nonce", config.authorization_nonce());
            if let Some(subscriber_id) = discovery.payload.get("subscriber_id").and_then(Value::as_str)
            {
                pairs.append_pair("login_hint", &format!("ENCR_MSISDN:{subscriber_id}"));
            }
        }
        Ok(url.to_string())
    }

    async fn authorization_start(
        &self,
        config: &AuthConfig,
        request: &FlowRequest,
    ) -> Result<FlowStatus, FlowError> {
        let Some(discovery) = load::<DiscoveryResult>(request.session(), DISCOVERY_SESSION_KEY)
        else {
            return Ok(FlowStatus::DiscoveryRequired);
        };

        let redirect_url = self.authorization_url(config, &discovery)?;
        Ok(FlowStatus::AuthorizationRequired {
            redirect_url,
            discovery: discovery.as_cached(),
        })
    }

    async fn authorization_redirect(
        &self,
        config: &AuthConfig,
        request: &FlowRequest,
    ) -> Result<FlowStatus, FlowError> {
        if let Some(error) = request.param("error") {
            return Err(FlowError::rejected(
                error,
                request
                    .param("error_description")
                    .unwrap_or("authorization was not granted"),
            ));
        }

        let Some(discovery) = load::<DiscoveryResult>(request.session(), DISCOVERY_SESSION_KEY)
        else {
            return Ok(FlowStatus::DiscoveryRequired);
        };

        let authorization = AuthorizationResult {
            code: request.param("code").map(str::to_string),
            state: request.param("state").map(str::to_string),
        };
        if authorization.state.as_deref() != Some(config.authorization_state()) {
            return Err(FlowError::rejected(
                "invalid_state",
                "state returned by the operator does not match this session",
            ));
        }
        let Some(code) = authorization.code.as_deref() else {
            return Err(FlowError::rejected(
                "invalid_request",
                "authorization code is missing",
            ));
        };

        let token = self.exchange_code(config, &discovery, code).await?;

        let nonce = token
            .response_data
            .as_ref()
            .and_then(|data| data.parsed_id_token.as_ref())
            .map(|parsed| parsed.nonce.as_deref());
        if let Some(nonce) = nonce
            && nonce != Some(config.authorization_nonce())
        {
            return Err(FlowError::rejected(
                "invalid_nonce",
                "ID token nonce does not match this session",
            ));
        }

        Ok(FlowStatus::Complete {
            authorization: Some(authorization),
            token,
        })
    }

    async fn exchange_code(
        &self,
        config: &AuthConfig,
        discovery: &DiscoveryResult,
        code: &str,
    ) -> Result<TokenResult, FlowError> {
        let endpoint = discovery.link(TOKEN_REL).ok_or_else(|| {
            FlowError::authorization(
                "discovery response has no token endpoint",
                Transport::default(),
            )
        })?;
        let client_id = discovery
            .operator_client_id()
            .unwrap_or(config.client_id());
        let client_secret = discovery
            .operator_client_secret()
            .unwrap_or(config.client_secret());
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.application_url()),
        ];

        debug!(url = %endpoint, "Exchanging authorization code");

        let response = self
            .client
            .post(endpoint)
            .basic_auth(client_id, Some(client_secret))
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|err| FlowError::authorization(err.to_string(), Transport::for_uri(endpoint)))?;
        let time_received = Utc::now();
        let status = response.status();
        let headers = header_pairs(response.headers());
        let body = response
            .text()
            .await
            .map_err(|err| FlowError::authorization(err.to_string(), Transport::for_uri(endpoint)))?;

        let transport = Transport {
            request_uri: Some(endpoint.to_string()),
            response_code: Some(status.as_u16()),
            contents: Some(body.clone()),
            headers: headers.clone(),
        };

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|value| value.get("error").and_then(Value::as_str).map(str::to_string))
                .map_or_else(
                    || format!("token endpoint returned {status}"),
                    |error| format!("token endpoint returned {status}: {error}"),
                );
            return Err(FlowError::authorization(message, transport));
        }

        let token: TokenBody = match serde_json::from_str(&body) {
            Ok(token) => token,
            Err(err) => {
                return Err(FlowError::authorization(
                    format!("invalid token response: {err}"),
                    transport,
                ));
            }
        };

        let parsed_id_token = match token.id_token.as_deref().map(parse_id_token).transpose() {
            Ok(parsed) => parsed,
            Err(reason) => return Err(FlowError::authorization(reason, transport)),
        };

        Ok(TokenResult {
            response_code: status.as_u16(),
            headers,
            response_data: Some(TokenResponseData {
                time_received,
                access_token: token.access_token,
                token_type: token.token_type,
                expires_in: token.expires_in,
                id_token: token.id_token,
                parsed_id_token,
            }),
        })
    }
}

impl DiscoveryBackend for HttpBackend {
    fn begin_discovery<'a>(
        &'a self,
        config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a> {
        Box::pin(self.discovery_start(config, request))
    }

    fn complete_discovery_redirect<'a>(
        &'a self,
        config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a> {
        Box::pin(self.discovery_redirect(config, request))
    }
}

impl AuthorizationBackend for HttpBackend {
    fn begin_authorization<'a>(
        &'a self,
        config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a> {
        Box::pin(self.authorization_start(config, request))
    }

    fn complete_authorization_redirect<'a>(
        &'a self,
        config: &'a AuthConfig,
        request: &'a FlowRequest,
    ) -> BackendFuture<'a> {
        Box::pin(self.authorization_redirect(config, request))
    }
}

fn header_pairs(headers: &HeaderMap) -> HeaderPairs {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}

/// Read the claims of a compact JWT without checking its signature.
fn parse_id_token(token: &str) -> Result<ParsedIdToken, String> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err("ID token is not a compact JWT".to_string()),
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| format!("ID token payload is not base64url: {err}"))?;
    let claims: IdTokenClaims = serde_json::from_slice(&bytes)
        .map_err(|err| format!("ID token payload is not valid JSON: {err}"))?;
    Ok(ParsedIdToken {
        nonce: claims.nonce,
        pcr: claims.sub,
    })
}
