//! Client registration and flow tuning arguments.

use crate::flow::{
    backend::http::{DEFAULT_ACR_VALUES, DEFAULT_SCOPE},
    config::{DEFAULT_APPLICATION_URL, DEFAULT_DISCOVERY_REDIRECT_URL},
};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_CLIENT_ID: &str = "client-id";
pub const ARG_CLIENT_SECRET: &str = "client-secret";
pub const ARG_DISCOVERY_URL: &str = "discovery-url";
pub const ARG_APPLICATION_URL: &str = "application-url";
pub const ARG_DISCOVERY_REDIRECT_URL: &str = "discovery-redirect-url";
pub const ARG_SCOPE: &str = "scope";
pub const ARG_ACR_VALUES: &str = "acr-values";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_HTTP_TIMEOUT_SECONDS: &str = "http-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub client_id: String,
    pub client_secret: SecretString,
    pub discovery_url: String,
    pub application_url: String,
    pub discovery_redirect_url: String,
    pub scope: String,
    pub acr_values: String,
    pub session_ttl_seconds: u64,
    pub http_timeout_seconds: u64,
}

impl Options {
    /// Parse client arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // clap passes through blank values when env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };
        let required = |id: &str| {
            get_non_empty(id)
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let application_url = required(ARG_APPLICATION_URL)?;
        url::Url::parse(&application_url)
            .map_err(|e| anyhow::anyhow!("invalid --{ARG_APPLICATION_URL}: {e}"))?;
        let discovery_url = required(ARG_DISCOVERY_URL)?;
        url::Url::parse(&discovery_url)
            .map_err(|e| anyhow::anyhow!("invalid --{ARG_DISCOVERY_URL}: {e}"))?;

        Ok(Self {
            client_id: required(ARG_CLIENT_ID)?,
            client_secret: SecretString::from(required(ARG_CLIENT_SECRET)?),
            discovery_url,
            application_url,
            discovery_redirect_url: required(ARG_DISCOVERY_REDIRECT_URL)?,
            scope: get_non_empty(ARG_SCOPE).unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            acr_values: get_non_empty(ARG_ACR_VALUES)
                .unwrap_or_else(|| DEFAULT_ACR_VALUES.to_string()),
            session_ttl_seconds: matches
                .get_one::<u64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(1800),
            http_timeout_seconds: matches
                .get_one::<u64>(ARG_HTTP_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CLIENT_ID)
                .long(ARG_CLIENT_ID)
                .help("Client id registered with the discovery service")
                .env("MOBILECONNECT_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_CLIENT_SECRET)
                .long(ARG_CLIENT_SECRET)
                .help("Client secret registered with the discovery service")
                .env("MOBILECONNECT_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DISCOVERY_URL)
                .long(ARG_DISCOVERY_URL)
                .help("Discovery service endpoint")
                .env("MOBILECONNECT_DISCOVERY_URL"),
        )
        .arg(
            Arg::new(ARG_APPLICATION_URL)
                .long(ARG_APPLICATION_URL)
                .help("Redirect URI the operator returns the user to")
                .long_help(
                    "Redirect URI the operator returns the user to after authorization.\n\nMust point at this service's /mobile_connect endpoint and match the URI registered for the client.",
                )
                .env("MOBILECONNECT_APPLICATION_URL")
                .default_value(DEFAULT_APPLICATION_URL),
        )
        .arg(
            Arg::new(ARG_DISCOVERY_REDIRECT_URL)
                .long(ARG_DISCOVERY_REDIRECT_URL)
                .help("Redirect URI the operator selection page returns the user to")
                .env("MOBILECONNECT_DISCOVERY_REDIRECT_URL")
                .default_value(DEFAULT_DISCOVERY_REDIRECT_URL),
        )
        .arg(
            Arg::new(ARG_SCOPE)
                .long(ARG_SCOPE)
                .help("Scope requested from the operator")
                .env("MOBILECONNECT_SCOPE")
                .default_value(DEFAULT_SCOPE),
        )
        .arg(
            Arg::new(ARG_ACR_VALUES)
                .long(ARG_ACR_VALUES)
                .help("Authentication context class requested from the operator")
                .env("MOBILECONNECT_ACR_VALUES")
                .default_value(DEFAULT_ACR_VALUES),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Idle session TTL in seconds")
                .env("MOBILECONNECT_SESSION_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_HTTP_TIMEOUT_SECONDS)
                .long(ARG_HTTP_TIMEOUT_SECONDS)
                .help("Timeout for discovery and token requests in seconds")
                .env("MOBILECONNECT_HTTP_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
