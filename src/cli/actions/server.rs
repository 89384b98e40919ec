use crate::{
    api::{self, SessionRegistry},
    cli::telemetry,
    flow::{ClientSettings, FlowOrchestrator, SessionConfigStore, backend::http::HttpBackend},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
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

/// Execute the server action.
/// # Errors
/// Returns an error if the HTTP client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let backend = Arc::new(
        HttpBackend::new(Duration::from_secs(args.http_timeout_seconds))
            .context("Failed to build HTTP client")?
            .with_scope(args.scope.as_str())
            .with_acr_values(args.acr_values.as_str()),
    );

    let secure_cookie = args.application_url.starts_with("https://");
    let settings = ClientSettings::new(args.client_id, args.client_secret, args.discovery_url)
        .with_application_url(args.application_url)
        .with_discovery_redirect_url(args.discovery_redirect_url);

    let orchestrator = Arc::new(FlowOrchestrator::new(
        SessionConfigStore::new(settings),
        backend.clone(),
        backend,
    ));
    let sessions = Arc::new(
        SessionRegistry::new(Duration::from_secs(args.session_ttl_seconds))
            .with_secure_cookie(secure_cookie),
    );

    let result = api::new(args.port, orchestrator, sessions).await;
    telemetry::shutdown_tracer();
    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("client_id", args.client_id.clone()),
        ("client_secret", "REDACTED".to_string()),
        ("discovery_url", args.discovery_url.clone()),
        ("application_url", args.application_url.clone()),
        ("discovery_redirect_url", args.discovery_redirect_url.clone()),
        ("scope", args.scope.clone()),
        ("acr_values", args.acr_values.clone()),
        ("session_ttl_seconds", args.session_ttl_seconds.to_string()),
        ("http_timeout_seconds", args.http_timeout_seconds.to_string()),
    ];
    info!("{}", startup_message("Startup configuration", &entries));
}

fn startup_message(title: &str, entries: &[(&str, String)]) -> String {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    message
}

fn banner() -> String {
    let short_hash = short_commit(crate::GIT_COMMIT_HASH);
    BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short_hash),
    )
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}

const BANNER: &str = r"
   .-----.
   | ((o)) |
   |  ___  |   M O B I L E   C O N N E C T {VERSION}
   | |   | |
   | |___| |
   '-------'";
