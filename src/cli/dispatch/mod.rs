//! Map validated command line arguments to an action.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::client;
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let client_opts = client::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        client_id: client_opts.client_id,
        client_secret: client_opts.client_secret,
        discovery_url: client_opts.discovery_url,
        application_url: client_opts.application_url,
        discovery_redirect_url: client_opts.discovery_redirect_url,
        scope: client_opts.scope,
        acr_values: client_opts.acr_values,
        session_ttl_seconds: client_opts.session_ttl_seconds,
        http_timeout_seconds: client_opts.http_timeout_seconds,
    }))
}
