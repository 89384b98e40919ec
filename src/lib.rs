//! # Mobile Connect flow service
//!
//! `mobileconnect` drives the browser side of a Mobile Connect login: the user
//! is first sent to an identity operator discovery service, then to the chosen
//! operator's authorization endpoint, and finally returned with a code that is
//! exchanged for tokens.
//!
//! The service exposes four entry points. Two of them are called by the page
//! script over AJAX and answer with JSON that tells the script where to go next.
//! The other two are browser redirect targets and answer with a small page that
//! hands control back to the opener window.
//!
//! ## Layout
//!
//! - [`flow`]: per-session configuration, the status model, and the orchestrator
//!   that ties a backend call to a rendered outcome.
//! - [`api`]: the `axum` router, cookie sessions and HTML pages.
//! - [`cli`]: command line parsing, telemetry and the server action.

pub mod api;
pub mod cli;
pub mod flow;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
