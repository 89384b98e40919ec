//! Per-session authentication configuration.

use super::session::{SessionHandle, load, store};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Session attribute holding the [`AuthConfig`].
pub const SESSION_KEY: &str = "mobileconnect:config";

pub const STATE_PREFIX: &str = "state_";
pub const NONCE_PREFIX: &str = "nonce_";

pub const DEFAULT_APPLICATION_URL: &str = "http://localhost:8080/mobile_connect";
pub const DEFAULT_DISCOVERY_REDIRECT_URL: &str =
    "http://localhost:8080/mobileconnect/discovery_redirect";

/// Client registration supplied at startup and copied into every session.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    client_id: String,
    client_secret: SecretString,
    application_url: String,
    discovery_url: String,
    discovery_redirect_url: String,
}

impl ClientSettings {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        discovery_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            application_url: DEFAULT_APPLICATION_URL.to_string(),
            discovery_url: discovery_url.into(),
            discovery_redirect_url: DEFAULT_DISCOVERY_REDIRECT_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_application_url(mut self, application_url: impl Into<String>) -> Self {
        self.application_url = application_url.into();
        self
    }

    #[must_use]
    pub fn with_discovery_redirect_url(mut self, discovery_redirect_url: impl Into<String>) -> Self {
        self.discovery_redirect_url = discovery_redirect_url.into();
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn application_url(&self) -> &str {
        &self.application_url
    }

    #[must_use]
    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    #[must_use]
    pub fn discovery_redirect_url(&self) -> &str {
        &self.discovery_redirect_url
    }
}

/// Configuration bound to one session, including its state and nonce.
#[derive(Debug)]
pub struct AuthConfig {
    client_id: String,
    client_secret: SecretString,
    application_url: String,
    discovery_url: String,
    discovery_redirect_url: String,
    authorization_state: String,
    authorization_nonce: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(settings: &ClientSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            application_url: settings.application_url.clone(),
            discovery_url: settings.discovery_url.clone(),
            discovery_redirect_url: settings.discovery_redirect_url.clone(),
            authorization_state: unique_token(STATE_PREFIX),
            authorization_nonce: unique_token(NONCE_PREFIX),
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }

    #[must_use]
    pub fn application_url(&self) -> &str {
        &self.application_url
    }

    #[must_use]
    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    #[must_use]
    pub fn discovery_redirect_url(&self) -> &str {
        &self.discovery_redirect_url
    }

    #[must_use]
    pub fn authorization_state(&self) -> &str {
        &self.authorization_state
    }

    #[must_use]
    pub fn authorization_nonce(&self) -> &str {
        &self.authorization_nonce
    }
}

/// Random token with a readable prefix, e.g. `state_1f0c...`.
#[must_use]
pub fn unique_token(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

/// Hands out the [`AuthConfig`] of a session, creating it on first use.
#[derive(Debug, Clone)]
pub struct SessionConfigStore {
    settings: Arc<ClientSettings>,
}

impl SessionConfigStore {
    #[must_use]
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    /// Return the session's config, creating it at most once per session.
    ///
    /// Creation is serialized on the session's own lock, so concurrent
    /// requests of one session share a single config while other sessions
    /// are never blocked.
    pub async fn get_or_create(&self, session: &dyn SessionHandle) -> Arc<AuthConfig> {
        if let Some(config) = load::<AuthConfig>(session, SESSION_KEY) {
            return config;
        }

        let _guard = session.lock().lock().await;

        // another request may have won the race while we waited
        if let Some(config) = load::<AuthConfig>(session, SESSION_KEY) {
            return config;
        }

        let config = Arc::new(AuthConfig::new(&self.settings));
        store(session, SESSION_KEY, Arc::clone(&config));
        debug!(session = session.id(), "Created authentication config");

        config
    }
}
