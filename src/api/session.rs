//! Cookie-backed in-memory sessions.
//!
//! The browser only ever sees a random token. Sessions idle for longer than the
//! TTL are dropped together with everything the flow stored in them.

use crate::flow::session::MemorySession;
use anyhow::{Context, Result};
use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::debug;

pub const SESSION_COOKIE_NAME: &str = "mobileconnect_session";

#[derive(Debug)]
struct Entry {
    session: Arc<MemorySession>,
    last_seen: Instant,
}

/// Session bound to the current request, plus the cookie to set when it is new.
#[derive(Debug)]
pub struct ResolvedSession {
    pub session: Arc<MemorySession>,
    pub set_cookie: Option<HeaderValue>,
}

#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    secure_cookie: bool,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            secure_cookie: false,
        }
    }

    /// Only mark cookies secure when the application is served over HTTPS.
    #[must_use]
    pub fn with_secure_cookie(mut self, secure_cookie: bool) -> Self {
        self.secure_cookie = secure_cookie;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Find the session named by the request cookie or start a new one.
    ///
    /// # Errors
    /// Returns an error if a session token cannot be generated.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<ResolvedSession> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;

        if let Some(token) = extract_session_token(headers)
            && let Some(entry) = sessions.get_mut(&token)
            && now.duration_since(entry.last_seen) < self.ttl
        {
            entry.last_seen = now;
            return Ok(ResolvedSession {
                session: Arc::clone(&entry.session),
                set_cookie: None,
            });
        }

        let ttl = self.ttl;
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) < ttl);

        let token = generate_session_token()?;
        let session = Arc::new(MemorySession::new(token.clone()));
        sessions.insert(
            token.clone(),
            Entry {
                session: Arc::clone(&session),
                last_seen: now,
            },
        );
        debug!(active = sessions.len(), "Started new session");

        let set_cookie = self
            .session_cookie(&token)
            .context("failed to build session cookie")?;
        Ok(ResolvedSession {
            session,
            set_cookie: Some(set_cookie),
        })
    }

    /// Drop idle sessions, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) < ttl);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn session_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        let ttl_seconds = self.ttl.as_secs();
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}
