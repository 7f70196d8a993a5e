//! Session store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;

use crate::config::SessionConfig;
use crate::observability::metrics;
use crate::scheduler::Purgeable;
use crate::session::{LocalSessionProxy, Session, SessionProxy};

/// Backing store the real session proxy talks to.
pub trait SessionManager: Send + Sync {
    /// Name of the cookie carrying the session id.
    fn cookie_name(&self) -> &str;

    /// Create an empty session and return its id.
    fn create(&self) -> String;

    /// True if `id` names a live session. Does not count as activity.
    fn contains(&self, id: &str) -> bool;

    /// Run `f` on the live session `id`, refreshing its activity time.
    /// Returns false if the session is missing or expired.
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Session)) -> bool;

    /// Remove session `id`. Returns false if it did not exist.
    fn delete(&self, id: &str) -> bool;
}

/// In-memory session store with idle expiry.
pub struct LocalSessionManager {
    sessions: DashMap<String, Session>,
    duration: Duration,
    cookie_name: String,
}

impl LocalSessionManager {
    pub fn new(cookie_name: impl Into<String>, duration: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            duration,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.cookie_name.clone(),
            Duration::from_secs(config.duration_secs),
        )
    }

    /// Build the proxy for one request, binding the session named by its cookie.
    pub fn proxy_for(self: &Arc<Self>, headers: &HeaderMap) -> Arc<dyn SessionProxy> {
        let requested = session_cookie(headers, &self.cookie_name);
        Arc::new(LocalSessionProxy::new(self.clone(), requested))
    }

    /// Number of stored sessions, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session idle at `now`.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        let remaining = self.sessions.len();
        metrics::record_active_sessions(remaining);
        before.saturating_sub(remaining)
    }
}

impl SessionManager for LocalSessionManager {
    fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn create(&self) -> String {
        loop {
            let id = new_session_id();
            if let Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                slot.insert(Session::new(id.clone(), self.duration));
                tracing::debug!(session_id = %id, "Session created");
                metrics::record_active_sessions(self.sessions.len());
                return id;
            }
        }
    }

    fn contains(&self, id: &str) -> bool {
        let now = Instant::now();
        self.sessions
            .get(id)
            .is_some_and(|session| !session.is_expired_at(now))
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Session)) -> bool {
        let now = Instant::now();
        match self.sessions.get_mut(id) {
            Some(mut session) if !session.is_expired_at(now) => {
                session.touch();
                f(&mut *session);
                return true;
            }
            Some(_) => {}
            None => return false,
        }

        self.sessions.remove_if(id, |_, session| session.is_expired_at(now));
        tracing::debug!(session_id = %id, "Expired session dropped on access");
        false
    }

    fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            tracing::debug!(session_id = %id, "Session deleted");
            metrics::record_active_sessions(self.sessions.len());
        }
        removed
    }
}

impl Purgeable for LocalSessionManager {
    fn name(&self) -> &str {
        "sessions"
    }

    fn purge(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }
}

/// 256 random bits, hex encoded.
fn new_session_id() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Value of cookie `name` across all `Cookie` headers.
pub(crate) fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
