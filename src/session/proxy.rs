//! Contract shared by the real and the dummy session proxy.

use std::time::{Duration, SystemTime};

use serde_json::Value;
use thiserror::Error;

/// Failure of a session operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Data was requested but the server runs without a session manager.
    #[error("no session manager registered")]
    NoSessionManager,

    /// The store dropped a session right after creating it.
    #[error("session store could not provide a session")]
    Unavailable,
}

/// Per-request view of the client's session.
///
/// `exists` never creates a session. Writes (`set`, `regenerate`) and the identity
/// accessors (`id`, `duration`, `last_activity`) create one on demand. Reads on a
/// client without a session report "nothing there" without creating one.
pub trait SessionProxy: Send + Sync {
    /// True if a live session is bound to this client.
    fn exists(&self) -> bool;

    fn id(&self) -> Result<String, SessionError>;

    /// Idle time after which the session expires.
    fn duration(&self) -> Result<Duration, SessionError>;

    fn last_activity(&self) -> Result<SystemTime, SessionError>;

    fn count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Value stored under `key`, `Value::Null` when absent.
    fn value(&self, key: &str) -> Result<Value, SessionError>;

    /// Store `value` under `key`. Storing `Value::Null` removes the key.
    fn set(&self, key: &str, value: Value) -> Result<(), SessionError>;

    /// End the session, if any.
    fn delete(&self);

    /// Replace the session with a fresh one: new id, no data.
    fn regenerate(&self) -> Result<(), SessionError>;

    /// Remove every key, if a session exists.
    fn clear(&self);

    fn contains_key(&self, key: &str) -> Result<bool, SessionError>;

    fn get(&self, key: &str) -> Result<Option<Value>, SessionError>;

    fn try_remove(&self, key: &str) -> Result<Option<Value>, SessionError>;

    /// Key/value pairs in key order, as of the moment of the call.
    fn take_snapshot(&self) -> Result<Vec<(String, Value)>, SessionError>;

    /// `Set-Cookie` value the listener should emit, if the binding changed.
    fn pending_cookie(&self) -> Option<String> {
        None
    }
}
