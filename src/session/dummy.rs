//! Session proxy used when no session manager is registered.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use serde_json::Value;

use crate::session::{SessionError, SessionProxy};

/// Stateless stand-in shared by every request.
///
/// Reports no session, accepts `delete` and `clear` silently, and fails every data
/// access with [`SessionError::NoSessionManager`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DummySessionProxy;

impl DummySessionProxy {
    /// The process-wide instance.
    pub fn shared() -> Arc<dyn SessionProxy> {
        static INSTANCE: OnceLock<Arc<DummySessionProxy>> = OnceLock::new();
        INSTANCE.get_or_init(|| Arc::new(DummySessionProxy)).clone()
    }
}

impl SessionProxy for DummySessionProxy {
    fn exists(&self) -> bool {
        false
    }

    fn id(&self) -> Result<String, SessionError> {
        Err(SessionError::NoSessionManager)
    }

    fn duration(&self) -> Result<Duration, SessionError> {
        Err(SessionError::NoSessionManager)
    }

    fn last_activity(&self) -> Result<SystemTime, SessionError> {
        Err(SessionError::NoSessionManager)
    }

    fn count(&self) -> usize {
        0
    }

    fn value(&self, _key: &str) -> Result<Value, SessionError> {
        Err(SessionError::NoSessionManager)
    }

    fn set(&self, _key: &str, _value: Value) -> Result<(), SessionError> {
        Err(SessionError::NoSessionManager)
    }

    fn delete(&self) {}

    fn regenerate(&self) -> Result<(), SessionError> {
        Err(SessionError::NoSessionManager)
    }

    fn clear(&self) {}

    fn contains_key(&self, _key: &str) -> Result<bool, SessionError> {
        Err(SessionError::NoSessionManager)
    }

    fn get(&self, _key: &str) -> Result<Option<Value>, SessionError> {
        Err(SessionError::NoSessionManager)
    }

    fn try_remove(&self, _key: &str) -> Result<Option<Value>, SessionError> {
        Err(SessionError::NoSessionManager)
    }

    fn take_snapshot(&self) -> Result<Vec<(String, Value)>, SessionError> {
        Err(SessionError::NoSessionManager)
    }
}
