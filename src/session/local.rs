//! Session proxy backed by a [`SessionManager`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use serde_json::Value;

use crate::session::{Session, SessionError, SessionManager, SessionProxy};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CookieChange {
    Set(String),
    Expire,
}

#[derive(Debug, Default)]
struct Binding {
    id: Option<String>,
    cookie: Option<CookieChange>,
}

/// Lazily bound view of one client's session for the duration of a request.
pub struct LocalSessionProxy {
    manager: Arc<dyn SessionManager>,
    binding: Mutex<Binding>,
}

impl LocalSessionProxy {
    /// Bind to `requested_id` if it names a live session.
    pub fn new(manager: Arc<dyn SessionManager>, requested_id: Option<String>) -> Self {
        let id = requested_id.filter(|id| manager.contains(id));
        Self {
            manager,
            binding: Mutex::new(Binding { id, cookie: None }),
        }
    }

    fn binding(&self) -> std::sync::MutexGuard<'_, Binding> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bound_id(&self) -> Option<String> {
        self.binding().id.clone()
    }

    fn bind_new(&self) -> String {
        let id = self.manager.create();
        let mut binding = self.binding();
        binding.id = Some(id.clone());
        binding.cookie = Some(CookieChange::Set(id.clone()));
        id
    }

    fn unbind(&self) -> Option<String> {
        self.binding().id.take()
    }

    /// Run `f` on the bound session, creating one first when `create` is set.
    fn with_session<R>(&self, create: bool, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut f = Some(f);
        let mut out = None;

        if let Some(id) = self.bound_id() {
            let found = self.manager.update(&id, &mut |session: &mut Session| {
                if let Some(f) = f.take() {
                    out = Some(f(session));
                }
            });
            if found {
                return out;
            }
            let mut binding = self.binding();
            if binding.id.as_deref() == Some(id.as_str()) {
                binding.id = None;
            }
        }

        if !create {
            return None;
        }

        let id = self.bind_new();
        self.manager.update(&id, &mut |session: &mut Session| {
            if let Some(f) = f.take() {
                out = Some(f(session));
            }
        });
        out
    }

    fn with_new_or_existing<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R, SessionError> {
        self.with_session(true, f).ok_or(SessionError::Unavailable)
    }
}

impl SessionProxy for LocalSessionProxy {
    fn exists(&self) -> bool {
        self.bound_id().is_some_and(|id| self.manager.contains(&id))
    }

    fn id(&self) -> Result<String, SessionError> {
        self.with_new_or_existing(|session| session.id().to_string())
    }

    fn duration(&self) -> Result<Duration, SessionError> {
        self.with_new_or_existing(|session| session.duration())
    }

    fn last_activity(&self) -> Result<SystemTime, SessionError> {
        self.with_new_or_existing(|session| session.last_activity())
    }

    fn count(&self) -> usize {
        self.with_session(false, |session| session.len()).unwrap_or(0)
    }

    fn value(&self, key: &str) -> Result<Value, SessionError> {
        Ok(self
            .with_session(false, |session| session.get(key).cloned())
            .flatten()
            .unwrap_or(Value::Null))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SessionError> {
        if value.is_null() {
            self.with_session(false, |session| session.remove(key));
            return Ok(());
        }
        self.with_new_or_existing(|session| {
            session.insert(key, value);
        })
    }

    fn delete(&self) {
        if let Some(id) = self.unbind() {
            self.manager.delete(&id);
            self.binding().cookie = Some(CookieChange::Expire);
        }
    }

    fn regenerate(&self) -> Result<(), SessionError> {
        if let Some(id) = self.unbind() {
            self.manager.delete(&id);
        }
        let id = self.bind_new();
        tracing::debug!(session_id = %id, "Session regenerated");
        Ok(())
    }

    fn clear(&self) {
        self.with_session(false, |session| session.clear());
    }

    fn contains_key(&self, key: &str) -> Result<bool, SessionError> {
        Ok(self
            .with_session(false, |session| session.contains_key(key))
            .unwrap_or(false))
    }

    fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self
            .with_session(false, |session| session.get(key).cloned())
            .flatten())
    }

    fn try_remove(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self
            .with_session(false, |session| session.remove(key))
            .flatten())
    }

    fn take_snapshot(&self) -> Result<Vec<(String, Value)>, SessionError> {
        Ok(self
            .with_session(false, |session| session.snapshot())
            .unwrap_or_default())
    }

    fn pending_cookie(&self) -> Option<String> {
        let name = self.manager.cookie_name();
        match self.binding().cookie.as_ref()? {
            CookieChange::Set(id) => Some(format!("{name}={id}; Path=/; HttpOnly; SameSite=Lax")),
            CookieChange::Expire => Some(format!("{name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LocalSessionManager;
    use serde_json::json;

    fn manager() -> Arc<LocalSessionManager> {
        Arc::new(LocalSessionManager::new("sid", Duration::from_secs(60)))
    }

    fn proxy(manager: &Arc<LocalSessionManager>, id: Option<String>) -> LocalSessionProxy {
        LocalSessionProxy::new(manager.clone(), id)
    }

    #[test]
    fn reads_do_not_create_sessions() {
        let manager = manager();
        let proxy = proxy(&manager, None);

        assert!(!proxy.exists());
        assert_eq!(proxy.count(), 0);
        assert!(proxy.is_empty());
        assert_eq!(proxy.value("k").unwrap(), Value::Null);
        assert_eq!(proxy.get("k").unwrap(), None);
        assert!(!proxy.contains_key("k").unwrap());
        assert!(proxy.take_snapshot().unwrap().is_empty());
        proxy.clear();
        proxy.delete();

        assert!(!proxy.exists());
        assert!(manager.is_empty());
        assert!(proxy.pending_cookie().is_none());
    }

    #[test]
    fn first_write_creates_session() {
        let manager = manager();
        let proxy = proxy(&manager, None);

        proxy.set("k", json!("v")).unwrap();
        assert!(proxy.exists());
        assert_eq!(manager.len(), 1);
        assert_eq!(proxy.value("k").unwrap(), json!("v"));
        assert_eq!(proxy.count(), 1);

        let id = proxy.id().unwrap();
        assert_eq!(
            proxy.pending_cookie().unwrap(),
            format!("sid={id}; Path=/; HttpOnly; SameSite=Lax")
        );
    }

    #[test]
    fn next_request_sees_stored_values() {
        let manager = manager();
        let first = proxy(&manager, None);
        first.set("k", json!(42)).unwrap();
        let id = first.id().unwrap();

        let second = proxy(&manager, Some(id.clone()));
        assert!(second.exists());
        assert_eq!(second.get("k").unwrap(), Some(json!(42)));
        assert_eq!(second.id().unwrap(), id);
        assert!(second.pending_cookie().is_none());
    }

    #[test]
    fn regenerate_replaces_id_and_data() {
        let manager = manager();
        let proxy = proxy(&manager, None);
        proxy.set("k", json!("v")).unwrap();
        let old_id = proxy.id().unwrap();

        proxy.regenerate().unwrap();

        assert!(proxy.exists());
        assert_ne!(proxy.id().unwrap(), old_id);
        assert!(!proxy.contains_key("k").unwrap());
        assert!(!manager.contains(&old_id));
    }

    #[test]
    fn delete_unbinds_until_next_write() {
        let manager = manager();
        let proxy = proxy(&manager, None);
        proxy.set("k", json!(1)).unwrap();

        proxy.delete();
        assert!(!proxy.exists());
        assert!(manager.is_empty());
        assert_eq!(
            proxy.pending_cookie().unwrap(),
            "sid=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"
        );

        proxy.set("k", json!(2)).unwrap();
        assert!(proxy.exists());
        assert_eq!(proxy.value("k").unwrap(), json!(2));
    }

    #[test]
    fn unknown_or_expired_ids_are_not_bound() {
        let manager = Arc::new(LocalSessionManager::new("sid", Duration::from_millis(0)));
        let proxy = LocalSessionProxy::new(manager.clone(), Some("forged".into()));
        assert!(!proxy.exists());

        let first = LocalSessionProxy::new(manager.clone(), None);
        first.set("k", json!(1)).unwrap();
        let id = first.id().unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let later = LocalSessionProxy::new(manager.clone(), Some(id));
        assert!(!later.exists());
        assert_eq!(later.get("k").unwrap(), None);
    }

    #[test]
    fn null_removes_and_try_remove_returns_value() {
        let manager = manager();
        let proxy = proxy(&manager, None);
        proxy.set("a", json!(1)).unwrap();
        proxy.set("b", json!(2)).unwrap();

        proxy.set("a", Value::Null).unwrap();
        assert!(!proxy.contains_key("a").unwrap());
        assert_eq!(proxy.try_remove("b").unwrap(), Some(json!(2)));
        assert_eq!(proxy.try_remove("b").unwrap(), None);
        assert!(proxy.is_empty());
    }

    #[test]
    fn snapshot_is_a_copy() {
        let manager = manager();
        let proxy = proxy(&manager, None);
        proxy.set("b", json!(2)).unwrap();
        proxy.set("a", json!(1)).unwrap();

        let snapshot = proxy.take_snapshot().unwrap();
        proxy.set("c", json!(3)).unwrap();

        assert_eq!(
            snapshot,
            vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))]
        );
        assert_eq!(proxy.count(), 3);
    }

    #[test]
    fn concurrent_writers_share_one_session() {
        let manager = manager();
        let id = proxy(&manager, None).id().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    let proxy = LocalSessionProxy::new(manager, Some(id));
                    proxy.set(&format!("k{i}"), json!(i)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let proxy = proxy(&manager, Some(id));
        assert_eq!(proxy.count(), 8);
        assert_eq!(manager.len(), 1);
    }
}
