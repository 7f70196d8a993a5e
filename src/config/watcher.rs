//! Configuration file watcher for hot reload.
//!
//! # Data Flow
//! ```text
//! notify event ─▶ debounce (quiet period) ─▶ load + validate ─▶ drop if unchanged ─▶ server
//! ```
//!
//! Editors usually emit several modify events per save; they collapse into one reload.

use std::path::PathBuf;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time;

use crate::config::loader::load_config;
use crate::config::schema::ServerConfig;

/// Quiet period after the last file event before the file is read.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Turns changes of the configuration file into validated, de-duplicated updates.
pub struct ConfigWatcher {
    path: PathBuf,
    current: ServerConfig,
    debounce: Duration,
    updates: mpsc::UnboundedSender<ServerConfig>,
}

impl ConfigWatcher {
    /// Watch `path`, starting from the configuration the server was built with.
    ///
    /// The receiver yields only configurations that load, validate and differ from the
    /// last one delivered.
    pub fn new(
        path: impl Into<PathBuf>,
        current: ServerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ServerConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.into(),
                current,
                debounce: DEFAULT_DEBOUNCE,
                updates,
            },
            rx,
        )
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching on the current tokio runtime. Dropping the returned watcher
    /// stops the reload task.
    pub fn spawn(self) -> Result<RecommendedWatcher, notify::Error> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let _ = events_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(
            path = %self.path.display(),
            debounce_ms = self.debounce.as_millis() as u64,
            "Config watcher started"
        );
        tokio::spawn(self.forward(events_rx));
        Ok(watcher)
    }

    async fn forward(mut self, mut events: mpsc::UnboundedReceiver<()>) {
        while events.recv().await.is_some() {
            loop {
                match time::timeout(self.debounce, events.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) | Err(_) => break,
                }
            }

            self.reload();
            if self.updates.is_closed() {
                break;
            }
        }
        tracing::debug!(path = %self.path.display(), "Config watcher stopped");
    }

    fn reload(&mut self) {
        match load_config(&self.path) {
            Ok(next) if next == self.current => {
                tracing::debug!(path = %self.path.display(), "Config file touched without changes");
            }
            Ok(next) => {
                tracing::info!(path = %self.path.display(), "Configuration file changed");
                self.current = next.clone();
                if self.updates.send(next).is_err() {
                    tracing::debug!("No receiver for configuration updates");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config; keeping current configuration");
            }
        }
    }
}
