//! Process-wide map from route id to banning configuration.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::banning::BanningConfiguration;
use crate::scheduler::Purgeable;

/// Owns every per-route [`BanningConfiguration`].
///
/// Built once by the server and handed to whoever needs it.
#[derive(Debug, Default)]
pub struct BanningRegistry {
    routes: DashMap<String, Arc<BanningConfiguration>>,
}

impl BanningRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for `route_id`, created with `ban_minutes` if missing.
    ///
    /// Concurrent callers for the same route all get the same instance. An existing
    /// configuration keeps its original ban duration.
    pub fn get_or_create(&self, route_id: &str, ban_minutes: u64) -> Arc<BanningConfiguration> {
        self.get_or_create_with(route_id, || BanningConfiguration::from_minutes(ban_minutes))
    }

    /// Like [`get_or_create`](Self::get_or_create), building a missing configuration with
    /// `create`. The new configuration is published only once `create` returns.
    pub fn get_or_create_with<F>(&self, route_id: &str, create: F) -> Arc<BanningConfiguration>
    where
        F: FnOnce() -> BanningConfiguration,
    {
        if let Some(existing) = self.routes.get(route_id) {
            return existing.clone();
        }
        self.routes
            .entry(route_id.to_string())
            .or_insert_with(|| {
                let config = create();
                tracing::debug!(
                    route_id,
                    ban_secs = config.ban_duration().as_secs(),
                    "Banning configuration created"
                );
                Arc::new(config)
            })
            .clone()
    }

    pub fn try_get(&self, route_id: &str) -> Option<Arc<BanningConfiguration>> {
        self.routes.get(route_id).map(|entry| entry.clone())
    }

    pub fn try_remove(&self, route_id: &str) -> Option<Arc<BanningConfiguration>> {
        let removed = self.routes.remove(route_id).map(|(_, config)| config);
        if removed.is_some() {
            tracing::info!(route_id, "Banning configuration removed");
        }
        removed
    }

    /// Registered route ids, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.routes.iter().map(|e| e.key().clone()).collect();
        routes.sort();
        routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Purge every route. A route whose purge panics is logged and skipped.
    pub fn purge_at(&self, now: Instant) -> usize {
        let routes: Vec<(String, Arc<BanningConfiguration>)> = self
            .routes
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        purge_each(
            routes
                .into_iter()
                .map(|(route_id, config)| (route_id, move || config.purge_at(now))),
        )
    }
}

/// Run each route's purge, isolating panics to the route that raised them.
fn purge_each<I, F>(routes: I) -> usize
where
    I: IntoIterator<Item = (String, F)>,
    F: FnOnce() -> usize,
{
    let mut removed = 0;
    for (route_id, purge) in routes {
        match catch_unwind(AssertUnwindSafe(purge)) {
            Ok(count) => removed += count,
            Err(_) => {
                tracing::error!(route_id = %route_id, "Banning purge failed for route");
            }
        }
    }
    removed
}

impl Purgeable for BanningRegistry {
    fn name(&self) -> &str {
        "banning"
    }

    fn purge(&self) -> usize {
        self.purge_at(Instant::now())
    }
}
