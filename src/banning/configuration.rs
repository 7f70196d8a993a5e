//! Per-route client banning state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;

/// Length of the request-rate window.
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Offense state of one client on one route.
#[derive(Debug, Clone)]
struct ClientRecord {
    hits: u32,
    window_start: Instant,
    banned_until: Option<Instant>,
    explicit: bool,
}

impl ClientRecord {
    fn new(now: Instant) -> Self {
        Self {
            hits: 0,
            window_start: now,
            banned_until: None,
            explicit: false,
        }
    }

    fn is_banned_at(&self, now: Instant) -> bool {
        self.banned_until.is_some_and(|until| until > now)
    }

    /// Instant after which the record carries no information.
    fn expiry(&self) -> Instant {
        match self.banned_until {
            Some(until) => until,
            None => expiry_after(self.window_start, RATE_WINDOW),
        }
    }
}

/// Result of registering one request from a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Whitelisted,
    /// The client was already banned.
    Banned,
    /// This request pushed the client over the limit.
    NewlyBanned,
}

impl Verdict {
    pub fn is_blocked(self) -> bool {
        matches!(self, Self::Banned | Self::NewlyBanned)
    }
}

/// Snapshot of one active ban, for administration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BanInfo {
    pub client: String,
    pub remaining_secs: u64,
    pub explicit: bool,
}

/// Banning state of one protected route.
///
/// Every operation touches a single map entry, so request handlers and the purge
/// task can run against the same configuration at once.
#[derive(Debug)]
pub struct BanningConfiguration {
    ban_duration: Duration,
    max_requests_per_second: AtomicU32,
    whitelist: ArcSwap<HashSet<String>>,
    clients: DashMap<String, ClientRecord>,
}

impl BanningConfiguration {
    pub fn new(ban_duration: Duration) -> Self {
        Self {
            ban_duration,
            max_requests_per_second: AtomicU32::new(0),
            whitelist: ArcSwap::from_pointee(HashSet::new()),
            clients: DashMap::new(),
        }
    }

    pub fn from_minutes(ban_minutes: u64) -> Self {
        Self::new(Duration::from_secs(ban_minutes.saturating_mul(60)))
    }

    pub fn ban_duration(&self) -> Duration {
        self.ban_duration
    }

    /// Requests per second above which a client is banned; 0 disables the criterion.
    pub fn max_requests_per_second(&self) -> u32 {
        self.max_requests_per_second.load(Ordering::Relaxed)
    }

    pub fn set_max_requests_per_second(&self, limit: u32) {
        self.max_requests_per_second.store(limit, Ordering::Relaxed);
    }

    pub fn set_whitelist<I, S>(&self, clients: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = clients.into_iter().map(Into::into).collect();
        self.whitelist.store(Arc::new(set));
    }

    pub fn is_whitelisted(&self, client: &str) -> bool {
        self.whitelist.load().contains(client)
    }

    pub fn is_banned(&self, client: &str) -> bool {
        self.is_banned_at(client, Instant::now())
    }

    pub fn is_banned_at(&self, client: &str, now: Instant) -> bool {
        self.clients
            .get(client)
            .is_some_and(|record| record.is_banned_at(now))
    }

    /// Ban `client` for `duration`, or for the route's ban duration.
    pub fn ban(&self, client: &str, duration: Option<Duration>, explicit: bool) {
        let now = Instant::now();
        let until = expiry_after(now, duration.unwrap_or(self.ban_duration));
        let mut record = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| ClientRecord::new(now));
        record.banned_until = Some(until);
        record.explicit = explicit;
    }

    /// Lift the ban on `client`. Returns false if it was not banned.
    pub fn unban(&self, client: &str) -> bool {
        let now = Instant::now();
        self.clients
            .remove_if(client, |_, record| record.is_banned_at(now))
            .is_some()
    }

    /// Count one request from `client` against the rate criterion.
    pub fn register_hit(&self, client: &str) -> Verdict {
        self.register_hit_at(client, Instant::now())
    }

    pub fn register_hit_at(&self, client: &str, now: Instant) -> Verdict {
        if self.is_whitelisted(client) {
            return Verdict::Whitelisted;
        }

        let limit = self.max_requests_per_second();
        if limit == 0 {
            return if self.is_banned_at(client, now) {
                Verdict::Banned
            } else {
                Verdict::Allowed
            };
        }

        let mut record = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| ClientRecord::new(now));

        if record.is_banned_at(now) {
            return Verdict::Banned;
        }
        if record.banned_until.is_some() {
            *record = ClientRecord::new(now);
        }
        if now.saturating_duration_since(record.window_start) >= RATE_WINDOW {
            record.window_start = now;
            record.hits = 0;
        }

        record.hits = record.hits.saturating_add(1);
        if record.hits > limit {
            record.banned_until = Some(expiry_after(now, self.ban_duration));
            record.explicit = false;
            return Verdict::NewlyBanned;
        }
        Verdict::Allowed
    }

    /// Currently banned clients.
    pub fn active_bans(&self) -> Vec<BanInfo> {
        let now = Instant::now();
        let mut bans: Vec<BanInfo> = self
            .clients
            .iter()
            .filter_map(|entry| {
                let until = entry.banned_until.filter(|until| *until > now)?;
                Some(BanInfo {
                    client: entry.key().clone(),
                    remaining_secs: until.saturating_duration_since(now).as_secs(),
                    explicit: entry.explicit,
                })
            })
            .collect();
        bans.sort_by(|a, b| a.client.cmp(&b.client));
        bans
    }

    /// Number of tracked clients, banned or not.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn purge(&self) -> usize {
        self.purge_at(Instant::now())
    }

    /// Drop every record whose expiry lies strictly before `now`.
    pub fn purge_at(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, record| record.expiry() >= now);
        before.saturating_sub(self.clients.len())
    }
}

/// `start + duration`, saturating instead of overflowing.
fn expiry_after(start: Instant, duration: Duration) -> Instant {
    start
        .checked_add(duration)
        .or_else(|| start.checked_add(Duration::from_secs(u64::from(u32::MAX))))
        .unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited(limit: u32) -> BanningConfiguration {
        let config = BanningConfiguration::from_minutes(5);
        config.set_max_requests_per_second(limit);
        config
    }

    #[test]
    fn exceeding_the_rate_bans_the_client() {
        let config = limited(2);
        let now = Instant::now();

        assert_eq!(config.register_hit_at("10.0.0.1", now), Verdict::Allowed);
        assert_eq!(config.register_hit_at("10.0.0.1", now), Verdict::Allowed);
        assert_eq!(config.register_hit_at("10.0.0.1", now), Verdict::NewlyBanned);
        assert_eq!(config.register_hit_at("10.0.0.1", now), Verdict::Banned);
        assert!(config.is_banned_at("10.0.0.1", now));
        assert_eq!(config.register_hit_at("10.0.0.2", now), Verdict::Allowed);
    }

    #[test]
    fn window_resets_after_a_second() {
        let config = limited(1);
        let now = Instant::now();

        assert_eq!(config.register_hit_at("c", now), Verdict::Allowed);
        let later = now + Duration::from_millis(1500);
        assert_eq!(config.register_hit_at("c", later), Verdict::Allowed);
    }

    #[test]
    fn ban_ends_after_its_duration() {
        let config = limited(1);
        let now = Instant::now();
        config.register_hit_at("c", now);
        assert!(config.register_hit_at("c", now).is_blocked());

        let after = now + Duration::from_secs(5 * 60 + 1);
        assert!(!config.is_banned_at("c", after));
        assert_eq!(config.register_hit_at("c", after), Verdict::Allowed);
    }

    #[test]
    fn whitelisted_clients_are_never_banned() {
        let config = limited(1);
        config.set_whitelist(["127.0.0.1"]);
        let now = Instant::now();
        for _ in 0..10 {
            assert_eq!(config.register_hit_at("127.0.0.1", now), Verdict::Whitelisted);
        }
        assert!(config.is_empty());
    }

    #[test]
    fn disabled_rate_only_honours_explicit_bans() {
        let config = BanningConfiguration::from_minutes(1);
        for _ in 0..100 {
            assert_eq!(config.register_hit("c"), Verdict::Allowed);
        }
        assert!(config.is_empty());

        config.ban("c", None, true);
        assert_eq!(config.register_hit("c"), Verdict::Banned);
        let bans = config.active_bans();
        assert_eq!(bans.len(), 1);
        assert!(bans[0].explicit);
        assert!(bans[0].remaining_secs <= 60);

        assert!(config.unban("c"));
        assert!(!config.unban("c"));
        assert!(!config.is_banned("c"));
    }

    #[test]
    fn purge_drops_past_entries_and_keeps_future_ones() {
        let config = BanningConfiguration::from_minutes(5);
        config.ban("expired", Some(Duration::from_secs(1)), true);
        config.ban("active", Some(Duration::from_secs(600)), true);

        let now = Instant::now() + Duration::from_secs(2);
        assert_eq!(config.purge_at(now), 1);
        assert!(config.is_banned_at("active", now));
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn purge_drops_stale_counters() {
        let config = limited(10);
        let now = Instant::now();
        config.register_hit_at("c", now);

        assert_eq!(config.purge_at(now), 0);
        assert_eq!(config.purge_at(now + Duration::from_secs(2)), 1);
        assert!(config.is_empty());
    }

    #[test]
    fn concurrent_hits_are_all_counted() {
        let config = Arc::new(limited(1000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let config = config.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        config.register_hit("shared");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(config.clients.get("shared").unwrap().hits, 800);
    }
}
