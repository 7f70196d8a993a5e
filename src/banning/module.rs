//! Client banning as a participant of the module chain.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use axum::http::StatusCode;
use futures_util::future;

use crate::banning::{BanningConfiguration, BanningRegistry, Verdict};
use crate::config::BanningConfig;
use crate::http::RequestContext;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::pipeline::{ContainerLink, HandlerFuture, Module};

/// Rejects banned clients with `403 Forbidden` and counts requests of everyone else.
///
/// The module's rate limit and whitelist are pushed onto the route's configuration
/// whenever it sees a configuration instance for the first time, including one that
/// was created elsewhere before the module started.
pub struct BanningModule {
    base_route: String,
    route_id: String,
    ban_minutes: u64,
    max_requests_per_second: u32,
    whitelist: Vec<String>,
    registry: Arc<BanningRegistry>,
    applied: ArcSwapOption<BanningConfiguration>,
    link: ContainerLink,
}

impl BanningModule {
    pub fn new(
        base_route: impl Into<String>,
        route_id: impl Into<String>,
        ban_minutes: u64,
        registry: Arc<BanningRegistry>,
    ) -> Self {
        Self {
            base_route: base_route.into(),
            route_id: route_id.into(),
            ban_minutes,
            max_requests_per_second: 0,
            whitelist: Vec::new(),
            registry,
            applied: ArcSwapOption::empty(),
            link: ContainerLink::new(),
        }
    }

    pub fn from_config(config: &BanningConfig, registry: Arc<BanningRegistry>) -> Self {
        Self::new(
            config.base_route.clone(),
            config.route_id.clone(),
            config.ban_minutes,
            registry,
        )
        .with_max_requests_per_second(config.max_requests_per_second)
        .with_whitelist(config.whitelist.clone())
    }

    pub fn with_max_requests_per_second(mut self, limit: u32) -> Self {
        self.max_requests_per_second = limit;
        self
    }

    pub fn with_whitelist(mut self, clients: Vec<String>) -> Self {
        self.whitelist = clients;
        self
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    /// The route's configuration with this module's settings applied.
    ///
    /// Recreated, fully configured, if an administrator removed it.
    pub fn configuration(&self) -> Arc<BanningConfiguration> {
        let config = self
            .registry
            .get_or_create_with(&self.route_id, || self.build_configuration());

        let applied = self.applied.load();
        if !Option::as_ref(&applied).is_some_and(|seen| Arc::ptr_eq(seen, &config)) {
            self.apply_settings(&config);
            self.applied.store(Some(config.clone()));
        }
        config
    }

    fn build_configuration(&self) -> BanningConfiguration {
        let config = BanningConfiguration::from_minutes(self.ban_minutes);
        self.apply_settings(&config);
        config
    }

    fn apply_settings(&self, config: &BanningConfiguration) {
        config.set_max_requests_per_second(self.max_requests_per_second);
        config.set_whitelist(self.whitelist.iter().cloned());
    }
}

impl Module for BanningModule {
    fn base_route(&self) -> &str {
        &self.base_route
    }

    fn link(&self) -> &ContainerLink {
        &self.link
    }

    fn start(&self, _shutdown: ShutdownSignal) -> HandlerFuture<'_> {
        let config = self.configuration();
        tracing::debug!(
            route_id = %self.route_id,
            max_requests_per_second = config.max_requests_per_second(),
            ban_secs = config.ban_duration().as_secs(),
            "Banning route ready"
        );
        Box::pin(future::ready(Ok(())))
    }

    fn handle<'a>(&'a self, ctx: &'a mut RequestContext) -> HandlerFuture<'a> {
        let client = ctx.remote_addr().ip().to_string();
        let verdict = self.configuration().register_hit(&client);

        match verdict {
            Verdict::NewlyBanned => {
                tracing::warn!(
                    request_id = %ctx.id(),
                    route_id = %self.route_id,
                    client = %client,
                    "Client exceeded request rate; banned"
                );
                metrics::record_ban(&self.route_id);
                ctx.respond(StatusCode::FORBIDDEN, "Forbidden");
            }
            Verdict::Banned => {
                tracing::debug!(request_id = %ctx.id(), client = %client, "Banned client rejected");
                ctx.respond(StatusCode::FORBIDDEN, "Forbidden");
            }
            Verdict::Allowed | Verdict::Whitelisted => {}
        }
        Box::pin(future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ModuleRegistry;
    use crate::routing::RouteTable;
    use axum::http::Method;
    use std::net::SocketAddr;

    fn chain(limit: u32) -> (Arc<ModuleRegistry>, Arc<BanningRegistry>) {
        let banning = Arc::new(BanningRegistry::new());
        let registry = ModuleRegistry::new();
        registry
            .add(
                "banning",
                Arc::new(
                    BanningModule::new("/", "api", 5, banning.clone())
                        .with_max_requests_per_second(limit)
                        .with_whitelist(vec!["10.0.0.9".to_string()]),
                ),
            )
            .unwrap();
        let api = RouteTable::new("/")
            .route(Method::GET, "/ping", |ctx: &mut RequestContext| {
                ctx.respond(StatusCode::OK, "pong");
                Ok(())
            })
            .unwrap();
        registry.add("api", Arc::new(api)).unwrap();
        (registry, banning)
    }

    fn request(addr: &str) -> RequestContext {
        let addr: SocketAddr = addr.parse().unwrap();
        RequestContext::builder(Method::GET, "/ping")
            .remote_addr(addr)
            .build()
    }

    #[tokio::test]
    async fn explicitly_banned_client_is_forbidden() {
        let (registry, banning) = chain(0);
        banning.get_or_create("api", 5).ban("10.0.0.1", None, true);

        let mut ctx = request("10.0.0.1:1234");
        registry.dispatch_request(&mut ctx).await.unwrap();
        assert_eq!(ctx.status(), StatusCode::FORBIDDEN);

        let mut other = request("10.0.0.2:1234");
        registry.dispatch_request(&mut other).await.unwrap();
        assert_eq!(other.response_body(), b"pong");
    }

    #[tokio::test]
    async fn flooding_client_is_banned() {
        let (registry, banning) = chain(3);

        let mut statuses = Vec::new();
        for _ in 0..5 {
            let mut ctx = request("10.0.0.1:1234");
            registry.dispatch_request(&mut ctx).await.unwrap();
            statuses.push(ctx.status());
        }

        assert_eq!(&statuses[..3], &[StatusCode::OK; 3]);
        assert_eq!(&statuses[3..], &[StatusCode::FORBIDDEN; 2]);
        assert!(banning.try_get("api").unwrap().is_banned("10.0.0.1"));
    }

    #[tokio::test]
    async fn whitelist_and_removed_route_are_honoured() {
        let (registry, banning) = chain(1);

        for _ in 0..3 {
            let mut ctx = request("10.0.0.9:1");
            registry.dispatch_request(&mut ctx).await.unwrap();
            assert_eq!(ctx.status(), StatusCode::OK);
        }

        banning.get_or_create("api", 5).ban("10.0.0.1", None, true);
        banning.try_remove("api");

        let mut ctx = request("10.0.0.1:1");
        registry.dispatch_request(&mut ctx).await.unwrap();
        assert_eq!(ctx.status(), StatusCode::OK);
        assert_eq!(banning.try_get("api").unwrap().max_requests_per_second(), 1);
    }

    #[tokio::test]
    async fn settings_reach_a_route_created_before_the_module() {
        let banning = Arc::new(BanningRegistry::new());
        banning.get_or_create("api", 5).ban("10.0.0.2", None, true);

        let registry = ModuleRegistry::new();
        registry
            .add(
                "banning",
                Arc::new(
                    BanningModule::new("/", "api", 5, banning.clone())
                        .with_max_requests_per_second(3)
                        .with_whitelist(vec!["10.0.0.9".to_string()]),
                ),
            )
            .unwrap();

        let mut forbidden = 0;
        for _ in 0..10 {
            let mut ctx = request("10.0.0.1:1234");
            registry.dispatch_request(&mut ctx).await.unwrap();
            if ctx.status() == StatusCode::FORBIDDEN {
                forbidden += 1;
            }
        }
        assert_eq!(forbidden, 7);

        let config = banning.try_get("api").unwrap();
        assert_eq!(config.max_requests_per_second(), 3);
        assert!(config.is_whitelisted("10.0.0.9"));
        assert!(config.is_banned("10.0.0.2"));
    }

    #[tokio::test]
    async fn start_applies_settings_to_an_existing_route() {
        let banning = Arc::new(BanningRegistry::new());
        let existing = banning.get_or_create("api", 5);

        let registry = ModuleRegistry::new();
        registry
            .add(
                "banning",
                Arc::new(BanningModule::new("/", "api", 5, banning.clone()).with_max_requests_per_second(7)),
            )
            .unwrap();
        assert_eq!(existing.max_requests_per_second(), 0);

        let shutdown = crate::lifecycle::Shutdown::new();
        registry.start_all(&shutdown.signal()).await.unwrap();
        assert_eq!(existing.max_requests_per_second(), 7);
        assert!(Arc::ptr_eq(&existing, &banning.try_get("api").unwrap()));
    }

    #[test]
    fn recreated_route_is_configured_before_it_is_shared() {
        let banning = Arc::new(BanningRegistry::new());
        let module = BanningModule::new("/", "api", 2, banning.clone())
            .with_max_requests_per_second(4)
            .with_whitelist(vec!["10.0.0.9".to_string()]);

        let built = module.build_configuration();
        assert_eq!(built.max_requests_per_second(), 4);
        assert!(built.is_whitelisted("10.0.0.9"));
        assert_eq!(built.ban_duration().as_secs(), 120);

        let config = module.configuration();
        assert_eq!(config.max_requests_per_second(), 4);
        assert!(Arc::ptr_eq(&config, &module.configuration()));
    }
}
