//! Ordered module collection and the request dispatch loop.
//!
//! # Responsibilities
//! - Register modules under unique names, in insertion order
//! - Start modules once, in order, stopping at the first failure
//! - Dispatch each request through matching modules until one handles it
//! - Dispose modules and release their container links
//!
//! # Design Decisions
//! - Readers load an immutable snapshot of the module list (no lock on the hot path)
//! - Writers serialize on a mutex and publish a new snapshot
//! - No lock or snapshot guard is held across a handler await

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;

use arc_swap::ArcSwap;

use crate::http::RequestContext;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::pipeline::{Module, ModuleError, RegistryError};
use crate::routing::matcher::match_base_route;

/// A registered module with its name and dispatch slot.
pub struct ModuleEntry {
    name: String,
    index: usize,
    module: Arc<dyn Module>,
}

impl ModuleEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insertion slot; fixes dispatch order for the registry's lifetime.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn module(&self) -> &Arc<dyn Module> {
        &self.module
    }
}

/// Ordered, add-only collection of modules.
pub struct ModuleRegistry {
    modules: ArcSwap<Vec<Arc<ModuleEntry>>>,
    writer: Mutex<()>,
    disposed: AtomicBool,
    self_ref: Weak<ModuleRegistry>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            modules: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
            disposed: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        })
    }

    /// Register `module` under `name` in the next dispatch slot.
    pub fn add(&self, name: impl Into<String>, module: Arc<dyn Module>) -> Result<(), RegistryError> {
        let name = name.into();
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        if self.disposed.load(Ordering::Acquire) {
            return Err(RegistryError::Disposed);
        }

        let current = self.modules.load_full();
        if current.iter().any(|entry| entry.name == name) {
            return Err(RegistryError::DuplicateName(name));
        }
        if !module.link().bind(self.self_ref.clone()) {
            return Err(RegistryError::AlreadyAttached(name));
        }

        tracing::debug!(
            module = %name,
            index = current.len(),
            base_route = module.base_route(),
            "Module registered"
        );

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::new(ModuleEntry {
            name,
            index: current.len(),
            module,
        }));
        self.modules.store(Arc::new(next));
        Ok(())
    }

    /// Start every module in registration order.
    ///
    /// The first failure aborts the remaining starts. Triggering `shutdown` while a
    /// start hook is pending cancels startup.
    pub async fn start_all(&self, shutdown: &ShutdownSignal) -> Result<(), RegistryError> {
        if self.is_disposed() {
            return Err(RegistryError::Disposed);
        }

        let modules = self.modules.load_full();
        for entry in modules.iter() {
            if shutdown.is_triggered() {
                return Err(RegistryError::Cancelled(entry.name.clone()));
            }

            let mut cancelled = shutdown.clone();
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    tracing::warn!(module = %entry.name, "Startup cancelled");
                    return Err(RegistryError::Cancelled(entry.name.clone()));
                }
                result = entry.module.start(shutdown.clone()) => {
                    if let Err(source) = result {
                        tracing::error!(module = %entry.name, error = %source, "Module failed to start");
                        return Err(RegistryError::Start {
                            name: entry.name.clone(),
                            source,
                        });
                    }
                }
            }
            tracing::info!(module = %entry.name, "Module started");
        }
        Ok(())
    }

    /// Run `ctx` through the module chain.
    ///
    /// Returns with the context unhandled if no module answered; producing a fallback
    /// response is up to the caller.
    pub async fn dispatch_request(&self, ctx: &mut RequestContext) -> Result<(), ModuleError> {
        if ctx.is_handled() {
            return Ok(());
        }

        let modules = self.modules.load_full();
        for entry in modules.iter() {
            let route = match_base_route(entry.module.base_route(), ctx.requested_path());
            if !route.is_match() {
                continue;
            }
            ctx.set_route(route);

            let started = Instant::now();
            let result = entry.module.handle(ctx).await;
            tracing::trace!(
                request_id = %ctx.id(),
                module = %entry.name,
                handled = ctx.is_handled(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "Module finished"
            );
            if let Err(e) = result {
                tracing::debug!(request_id = %ctx.id(), module = %entry.name, error = %e, "Module failed");
                return Err(e);
            }

            if ctx.is_handled() {
                metrics::record_module_handled(&entry.name);
                break;
            }
            if entry.module.is_final_handler() {
                break;
            }
        }
        Ok(())
    }

    /// Module names in dispatch order.
    pub fn names(&self) -> Vec<String> {
        self.modules.load().iter().map(|entry| entry.name.clone()).collect()
    }

    /// Snapshot of the registered entries in dispatch order.
    pub fn entries(&self) -> Vec<Arc<ModuleEntry>> {
        self.modules.load().iter().cloned().collect()
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules
            .load()
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.module.clone())
    }

    pub fn len(&self) -> usize {
        self.modules.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Dispose every module and release its link. Later calls to [`add`](Self::add) fail.
    pub fn dispose(&self) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let modules = self.modules.swap(Arc::new(Vec::new()));
        for entry in modules.iter() {
            entry.module.dispose();
            entry.module.link().release();
        }
        tracing::info!(modules = modules.len(), "Module registry disposed");
    }
}
