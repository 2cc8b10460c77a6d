//! Shared services of an application session.
//!
//! One [`BindingsContext`] replaces the process-wide registry, undo history
//! and error catcher: every binding built with it shares the same pools.
//! Cloning a context shares them too.

use crate::binding::{BindingOptions, CommandExecutor, DeferredExecutor};
use crate::command::{CommandRegistry, UndoHistory};
use crate::config::InteractoConfig;
use crate::telemetry::{ErrorCatcher, RemoteUsageSink, TracingUsageSink, UsageSink};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct BindingsContext {
    session: Uuid,
    registry: Rc<RefCell<CommandRegistry>>,
    history: Rc<RefCell<UndoHistory>>,
    errors: Rc<ErrorCatcher>,
    usage: Rc<dyn UsageSink>,
    executor: Rc<dyn CommandExecutor>,
    usage_endpoint: Option<String>,
    binding_options: BindingOptions,
}

impl BindingsContext {
    /// A context with default sizes, tracing usage sink and deferred executor.
    pub fn new() -> Self {
        Self::from_config(&InteractoConfig::default())
    }

    pub fn from_config(config: &InteractoConfig) -> Self {
        let history = Rc::new(RefCell::new(UndoHistory::with_size_max(config.undo_size)));
        let mut registry = CommandRegistry::with_size_max(config.registry_size);
        registry.attach_history(history.clone());

        let session = Uuid::new_v4();
        debug!(%session, registry_size = config.registry_size, undo_size = config.undo_size, "bindings context created");

        Self {
            session,
            registry: Rc::new(RefCell::new(registry)),
            history,
            errors: Rc::new(ErrorCatcher::new()),
            usage: Rc::new(TracingUsageSink),
            executor: Rc::new(DeferredExecutor::new()),
            usage_endpoint: config.usage_endpoint.clone(),
            binding_options: config.binding,
        }
    }

    /// Post usage records to the configured endpoint through `transport`.
    ///
    /// Without a configured endpoint the context is returned unchanged.
    pub fn with_transport<F>(self, transport: F) -> Self
    where
        F: Fn(&str, &str) -> Result<(), String> + 'static,
    {
        match self.usage_endpoint.clone() {
            Some(endpoint) => self.with_usage_sink(Rc::new(RemoteUsageSink::new(endpoint, transport))),
            None => self,
        }
    }

    pub fn with_usage_sink(mut self, usage: Rc<dyn UsageSink>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_executor(mut self, executor: Rc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn registry(&self) -> &Rc<RefCell<CommandRegistry>> {
        &self.registry
    }

    pub fn history(&self) -> &Rc<RefCell<UndoHistory>> {
        &self.history
    }

    pub fn errors(&self) -> &ErrorCatcher {
        &self.errors
    }

    pub fn usage(&self) -> &dyn UsageSink {
        self.usage.as_ref()
    }

    pub fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }

    /// Configured defaults for new bindings.
    pub fn binding_options(&self) -> BindingOptions {
        self.binding_options
    }
}

impl Default for BindingsContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BindingsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingsContext")
            .field("session", &self.session)
            .field("registry", &self.registry.borrow())
            .field("history", &self.history.borrow())
            .field("usage_endpoint", &self.usage_endpoint)
            .finish()
    }
}
