//! The broker seam and an in-process broker.
//!
//! The bridge only needs three things from a broker: whether the current
//! process executes tasks, a way to register lifecycle callbacks and a way
//! to publish values into the dependency context tasks are built from.
//! Those are captured by [`WorkerBroker`].
//!
//! [`Broker`] is a small implementation of the seam which dispatches
//! lifecycle events in-process. Queue backends embed it, or implement
//! [`WorkerBroker`] themselves.
use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::BridgeConfig,
    data::{Data, DependencyContext, MissingDataError},
    error::{BrokerError, ConfigError},
    event::{EventHandler, WorkerEvent},
    state::WorkerState,
};

/// A broker capable of hosting workers
pub trait WorkerBroker: Send + Sync {
    /// Whether this process executes tasks
    fn is_worker_process(&self) -> bool;

    /// Register `handler` to run when `event` fires
    fn add_event_handler(&self, event: WorkerEvent, handler: EventHandler);

    /// Merge `ctx` into the dependency context used to build task arguments
    fn add_dependency_context(&self, ctx: DependencyContext);
}

/// Which side of the queue a process is on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerRole {
    /// Executes tasks
    #[default]
    Worker,
    /// Only submits tasks
    Client,
}

impl BrokerRole {
    fn startup_event(self) -> WorkerEvent {
        match self {
            BrokerRole::Worker => WorkerEvent::WorkerStartup,
            BrokerRole::Client => WorkerEvent::ClientStartup,
        }
    }

    fn shutdown_event(self) -> WorkerEvent {
        match self {
            BrokerRole::Worker => WorkerEvent::WorkerShutdown,
            BrokerRole::Client => WorkerEvent::ClientShutdown,
        }
    }
}

impl FromStr for BrokerRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "worker" => Ok(BrokerRole::Worker),
            "client" => Ok(BrokerRole::Client),
            _ => Err(ConfigError::InvalidRole(s.to_owned())),
        }
    }
}

/// An in-process broker dispatching lifecycle events
pub struct Broker {
    role: BrokerRole,
    handlers: RwLock<HashMap<WorkerEvent, Vec<EventHandler>>>,
    dependencies: RwLock<DependencyContext>,
    state: Arc<WorkerState>,
}

impl Broker {
    /// Create a broker for the given role
    pub fn new(role: BrokerRole) -> Self {
        Self {
            role,
            handlers: Default::default(),
            dependencies: Default::default(),
            state: Default::default(),
        }
    }

    /// Create a broker for a worker process
    pub fn worker() -> Self {
        Self::new(BrokerRole::Worker)
    }

    /// Create a broker for a client process
    pub fn client() -> Self {
        Self::new(BrokerRole::Client)
    }

    /// Create a broker with the role set in `config`
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.role())
    }

    /// The role of this broker
    pub fn role(&self) -> BrokerRole {
        self.role
    }

    /// The worker state passed to every handler
    pub fn state(&self) -> &Arc<WorkerState> {
        &self.state
    }

    /// Fire the startup event for this broker's role
    pub async fn startup(&self) -> Result<(), BrokerError> {
        self.emit(self.role.startup_event()).await
    }

    /// Fire the shutdown event for this broker's role
    pub async fn shutdown(&self) -> Result<(), BrokerError> {
        self.emit(self.role.shutdown_event()).await
    }

    /// Run the handlers registered for `event` in registration order.
    /// The first failing handler stops the dispatch.
    pub async fn emit(&self, event: WorkerEvent) -> Result<(), BrokerError> {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .cloned()
            .unwrap_or_default();
        debug!("Dispatching {} to {} handler(s)", event, handlers.len());
        for handler in handlers {
            if let Err(source) = handler(self.state.clone()).await {
                error!("Handler for {} failed: {}", event, source);
                return Err(BrokerError::Handler { event, source });
            }
        }
        Ok(())
    }

    /// Extract a value from the dependency context
    pub fn dependency<T: Clone + 'static>(&self) -> Result<Data<T>, MissingDataError> {
        let dependencies = self
            .dependencies
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Data::try_from(&*dependencies)
    }

    /// Number of types in the dependency context
    pub fn dependency_count(&self) -> usize {
        self.dependencies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::worker()
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Broker")
            .field("role", &self.role)
            .field(
                "handlers",
                &handlers
                    .iter()
                    .map(|(event, list)| (*event, list.len()))
                    .collect::<HashMap<_, _>>(),
            )
            .field("dependencies", &*self.dependencies.read().unwrap_or_else(PoisonError::into_inner))
            .field("state", &self.state)
            .finish()
    }
}

impl WorkerBroker for Broker {
    fn is_worker_process(&self) -> bool {
        self.role == BrokerRole::Worker
    }

    fn add_event_handler(&self, event: WorkerEvent, handler: EventHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push(handler);
    }

    fn add_dependency_context(&self, ctx: DependencyContext) {
        self.dependencies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(ctx);
    }
}
