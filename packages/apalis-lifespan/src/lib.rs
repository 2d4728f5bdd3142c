#![crate_name = "apalis_lifespan"]
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    bad_style,
    dead_code,
    non_shorthand_field_patterns,
    overflowing_literals,
    path_statements,
    unconditional_recursion,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true
)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # apalis-lifespan
//!
//! Reuse a web application's lifespan inside task workers.
//!
//! A web application usually opens its shared resources (database pools,
//! caches, clients) in a lifespan that runs once when the server starts and
//! closes them when it stops. Workers consuming background tasks need the
//! same resources. This crate hooks the application's lifespan into the
//! worker lifecycle:
//!
//! - on [`WorkerEvent::WorkerStartup`] the application is resolved from a
//!   path, its lifespan is entered and the application plus its state are
//!   merged into the broker's [`DependencyContext`];
//! - on [`WorkerEvent::WorkerShutdown`] the lifespan is exited again.
//!
//! Both handlers do nothing in client (producer) processes.
//!
//! ```rust
//! use std::sync::Arc;
//! use apalis_lifespan::{
//!     bridge, Application, BoxDynError, Broker, Data, FnLifespan, LifespanError, ObjectRegistry,
//! };
//!
//! #[derive(Clone, Debug)]
//! struct AppState {
//!     greeting: &'static str,
//! }
//!
//! struct WebApp {
//!     state: AppState,
//! }
//!
//! impl Application for WebApp {
//!     type State = AppState;
//!     type Lifespan = FnLifespan;
//!
//!     fn lifespan(&self) -> Self::Lifespan {
//!         FnLifespan::new(
//!             || async { Ok::<_, BoxDynError>(()) },
//!             || async { Ok::<_, LifespanError>(()) },
//!         )
//!     }
//!
//!     fn state(&self) -> AppState {
//!         self.state.clone()
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let registry = Arc::new(ObjectRegistry::new().with_factory("web::app", || WebApp {
//!     state: AppState { greeting: "hello" },
//! }));
//! let broker = Arc::new(Broker::worker());
//! bridge::register::<WebApp, _, _>(&broker, registry, "web::app");
//!
//! broker.startup().await?;
//! let state: Data<AppState> = broker.dependency()?;
//! assert_eq!(state.greeting, "hello");
//! broker.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! **Features**
//!
//! - `tracing` (default) - Emit lifecycle logs through [`tracing`](https://docs.rs/tracing).

#[macro_use]
mod macros;

/// The lifespan bridge: startup and shutdown handlers.
pub mod bridge;
/// The broker seam and an in-process broker.
pub mod broker;
/// Configuration for the bridge.
pub mod config;
/// Dependency context shared with tasks.
pub mod data;
/// Includes all possible error types.
pub mod error;
/// Worker lifecycle events.
pub mod event;
/// Application and lifespan seams.
pub mod lifespan;
/// Resolving applications from a path.
pub mod resolver;
/// Worker-local state.
pub mod state;

pub use bridge::{register, register_with_config};
pub use broker::{Broker, BrokerRole, WorkerBroker};
pub use config::BridgeConfig;
pub use data::{Data, DependencyContext, MissingDataError};
pub use error::{BoxDynError, BridgeError, BrokerError, ConfigError, ResolveError};
pub use event::{handler_fn, EventHandler, WorkerEvent};
pub use lifespan::{Application, FnLifespan, Lifespan, LifespanError};
pub use resolver::{resolve, AppTarget, Importer, ObjectRegistry};
pub use state::WorkerState;
