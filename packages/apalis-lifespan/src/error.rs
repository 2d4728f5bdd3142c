use std::error::Error as StdError;
use thiserror::Error;

use crate::{event::WorkerEvent, lifespan::LifespanError};

/// Convenience type alias
pub type BoxDynError = Box<dyn StdError + 'static + Send + Sync>;

/// An application path could not be turned into an application.
///
/// These errors are fatal for worker startup: the configured reference
/// has to be fixed before the worker can run.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Nothing is registered under the path.
    #[error("`{path}` could not be imported")]
    NotFound {
        /// The configured application path
        path: String,
    },
    /// The path resolved, directly or through its factory, to something
    /// other than the expected application type.
    #[error("`{path}` is not a `{expected}` application")]
    NotAnApplication {
        /// The configured application path
        path: String,
        /// Type name of the expected application
        expected: &'static str,
    },
}

/// Possible errors returned by the lifespan bridge handlers.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The application could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Entering or exiting the lifespan failed.
    #[error("Lifespan failed: {0}")]
    Lifespan(#[from] LifespanError),
    /// Shutdown ran without a lifespan opened by startup.
    #[error("No open lifespan found, did the startup handler run?")]
    LifespanNotOpen,
    /// Startup ran on a worker state that already holds, or is opening, a lifespan.
    #[error("Lifespan already open for this worker")]
    AlreadyStarted,
}

/// Errors raised while a broker dispatches lifecycle events.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// A handler registered for the event failed.
    #[error("Handler for {event} failed: {source}")]
    Handler {
        /// The event being dispatched
        event: WorkerEvent,
        /// The handler's error
        #[source]
        source: BoxDynError,
    },
}

/// Errors raised while loading a [`BridgeConfig`](crate::config::BridgeConfig).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable was not set.
    #[error("Missing required variable `{0}`")]
    Missing(&'static str),
    /// The role is neither `worker` nor `client`.
    #[error("Invalid broker role `{0}`, expected `worker` or `client`")]
    InvalidRole(String),
}
