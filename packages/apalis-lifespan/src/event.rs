use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{error::BoxDynError, state::WorkerState};

/// The future returned by an [`EventHandler`]
pub type HandlerFuture = BoxFuture<'static, Result<(), BoxDynError>>;

/// A lifecycle callback registered with a broker
pub type EventHandler = Arc<dyn Fn(Arc<WorkerState>) -> HandlerFuture + Send + Sync>;

/// Lifecycle events fired by a broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerEvent {
    /// A worker process started, before any task runs
    WorkerStartup,
    /// A worker process is stopping, after the last task ran
    WorkerShutdown,
    /// A client (producer) process started
    ClientStartup,
    /// A client (producer) process is stopping
    ClientShutdown,
}

impl fmt::Display for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event_description = match self {
            WorkerEvent::WorkerStartup => "worker startup",
            WorkerEvent::WorkerShutdown => "worker shutdown",
            WorkerEvent::ClientStartup => "client startup",
            WorkerEvent::ClientShutdown => "client shutdown",
        };
        write!(f, "WorkerEvent: {event_description}")
    }
}

/// Wrap an async function into an [`EventHandler`]
pub fn handler_fn<F, Fut, E>(f: F) -> EventHandler
where
    F: Fn(Arc<WorkerState>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxDynError> + 'static,
{
    Arc::new(move |state| -> HandlerFuture {
        f(state).map(|res| res.map_err(Into::into)).boxed()
    })
}
