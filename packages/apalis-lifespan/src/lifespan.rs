//! Application and lifespan seams.
//!
//! An [`Application`] is whatever the web framework builds at startup: it
//! hands out a [`Lifespan`] describing how its shared resources are opened
//! and closed, and a cloneable state container that tasks can depend on.
//!
//! ## Exiting from another task
//! A lifespan entered by the worker's startup handler is exited by its
//! shutdown handler, which may be driven by a different task than the one
//! that entered it. Lifespans that track the entering task report this
//! with [`LifespanError::ExitedElsewhere`]. The bridge treats that variant
//! as benign and logs it; every other error is a real failure.
use std::{fmt, future::Future};

use futures::{future::BoxFuture, FutureExt};
use thiserror::Error;

use crate::error::BoxDynError;

/// Errors reported by a [`Lifespan`]
#[derive(Error, Debug)]
pub enum LifespanError {
    /// The lifespan was exited from a different task than the one that
    /// entered it. Teardown still ran.
    #[error("Lifespan exited from a different task: {0}")]
    ExitedElsewhere(String),
    /// Startup of the lifespan failed
    #[error("Failed to enter lifespan: {0}")]
    Enter(BoxDynError),
    /// Teardown of the lifespan failed
    #[error("Failed to exit lifespan: {0}")]
    Exit(BoxDynError),
}

/// The scoped startup and shutdown of an application's resources.
pub trait Lifespan: Send + 'static {
    /// Open the resources
    fn enter(&mut self) -> impl Future<Output = Result<(), LifespanError>> + Send;

    /// Close the resources, completing normally
    fn exit(self) -> impl Future<Output = Result<(), LifespanError>> + Send;
}

/// A web application whose lifespan can run inside a worker.
pub trait Application: Send + Sync + 'static {
    /// The mutable state container exposed to request handlers
    type State: Clone + Send + Sync + 'static;

    /// The lifespan returned by [`Application::lifespan`]
    type Lifespan: Lifespan;

    /// Build a fresh, not yet entered lifespan
    fn lifespan(&self) -> Self::Lifespan;

    /// The application's state container
    fn state(&self) -> Self::State;
}

type EnterFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxDynError>> + Send>;
type ExitFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), LifespanError>> + Send>;

/// A [`Lifespan`] built from a startup and a shutdown closure.
///
/// The shutdown closure returns a [`LifespanError`] so it can report
/// [`LifespanError::ExitedElsewhere`] itself.
pub struct FnLifespan {
    enter: Option<EnterFn>,
    exit: ExitFn,
}

impl FnLifespan {
    /// Create a lifespan from a startup and a shutdown closure
    pub fn new<S, SFut, T, TFut>(startup: S, shutdown: T) -> Self
    where
        S: FnOnce() -> SFut + Send + 'static,
        SFut: Future<Output = Result<(), BoxDynError>> + Send + 'static,
        T: FnOnce() -> TFut + Send + 'static,
        TFut: Future<Output = Result<(), LifespanError>> + Send + 'static,
    {
        Self {
            enter: Some(Box::new(move || startup().boxed())),
            exit: Box::new(move || shutdown().boxed()),
        }
    }
}

impl fmt::Debug for FnLifespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLifespan")
            .field("entered", &self.enter.is_none())
            .finish()
    }
}

impl Lifespan for FnLifespan {
    async fn enter(&mut self) -> Result<(), LifespanError> {
        let startup = self
            .enter
            .take()
            .ok_or_else(|| LifespanError::Enter("lifespan already entered".into()))?;
        startup().await.map_err(LifespanError::Enter)
    }

    async fn exit(self) -> Result<(), LifespanError> {
        (self.exit)().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    fn counting(opened: Arc<AtomicUsize>, closed: Arc<AtomicUsize>) -> FnLifespan {
        FnLifespan::new(
            move || async move {
                opened.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxDynError>(())
            },
            move || async move {
                closed.fetch_add(1, Ordering::SeqCst);
                Ok::<_, LifespanError>(())
            },
        )
    }

    #[tokio::test]
    async fn runs_startup_then_shutdown() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let mut lifespan = counting(opened.clone(), closed.clone());

        lifespan.enter().await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        lifespan.exit().await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cannot_enter_twice() {
        let opened = Arc::new(AtomicUsize::new(0));
        let mut lifespan = counting(opened.clone(), Default::default());

        lifespan.enter().await.unwrap();
        let err = lifespan.enter().await.unwrap_err();
        assert!(matches!(err, LifespanError::Enter(_)));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn startup_errors_become_enter_errors() {
        let mut lifespan = FnLifespan::new(
            || async { Err::<(), BoxDynError>("pool unreachable".into()) },
            || async { Ok::<_, LifespanError>(()) },
        );
        let err = lifespan.enter().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to enter lifespan: pool unreachable");
    }
}
