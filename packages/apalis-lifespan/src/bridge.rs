//! The lifespan bridge.
//!
//! [`register`] attaches two handlers to a [`WorkerBroker`]:
//!
//! - on [`WorkerEvent::WorkerStartup`], [`startup`] resolves the application,
//!   enters its lifespan, keeps the open lifespan in the [`WorkerState`] and
//!   publishes `Arc<A>` and `A::State` to the dependency context;
//! - on [`WorkerEvent::WorkerShutdown`], [`shutdown`] takes the lifespan back
//!   out of the state and exits it.
//!
//! Both are no-ops unless the broker reports a worker process.
#![cfg_attr(not(feature = "tracing"), allow(unused_imports, unused_variables))]
use std::{
    any::type_name,
    marker::PhantomData,
    sync::{Arc, Weak},
};

use futures::FutureExt;

use crate::{
    broker::WorkerBroker,
    config::BridgeConfig,
    data::DependencyContext,
    error::{BoxDynError, BridgeError},
    event::{EventHandler, HandlerFuture, WorkerEvent},
    lifespan::{Application, Lifespan, LifespanError},
    resolver::{resolve, Importer},
    state::WorkerState,
};

/// Slot in [`WorkerState`] holding the lifespan of `A`
enum LifespanSlot<A: Application> {
    /// Claimed by a [`startup`] that has not finished entering yet
    Opening,
    Open(A::Lifespan),
}

/// Releases an `Opening` claim unless [`Reservation::fulfil`] ran, so a
/// failed or cancelled startup leaves the slot free.
struct Reservation<'a, A: Application> {
    state: &'a WorkerState,
    armed: bool,
    _app: PhantomData<fn() -> A>,
}

impl<'a, A: Application> Reservation<'a, A> {
    fn claim(state: &'a WorkerState) -> Result<Self, BridgeError> {
        state
            .try_insert(LifespanSlot::<A>::Opening)
            .map_err(|_| BridgeError::AlreadyStarted)?;
        Ok(Reservation {
            state,
            armed: true,
            _app: PhantomData,
        })
    }

    /// Replace the claim with the entered lifespan, handing back whatever
    /// lifespan the slot held instead of a claim.
    fn fulfil(mut self, lifespan: A::Lifespan) -> Option<A::Lifespan> {
        self.armed = false;
        match self.state.insert(LifespanSlot::<A>::Open(lifespan)) {
            Some(LifespanSlot::Open(displaced)) => Some(displaced),
            Some(LifespanSlot::Opening) | None => None,
        }
    }
}

impl<A: Application> Drop for Reservation<'_, A> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.state
            .take_if::<LifespanSlot<A>, _>(|slot| matches!(slot, LifespanSlot::Opening));
    }
}

/// Run the lifespan of the application found at `app_path` inside the
/// workers of `broker`.
pub fn register<A, B, I>(broker: &Arc<B>, importer: Arc<I>, app_path: impl Into<String>)
where
    A: Application,
    B: WorkerBroker + 'static,
    I: Importer + 'static,
{
    let app_path: Arc<str> = Arc::from(app_path.into());
    broker.add_event_handler(
        WorkerEvent::WorkerStartup,
        startup_handler::<A, B, I>(Arc::downgrade(broker), importer, app_path),
    );
    broker.add_event_handler(
        WorkerEvent::WorkerShutdown,
        shutdown_handler::<A, B>(Arc::downgrade(broker)),
    );
}

/// Same as [`register`], taking the application path from `config`
pub fn register_with_config<A, B, I>(broker: &Arc<B>, importer: Arc<I>, config: &BridgeConfig)
where
    A: Application,
    B: WorkerBroker + 'static,
    I: Importer + 'static,
{
    register::<A, B, I>(broker, importer, config.app_path());
}

/// Build the handler for [`WorkerEvent::WorkerStartup`]
pub fn startup_handler<A, B, I>(broker: Weak<B>, importer: Arc<I>, app_path: Arc<str>) -> EventHandler
where
    A: Application,
    B: WorkerBroker + 'static,
    I: Importer + 'static,
{
    Arc::new(move |state: Arc<WorkerState>| -> HandlerFuture {
        let broker = broker.clone();
        let importer = importer.clone();
        let app_path = app_path.clone();
        async move {
            match broker.upgrade() {
                Some(broker) => startup::<A, _, _>(&*broker, &*importer, &app_path, &state)
                    .await
                    .map_err(BoxDynError::from),
                None => {
                    debug!("Broker dropped before startup of {}", app_path);
                    Ok(())
                }
            }
        }
        .boxed()
    })
}

/// Build the handler for [`WorkerEvent::WorkerShutdown`]
pub fn shutdown_handler<A, B>(broker: Weak<B>) -> EventHandler
where
    A: Application,
    B: WorkerBroker + 'static,
{
    Arc::new(move |state: Arc<WorkerState>| -> HandlerFuture {
        let broker = broker.clone();
        async move {
            match broker.upgrade() {
                Some(broker) => shutdown::<A, _>(&*broker, &state)
                    .await
                    .map_err(BoxDynError::from),
                None => {
                    debug!("Broker dropped before shutdown of {}", type_name::<A>());
                    Ok(())
                }
            }
        }
        .boxed()
    })
}

/// Open the lifespan of the application at `app_path` and publish it to
/// the broker's dependency context.
///
/// Nothing is stored or published when resolving or entering fails.
pub async fn startup<A, B, I>(
    broker: &B,
    importer: &I,
    app_path: &str,
    state: &WorkerState,
) -> Result<(), BridgeError>
where
    A: Application,
    B: WorkerBroker + ?Sized,
    I: Importer + ?Sized,
{
    if !broker.is_worker_process() {
        debug!("Skipping lifespan startup of {} outside a worker", app_path);
        return Ok(());
    }
    let reservation = Reservation::<A>::claim(state)?;

    let app = resolve::<A, I>(importer, app_path)?;
    let mut lifespan = app.lifespan();
    lifespan.enter().await?;
    if let Some(displaced) = reservation.fulfil(lifespan) {
        warn!("Lifespan of {} was replaced while starting, exiting it", app_path);
        displaced.exit().await?;
    }

    broker.add_dependency_context(
        DependencyContext::new()
            .with(app.clone())
            .with(app.state()),
    );
    info!("Lifespan of {} started", app_path);
    Ok(())
}

/// Exit the lifespan opened by [`startup`].
///
/// A [`LifespanError::ExitedElsewhere`] is logged and swallowed, any other
/// error is returned.
pub async fn shutdown<A, B>(broker: &B, state: &WorkerState) -> Result<(), BridgeError>
where
    A: Application,
    B: WorkerBroker + ?Sized,
{
    if !broker.is_worker_process() {
        debug!("Skipping lifespan shutdown of {} outside a worker", type_name::<A>());
        return Ok(());
    }
    // a startup still entering keeps its claim
    let Some(LifespanSlot::Open(lifespan)) =
        state.take_if::<LifespanSlot<A>, _>(|slot| matches!(slot, LifespanSlot::Open(_)))
    else {
        return Err(BridgeError::LifespanNotOpen);
    };

    match lifespan.exit().await {
        Ok(()) => {
            info!("Lifespan of {} stopped", type_name::<A>());
            Ok(())
        }
        Err(err @ LifespanError::ExitedElsewhere(_)) => {
            warn!("{}", err);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use super::*;
    use crate::{
        broker::Broker,
        error::ResolveError,
        lifespan::FnLifespan,
        resolver::ObjectRegistry,
    };

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Teardown {
        Clean,
        OtherTask,
        Broken,
    }

    #[derive(Debug, Default)]
    struct Counters {
        entered: AtomicUsize,
        exited: AtomicUsize,
    }

    #[derive(Debug, Clone)]
    struct ShopState {
        counters: Arc<Counters>,
    }

    struct Shop {
        state: ShopState,
        teardown: Teardown,
    }

    impl Shop {
        fn new(teardown: Teardown) -> Self {
            Shop {
                state: ShopState {
                    counters: Default::default(),
                },
                teardown,
            }
        }
    }

    impl Application for Shop {
        type State = ShopState;
        type Lifespan = FnLifespan;

        fn lifespan(&self) -> FnLifespan {
            let enter = self.state.counters.clone();
            let exit = self.state.counters.clone();
            let teardown = self.teardown;
            FnLifespan::new(
                move || async move {
                    // connecting takes at least one trip through the scheduler
                    tokio::task::yield_now().await;
                    enter.entered.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxDynError>(())
                },
                move || async move {
                    exit.exited.fetch_add(1, Ordering::SeqCst);
                    match teardown {
                        Teardown::Clean => Ok(()),
                        Teardown::OtherTask => Err(LifespanError::ExitedElsewhere(
                            "exit called from another task".into(),
                        )),
                        Teardown::Broken => Err(LifespanError::Exit("pool close failed".into())),
                    }
                },
            )
        }

        fn state(&self) -> ShopState {
            self.state.clone()
        }
    }

    fn registry(teardown: Teardown) -> ObjectRegistry {
        ObjectRegistry::new().with_instance("shop::app", Shop::new(teardown))
    }

    #[tokio::test]
    async fn startup_then_shutdown() {
        let broker = Broker::worker();
        let state = WorkerState::new();
        startup::<Shop, _, _>(&broker, &registry(Teardown::Clean), "shop::app", &state)
            .await
            .unwrap();

        let shop = broker.dependency::<Arc<Shop>>().unwrap();
        let counters = broker.dependency::<ShopState>().unwrap().counters.clone();
        assert!(Arc::ptr_eq(&counters, &shop.state.counters));
        assert_eq!(counters.entered.load(Ordering::SeqCst), 1);
        assert_eq!(broker.dependency_count(), 2);

        shutdown::<Shop, _>(&broker, &state).await.unwrap();
        assert_eq!(counters.exited.load(Ordering::SeqCst), 1);
        assert!(state.is_empty());
        assert_eq!(broker.dependency_count(), 2);
    }

    #[tokio::test]
    async fn second_startup_is_rejected() {
        let broker = Broker::worker();
        let state = WorkerState::new();
        let registry = registry(Teardown::Clean);
        startup::<Shop, _, _>(&broker, &registry, "shop::app", &state)
            .await
            .unwrap();
        let err = startup::<Shop, _, _>(&broker, &registry, "shop::app", &state)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyStarted));

        let shop = broker.dependency::<Arc<Shop>>().unwrap();
        assert_eq!(shop.state.counters.entered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_startups_open_one_lifespan() {
        let broker = Broker::worker();
        let state = WorkerState::new();
        let registry = registry(Teardown::Clean);

        let (first, second) = tokio::join!(
            startup::<Shop, _, _>(&broker, &registry, "shop::app", &state),
            startup::<Shop, _, _>(&broker, &registry, "shop::app", &state),
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(BridgeError::AlreadyStarted)));

        shutdown::<Shop, _>(&broker, &state).await.unwrap();
        let counters = broker.dependency::<ShopState>().unwrap().counters.clone();
        assert_eq!(counters.entered.load(Ordering::SeqCst), 1);
        assert_eq!(counters.exited.load(Ordering::SeqCst), 1);
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn shutdown_during_startup_keeps_the_claim() {
        let broker = Broker::worker();
        let state = WorkerState::new();
        let registry = registry(Teardown::Clean);

        let (started, stopped) = tokio::join!(
            startup::<Shop, _, _>(&broker, &registry, "shop::app", &state),
            shutdown::<Shop, _>(&broker, &state),
        );
        started.unwrap();
        assert!(matches!(stopped, Err(BridgeError::LifespanNotOpen)));

        shutdown::<Shop, _>(&broker, &state).await.unwrap();
        let counters = broker.dependency::<ShopState>().unwrap().counters.clone();
        assert_eq!(counters.exited.load(Ordering::SeqCst), 1);
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn cancelled_startup_frees_the_slot() {
        let broker = Broker::worker();
        let state = WorkerState::new();
        let registry = registry(Teardown::Clean);

        tokio::select! {
            biased;
            _ = startup::<Shop, _, _>(&broker, &registry, "shop::app", &state) => {
                panic!("startup finished without yielding")
            }
            _ = std::future::ready(()) => {}
        }
        assert!(state.is_empty());

        startup::<Shop, _, _>(&broker, &registry, "shop::app", &state)
            .await
            .unwrap();
        shutdown::<Shop, _>(&broker, &state).await.unwrap();
    }

    #[tokio::test]
    async fn type_mismatch_registers_nothing() {
        let broker = Broker::worker();
        let state = WorkerState::new();
        let registry = ObjectRegistry::new().with_factory("shop::app", || "not a shop");

        let err = startup::<Shop, _, _>(&broker, &registry, "shop::app", &state)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Resolve(ResolveError::NotAnApplication { ref path, .. }) if path == "shop::app"
        ));
        assert_eq!(broker.dependency_count(), 0);
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn failed_enter_stores_nothing() {
        struct Offline;
        impl Application for Offline {
            type State = ();
            type Lifespan = FnLifespan;
            fn lifespan(&self) -> FnLifespan {
                FnLifespan::new(
                    || async { Err::<(), BoxDynError>("database offline".into()) },
                    || async { Ok::<_, LifespanError>(()) },
                )
            }
            fn state(&self) {}
        }

        let broker = Broker::worker();
        let state = WorkerState::new();
        let registry = ObjectRegistry::new().with_instance("offline::app", Offline);
        let err = startup::<Offline, _, _>(&broker, &registry, "offline::app", &state)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Lifespan(LifespanError::Enter(_))));
        assert_eq!(broker.dependency_count(), 0);
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn exit_from_other_task_is_tolerated() {
        let broker = Broker::worker();
        let state = WorkerState::new();
        startup::<Shop, _, _>(&broker, &registry(Teardown::OtherTask), "shop::app", &state)
            .await
            .unwrap();
        shutdown::<Shop, _>(&broker, &state).await.unwrap();

        let shop = broker.dependency::<Arc<Shop>>().unwrap();
        assert_eq!(shop.state.counters.exited.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_exit_errors_propagate() {
        let broker = Broker::worker();
        let state = WorkerState::new();
        startup::<Shop, _, _>(&broker, &registry(Teardown::Broken), "shop::app", &state)
            .await
            .unwrap();
        let err = shutdown::<Shop, _>(&broker, &state).await.unwrap_err();
        match err {
            BridgeError::Lifespan(LifespanError::Exit(source)) => {
                assert_eq!(source.to_string(), "pool close failed")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_without_startup() {
        let broker = Broker::worker();
        let err = shutdown::<Shop, _>(&broker, &WorkerState::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::LifespanNotOpen));
    }

    #[tokio::test]
    async fn client_process_is_untouched() {
        let broker = Broker::client();
        let state = WorkerState::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let registry = ObjectRegistry::new().with_factory("shop::create", move || {
            *counter.lock().unwrap() += 1;
            Shop::new(Teardown::Clean)
        });

        startup::<Shop, _, _>(&broker, &registry, "shop::create", &state)
            .await
            .unwrap();
        shutdown::<Shop, _>(&broker, &state).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), 0);
        assert_eq!(broker.dependency_count(), 0);
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn register_wires_both_events() {
        let broker = Arc::new(Broker::worker());
        register::<Shop, _, _>(&broker, Arc::new(registry(Teardown::Clean)), "shop::app");

        broker.startup().await.unwrap();
        let counters = broker.dependency::<ShopState>().unwrap().counters.clone();
        assert_eq!(counters.entered.load(Ordering::SeqCst), 1);
        assert!(!broker.state().is_empty());

        broker.shutdown().await.unwrap();
        assert_eq!(counters.exited.load(Ordering::SeqCst), 1);
        assert!(broker.state().is_empty());
    }
}
