//! Run with
//!
//! ```not_rust
//! APALIS_LIFESPAN_APP=shop::create_app cargo run -p lifespan-worker
//! ```
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use apalis_lifespan::{
    bridge, handler_fn, Application, BoxDynError, BridgeConfig, Broker, BrokerRole, Data,
    Lifespan, LifespanError, ObjectRegistry, WorkerBroker, WorkerEvent,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pretend database pool
#[derive(Debug, Default)]
struct Pool {
    queries: AtomicUsize,
}

#[derive(Debug, Clone)]
struct ShopState {
    pool: Arc<Pool>,
}

struct Shop {
    state: ShopState,
}

struct ShopLifespan {
    pool: Arc<Pool>,
}

impl Lifespan for ShopLifespan {
    async fn enter(&mut self) -> Result<(), LifespanError> {
        tracing::info!("connecting pool");
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    async fn exit(self) -> Result<(), LifespanError> {
        tracing::info!(
            queries = self.pool.queries.load(Ordering::Relaxed),
            "closing pool"
        );
        Ok(())
    }
}

impl Application for Shop {
    type State = ShopState;
    type Lifespan = ShopLifespan;

    fn lifespan(&self) -> ShopLifespan {
        ShopLifespan {
            pool: self.state.pool.clone(),
        }
    }

    fn state(&self) -> ShopState {
        self.state.clone()
    }
}

fn create_app() -> Shop {
    Shop {
        state: ShopState {
            pool: Arc::new(Pool::default()),
        },
    }
}

async fn send_receipt(order: u32, state: Data<ShopState>) {
    state.pool.queries.fetch_add(1, Ordering::Relaxed);
    tracing::info!(order, "receipt sent");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BridgeConfig::from_env_or("shop::create_app")?;
    let registry = Arc::new(ObjectRegistry::new().with_factory("shop::create_app", create_app));

    let broker = Arc::new(Broker::from_config(&config));
    bridge::register_with_config::<Shop, _, _>(&broker, registry, &config);
    // runs after the bridge, so the shop state is already published
    let weak = Arc::downgrade(&broker);
    broker.add_event_handler(
        WorkerEvent::WorkerStartup,
        handler_fn(move |_| {
            let broker = weak.upgrade();
            async move {
                let broker = broker.ok_or("broker dropped")?;
                let state: Data<ShopState> = broker.dependency()?;
                tracing::info!(
                    queries = state.pool.queries.load(Ordering::Relaxed),
                    "worker ready"
                );
                Ok::<_, BoxDynError>(())
            }
        }),
    );

    broker.startup().await?;
    if broker.role() == BrokerRole::Worker {
        for order in 1..=3 {
            send_receipt(order, broker.dependency()?).await;
        }
    }
    broker.shutdown().await?;
    Ok(())
}
