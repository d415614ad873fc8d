use crate::{
    cluster::{Connect, IngressSource},
    metrics::SynthesisMetrics,
};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tooc_controller_core::{Configuration, Synthesis, Synthesizer};
use tracing::info;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Produces the configuration synthesized from the local cluster.
#[async_trait::async_trait]
pub trait LocalSnapshot: Send + Sync + 'static {
    async fn snapshot(&self) -> Result<Arc<Configuration>>;
}

/// Caches the locally synthesized configuration for a fixed TTL.
///
/// The cluster connection is established lazily and dropped whenever a
/// connect or list fails, so the next refresh reconnects. A failed refresh
/// leaves the previously stored snapshot in place.
pub struct LocalConfig<C: Connect> {
    connector: C,
    ttl: Duration,
    metrics: SynthesisMetrics,
    state: Mutex<State<C::Source>>,
}

struct State<S> {
    connection: Connection<S>,
    slot: Option<Slot>,
    synthesizer: Synthesizer,
}

enum Connection<S> {
    Disconnected,
    Connected(Arc<S>),
}

struct Slot {
    value: Arc<Configuration>,
    age: Instant,
}

// === impl LocalConfig ===

impl<C: Connect> LocalConfig<C> {
    pub fn new(
        connector: C,
        synthesizer: Synthesizer,
        ttl: Duration,
        metrics: SynthesisMetrics,
    ) -> Self {
        Self {
            connector,
            ttl,
            metrics,
            state: Mutex::new(State {
                connection: Connection::Disconnected,
                slot: None,
                synthesizer,
            }),
        }
    }

    pub async fn get(&self) -> Result<Arc<Configuration>> {
        let connected = {
            let state = self.state.lock();
            if let Some(slot) = &state.slot {
                if slot.age.elapsed() < self.ttl {
                    return Ok(slot.value.clone());
                }
            }
            match &state.connection {
                Connection::Connected(source) => Some(source.clone()),
                Connection::Disconnected => None,
            }
        };

        let source = match connected {
            Some(source) => source,
            None => self.connect().await?,
        };

        let records = match source.list_exported().await {
            Ok(records) => records,
            Err(error) => {
                self.disconnect();
                return Err(error);
            }
        };

        let mut state = self.state.lock();
        let Synthesis { config, counts } = state.synthesizer.synthesize(&records);
        self.metrics.observe(counts);

        let value = Arc::new(config);
        state.slot = Some(Slot {
            value: value.clone(),
            age: Instant::now(),
        });
        Ok(value)
    }

    async fn connect(&self) -> Result<Arc<C::Source>> {
        match self.connector.connect().await {
            Ok(source) => {
                info!("Connected to cluster");
                let source = Arc::new(source);
                self.state.lock().connection = Connection::Connected(source.clone());
                Ok(source)
            }
            Err(error) => {
                self.disconnect();
                Err(error).context("failed to connect to cluster")
            }
        }
    }

    fn disconnect(&self) {
        self.state.lock().connection = Connection::Disconnected;
    }
}

#[async_trait::async_trait]
impl<C: Connect> LocalSnapshot for LocalConfig<C> {
    async fn snapshot(&self) -> Result<Arc<Configuration>> {
        self.get().await
    }
}
