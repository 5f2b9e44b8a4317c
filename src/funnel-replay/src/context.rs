//! Application context. Builds the tracker, assigner and catalog once and
//! hands them to whoever needs them. Replaces ambient singletons.

use std::sync::Arc;

use funnel_core::clock::{Clock, SystemClock};
use funnel_core::config::AppConfig;
use funnel_core::sink::SinkOptions;
use funnel_core::storage::{FileStore, KeyValueStore, MemoryStore};
use funnel_experiments::{ExperimentCatalog, VariantAssigner};
use funnel_instrumentation::PageInstrumentation;
use funnel_web_sdk::tracker::EventTracker;
use funnel_web_sdk::PosthogSink;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

pub struct AppContext {
    pub config: AppConfig,
    pub sink: Arc<PosthogSink>,
    pub tracker: Arc<EventTracker>,
    pub assigner: Arc<VariantAssigner>,
    pub catalog: ExperimentCatalog,
    delivered: Arc<Mutex<Vec<Value>>>,
}

impl AppContext {
    pub fn build(config: AppConfig) -> Self {
        Self::build_with_clock(config, Arc::new(SystemClock))
    }

    /// Build with `clock` as the tracker's time source for timers and event
    /// timestamps.
    pub fn build_with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Self {
        let delivered: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let outbox = delivered.clone();
        let sink = Arc::new(
            PosthogSink::new(config.analytics.buffer_capacity)
                .with_transport(Arc::new(move |batch: Value| outbox.lock().push(batch))),
        );

        let session_store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let durable_store: Arc<dyn KeyValueStore> = match &config.storage.durable_path {
            Some(path) => Arc::new(FileStore::open(path)),
            None => Arc::new(MemoryStore::new()),
        };

        let tracker = Arc::new(EventTracker::new(sink.clone(), session_store).with_clock(clock));
        match config.analytics.api_key.as_deref() {
            Some(key) => {
                tracker.init(key, &SinkOptions::from(&config.analytics));
            }
            None => warn!("no analytics api key configured, events will not be captured"),
        }

        let assigner = Arc::new(VariantAssigner::new(durable_store, tracker.clone()));

        let catalog = match &config.experiments.catalog_path {
            Some(path) => ExperimentCatalog::load(path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load catalog, using built-in experiments");
                ExperimentCatalog::builtin()
            }),
            None => ExperimentCatalog::builtin(),
        };

        info!(
            tracking = tracker.is_initialized(),
            experiments = catalog.experiments().count(),
            "application context ready"
        );

        Self {
            config,
            sink,
            tracker,
            assigner,
            catalog,
            delivered,
        }
    }

    /// Fresh instrumentation for one page load.
    pub fn page(&self) -> PageInstrumentation {
        PageInstrumentation::new(self.tracker.clone(), self.config.instrumentation.clone())
    }

    /// Flush the sink and return every batch produced during the run.
    pub fn shutdown(self) -> Vec<Value> {
        if let Some(batch) = self.sink.flush() {
            self.delivered.lock().push(batch);
        }
        let batches = std::mem::take(&mut *self.delivered.lock());
        info!(batches = batches.len(), "application context shut down");
        batches
    }
}
