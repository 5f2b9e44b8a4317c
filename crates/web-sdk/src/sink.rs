//! Buffered PostHog sink: turns sink calls into PostHog payloads, buffers
//! them and hands full batches to a transport.
//!
//! Delivery is best-effort: without a transport, auto-flushed batches are
//! dropped, and nothing is retried.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use funnel_core::error::{CoreError, CoreResult};
use funnel_core::sink::{AnalyticsSink, SinkOptions};
use funnel_core::types::{Event, FlagValue, Properties};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adaptors::posthog::{PosthogAdaptor, PosthogConfig};
use crate::adaptors::SinkAdaptor;

/// Receives `/batch` bodies when the buffer fills up.
pub type Transport = Arc<dyn Fn(Value) + Send + Sync>;

pub struct PosthogSink {
    adaptor: Mutex<Option<PosthogAdaptor>>,
    distinct_id: Mutex<String>,
    buffer: Mutex<Vec<Value>>,
    buffer_capacity: usize,
    flags: DashMap<String, FlagValue>,
    transport: Option<Transport>,
}

impl PosthogSink {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            adaptor: Mutex::new(None),
            distinct_id: Mutex::new(Uuid::new_v4().to_string()),
            buffer: Mutex::new(Vec::with_capacity(buffer_capacity)),
            buffer_capacity: buffer_capacity.max(1),
            flags: DashMap::new(),
            transport: None,
        }
    }

    /// Attach a transport receiving auto-flushed batches.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the locally known feature flags.
    pub fn load_flags<I>(&self, flags: I)
    where
        I: IntoIterator<Item = (String, FlagValue)>,
    {
        self.flags.clear();
        for (name, value) in flags {
            self.flags.insert(name, value);
        }
        debug!(count = self.flags.len(), "feature flags loaded");
    }

    pub fn distinct_id(&self) -> String {
        self.distinct_id.lock().clone()
    }

    /// Number of payloads currently buffered.
    pub fn buffered_count(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Drain the buffer into a `/batch` body. `None` when nothing is buffered
    /// or the sink was never initialized.
    pub fn flush(&self) -> Option<Value> {
        let flushed = std::mem::take(&mut *self.buffer.lock());
        if flushed.is_empty() {
            return None;
        }
        let adaptor = self.adaptor.lock();
        let adaptor = adaptor.as_ref()?;
        info!(count = flushed.len(), "flushed PostHog event buffer");
        Some(adaptor.batch(flushed))
    }

    fn push(&self, payload: Value) {
        let full = {
            let mut buffer = self.buffer.lock();
            buffer.push(payload);
            buffer.len() >= self.buffer_capacity
        };
        if !full {
            return;
        }
        if let Some(batch) = self.flush() {
            match &self.transport {
                Some(transport) => transport(batch),
                None => debug!("no transport attached, dropping flushed batch"),
            }
        }
    }

    fn with_adaptor<F>(&self, f: F)
    where
        F: FnOnce(&PosthogAdaptor) -> anyhow::Result<Value>,
    {
        let payload = {
            let adaptor = self.adaptor.lock();
            let Some(adaptor) = adaptor.as_ref() else {
                debug!("PostHog sink not initialized, dropping call");
                return;
            };
            f(adaptor)
        };
        match payload {
            Ok(payload) => self.push(payload),
            Err(e) => warn!(error = %e, "failed to build PostHog payload"),
        }
    }
}

impl AnalyticsSink for PosthogSink {
    fn init(&self, api_key: &str, options: &SinkOptions) -> CoreResult<()> {
        let adaptor = PosthogAdaptor::new(PosthogConfig {
            api_key: api_key.to_string(),
            api_host: options.api_host.clone(),
        });
        adaptor
            .validate_config()
            .map_err(|e| CoreError::Sink(e.to_string()))?;
        *self.adaptor.lock() = Some(adaptor);
        Ok(())
    }

    fn capture(&self, event: Event) {
        let distinct_id = self.distinct_id();
        self.with_adaptor(|adaptor| adaptor.transform(&event, &distinct_id));
    }

    fn identify(&self, user_id: &str, properties: Properties) {
        let anonymous_id = self.distinct_id();
        self.with_adaptor(|adaptor| {
            adaptor.identify_payload(user_id, &anonymous_id, &properties, Utc::now())
        });
        if self.adaptor.lock().is_some() {
            *self.distinct_id.lock() = user_id.to_string();
        }
    }

    fn set_user_properties(&self, properties: Properties) {
        let distinct_id = self.distinct_id();
        self.with_adaptor(|adaptor| adaptor.set_payload(&distinct_id, &properties, Utc::now()));
    }

    fn feature_flag(&self, name: &str) -> Option<FlagValue> {
        self.flags.get(name).map(|v| v.value().clone())
    }

    fn reset(&self) {
        *self.distinct_id.lock() = Uuid::new_v4().to_string();
        debug!("PostHog identity reset");
    }
}
