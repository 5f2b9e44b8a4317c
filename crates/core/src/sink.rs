//! Analytics sink: the capability contract every telemetry backend satisfies.
//!
//! The tracker holds an `Arc<dyn AnalyticsSink>` and forwards normalized
//! events into it. Delivery, batching and network behaviour belong to the
//! sink; callers treat every call as fire-and-forget.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::types::{Event, FlagValue, Properties};

/// Options passed to a sink on initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkOptions {
    pub api_host: String,
    pub autocapture: bool,
    pub capture_pageview: bool,
    pub session_recording: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            api_host: "https://app.posthog.com".to_string(),
            autocapture: false,
            capture_pageview: false,
            session_recording: true,
        }
    }
}

impl From<&crate::config::AnalyticsConfig> for SinkOptions {
    fn from(config: &crate::config::AnalyticsConfig) -> Self {
        Self {
            api_host: config.api_host.clone(),
            autocapture: config.autocapture,
            capture_pageview: config.capture_pageview,
            session_recording: config.session_recording,
        }
    }
}

/// Trait for telemetry backends.
pub trait AnalyticsSink: Send + Sync {
    fn init(&self, api_key: &str, options: &SinkOptions) -> CoreResult<()>;
    fn capture(&self, event: Event);
    fn identify(&self, user_id: &str, properties: Properties);
    fn set_user_properties(&self, properties: Properties);
    fn feature_flag(&self, name: &str) -> Option<FlagValue>;
    fn reset(&self);
}

/// No-op sink for hosts without a configured backend.
pub struct NoOpSink;

impl AnalyticsSink for NoOpSink {
    fn init(&self, _api_key: &str, _options: &SinkOptions) -> CoreResult<()> {
        Ok(())
    }
    fn capture(&self, _event: Event) {}
    fn identify(&self, _user_id: &str, _properties: Properties) {}
    fn set_user_properties(&self, _properties: Properties) {}
    fn feature_flag(&self, _name: &str) -> Option<FlagValue> {
        None
    }
    fn reset(&self) {}
}

/// Every call a [`CaptureSink`] observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Init { api_key: String, options: SinkOptions },
    Capture(Event),
    Identify { user_id: String, properties: Properties },
    SetUserProperties(Properties),
    Reset,
}

/// In-memory sink that records calls for testing.
#[derive(Default)]
pub struct CaptureSink {
    calls: Mutex<Vec<SinkCall>>,
    flags: Mutex<HashMap<String, FlagValue>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `value` for subsequent flag lookups of `name`.
    pub fn set_flag(&self, name: impl Into<String>, value: FlagValue) {
        self.flags.lock().insert(name.into(), value);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    /// Captured events only, in emission order.
    pub fn events(&self) -> Vec<Event> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Capture(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events().len()
    }

    pub fn count_named(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name == name).count()
    }

    pub fn events_named(&self, name: &str) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.name == name).collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl AnalyticsSink for CaptureSink {
    fn init(&self, api_key: &str, options: &SinkOptions) -> CoreResult<()> {
        self.calls.lock().push(SinkCall::Init {
            api_key: api_key.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    fn capture(&self, event: Event) {
        self.calls.lock().push(SinkCall::Capture(event));
    }

    fn identify(&self, user_id: &str, properties: Properties) {
        self.calls.lock().push(SinkCall::Identify {
            user_id: user_id.to_string(),
            properties,
        });
    }

    fn set_user_properties(&self, properties: Properties) {
        self.calls.lock().push(SinkCall::SetUserProperties(properties));
    }

    fn feature_flag(&self, name: &str) -> Option<FlagValue> {
        self.flags.lock().get(name).cloned()
    }

    fn reset(&self) {
        self.calls.lock().push(SinkCall::Reset);
    }
}

/// Convenience: a sink that drops everything.
pub fn noop_sink() -> Arc<dyn AnalyticsSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
