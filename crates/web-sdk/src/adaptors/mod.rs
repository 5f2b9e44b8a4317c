//! Adaptors translating tracker events into third-party analytics payloads.
//!
//! Each adaptor implements [`SinkAdaptor`] to turn an [`Event`] into the JSON
//! body its ingestion endpoint expects.

pub mod posthog;

use anyhow::Result;
use funnel_core::types::Event;

/// Adaptor trait: transforms events into a platform-specific JSON payload.
pub trait SinkAdaptor: Send + Sync {
    /// Platform identifier (e.g. "posthog").
    fn platform(&self) -> &str;

    /// Transform an event captured for `distinct_id` into the platform payload.
    fn transform(&self, event: &Event, distinct_id: &str) -> Result<serde_json::Value>;

    /// Validate that the adaptor configuration is correct.
    fn validate_config(&self) -> Result<()>;
}
