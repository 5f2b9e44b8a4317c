//! PostHog adaptor: transforms tracker events into PostHog capture API
//! payloads (`/capture` single events and `/batch` bodies).

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;

use super::SinkAdaptor;
use funnel_core::types::{Event, Properties};

/// Library tag stamped on every payload.
pub const LIB_NAME: &str = "funnel-web-sdk";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosthogConfig {
    /// Project API key, e.g. "phc_...".
    pub api_key: String,
    pub api_host: String,
}

pub struct PosthogAdaptor {
    config: PosthogConfig,
}

impl PosthogAdaptor {
    pub fn new(config: PosthogConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PosthogConfig {
        &self.config
    }

    /// Endpoint batches are posted to.
    pub fn batch_endpoint(&self) -> Result<Url> {
        let base = Url::parse(&self.config.api_host)?;
        Ok(base.join("/batch/")?)
    }

    /// Build a capture payload from already-shaped properties.
    pub fn payload(
        &self,
        event_name: &str,
        distinct_id: &str,
        mut properties: Map<String, Value>,
        timestamp: DateTime<Utc>,
    ) -> Value {
        properties.insert("$lib".into(), json!(LIB_NAME));
        json!({
            "api_key": self.config.api_key,
            "event": event_name,
            "distinct_id": distinct_id,
            "properties": properties,
            "timestamp": timestamp.to_rfc3339(),
        })
    }

    /// `$identify` payload linking the anonymous id to `user_id`.
    pub fn identify_payload(
        &self,
        user_id: &str,
        anonymous_id: &str,
        traits: &Properties,
        timestamp: DateTime<Utc>,
    ) -> Result<Value> {
        let mut properties = Map::new();
        properties.insert("$anon_distinct_id".into(), json!(anonymous_id));
        properties.insert("$set".into(), serde_json::to_value(traits)?);
        Ok(self.payload("$identify", user_id, properties, timestamp))
    }

    /// `$set` payload updating person properties.
    pub fn set_payload(
        &self,
        distinct_id: &str,
        traits: &Properties,
        timestamp: DateTime<Utc>,
    ) -> Result<Value> {
        let mut properties = Map::new();
        properties.insert("$set".into(), serde_json::to_value(traits)?);
        Ok(self.payload("$set", distinct_id, properties, timestamp))
    }

    /// Wrap payloads into a `/batch` body.
    pub fn batch(&self, payloads: Vec<Value>) -> Value {
        json!({
            "api_key": self.config.api_key,
            "batch": payloads,
        })
    }
}

impl SinkAdaptor for PosthogAdaptor {
    fn platform(&self) -> &str {
        "posthog"
    }

    fn transform(&self, event: &Event, distinct_id: &str) -> Result<Value> {
        let properties = match serde_json::to_value(&event.properties)? {
            Value::Object(map) => map,
            other => return Err(anyhow!("event properties must be an object, got {other}")),
        };
        let payload = self.payload(&event.name, distinct_id, properties, event.timestamp);

        debug!(event = %event.name, distinct_id, "PostHog event transformed");
        Ok(payload)
    }

    fn validate_config(&self) -> Result<()> {
        if self.config.api_key.trim().is_empty() {
            return Err(anyhow!("PostHog api_key must not be empty"));
        }
        let host = Url::parse(&self.config.api_host)
            .map_err(|e| anyhow!("PostHog api_host '{}' is invalid: {e}", self.config.api_host))?;
        if !matches!(host.scheme(), "http" | "https") {
            return Err(anyhow!(
                "PostHog api_host must be http(s), got '{}'",
                host.scheme()
            ));
        }
        Ok(())
    }
}
