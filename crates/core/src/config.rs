use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::FunnelStage;

/// Root configuration. Loaded from an optional TOML file and environment
/// variables with the prefix `FUNNEL__`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub instrumentation: InstrumentationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub experiments: ExperimentsConfig,
}

/// Sink connection settings. Tracking stays disabled while `api_key` is unset.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default)]
    pub autocapture: bool,
    #[serde(default)]
    pub capture_pageview: bool,
    #[serde(default = "default_session_recording")]
    pub session_recording: bool,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentationConfig {
    /// Fraction of a section's area that must be visible to count as viewed.
    #[serde(default = "default_section_threshold")]
    pub section_threshold: f64,
    #[serde(default = "default_section_settle_delay_ms")]
    pub section_settle_delay_ms: u64,
    #[serde(default = "default_scroll_milestones")]
    pub scroll_milestones: Vec<u32>,
    #[serde(default = "default_entry_stages")]
    pub entry_stages: Vec<FunnelStage>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    /// File backing durable experiment assignments. In-memory when unset.
    #[serde(default)]
    pub durable_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExperimentsConfig {
    /// JSON catalog replacing the built-in site experiments.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

fn default_api_host() -> String {
    "https://app.posthog.com".to_string()
}
fn default_session_recording() -> bool {
    true
}
fn default_buffer_capacity() -> usize {
    100
}
fn default_section_threshold() -> f64 {
    0.5
}
fn default_section_settle_delay_ms() -> u64 {
    1000
}
fn default_scroll_milestones() -> Vec<u32> {
    vec![25, 50, 75, 90, 100]
}
fn default_entry_stages() -> Vec<FunnelStage> {
    vec![FunnelStage::PageView, FunnelStage::HeroView]
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_host: default_api_host(),
            autocapture: false,
            capture_pageview: false,
            session_recording: default_session_recording(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            section_threshold: default_section_threshold(),
            section_settle_delay_ms: default_section_settle_delay_ms(),
            scroll_milestones: default_scroll_milestones(),
            entry_stages: default_entry_stages(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("FUNNEL")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("instrumentation.scroll_milestones")
                    .with_list_parse_key("instrumentation.entry_stages"),
            )
            .build()?;
        config.try_deserialize()
    }
}
