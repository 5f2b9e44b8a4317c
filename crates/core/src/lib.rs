//! Shared building blocks for funnel instrumentation: configuration, errors,
//! event types, the analytics sink contract and storage.

pub mod clock;
pub mod config;
pub mod error;
pub mod sink;
pub mod storage;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{CoreError, CoreResult};
pub use sink::{AnalyticsSink, CaptureSink, NoOpSink, SinkCall, SinkOptions};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use types::{
    props, ConversionEvent, Event, FlagValue, FunnelStage, InteractionEvent, Properties,
    PropertyValue,
};
