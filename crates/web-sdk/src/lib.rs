//! Client-side analytics SDK: the event tracker driving funnel, conversion,
//! timer and scroll instrumentation, plus a buffered PostHog sink.
//!
//! # Modules
//!
//! - [`tracker`]: Event tracker normalizing events for the sink
//! - [`sink`]: Buffered PostHog implementation of the sink contract
//! - [`adaptors`]: Payload adaptors for analytics platforms (PostHog)

pub mod adaptors;
pub mod sink;
pub mod tracker;

pub use adaptors::posthog::PosthogAdaptor;
pub use adaptors::SinkAdaptor;
pub use sink::PosthogSink;
pub use tracker::{EventTracker, TrackerState};
