//! Browser-side instrumentation hooks: section visibility, scroll depth and
//! page lifecycle observers that drive the event tracker.
//!
//! # Modules
//!
//! - [`lifecycle`]: Page-level owner wiring every observer to host callbacks
//! - [`section`]: Section visibility to funnel stage mapping and timing
//! - [`scroll`]: Frame-coalesced scroll depth milestones
//! - [`funnel`]: Once-per-page funnel stage gate

pub mod funnel;
pub mod lifecycle;
pub mod scroll;
pub mod section;

pub use funnel::StageGate;
pub use lifecycle::{PageInstrumentation, PagePhase, PAGE_SESSION_TIMER};
pub use scroll::{ScrollMetrics, ScrollTracker};
pub use section::{default_stage_map, SectionTracker};
