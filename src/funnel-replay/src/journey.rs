//! Scripted visitor journeys.
//!
//! A journey is a JSON document describing one page load: the landing URL,
//! the sections present on the page, remote feature flags, and a timeline
//! of browser notifications. [`replay`] drives a [`PageInstrumentation`]
//! through that timeline the same way a browser host would.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use funnel_core::clock::{Clock, ManualClock, SystemClock};
use funnel_core::types::{ConversionEvent, FlagValue, InteractionEvent, Properties};
use funnel_instrumentation::{PageInstrumentation, ScrollMetrics};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::context::AppContext;

#[derive(Debug, Clone, Deserialize)]
pub struct Journey {
    pub url: String,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub flags: HashMap<String, FlagValue>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Milliseconds since mount.
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Scroll {
        scroll_top: f64,
        viewport_height: f64,
        document_height: f64,
    },
    Frame,
    Intersect {
        section_id: String,
        ratio: f64,
    },
    Navigate {
        url: String,
    },
    Conversion {
        event: ConversionEvent,
        #[serde(default)]
        properties: Option<Properties>,
    },
    Interaction {
        event: InteractionEvent,
        #[serde(default)]
        properties: Option<Properties>,
    },
    Identify {
        user_id: String,
        #[serde(default)]
        properties: Option<Properties>,
    },
    Unload,
}

impl Journey {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("invalid journey document")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read journey {}", path.display()))?;
        Self::from_json(&raw)
    }
}

/// How the journey timeline maps onto time.
pub enum Pacing {
    /// Sleep between steps; the tracker reads the wall clock.
    Realtime,
    /// Run steps back to back, moving this clock to each step's offset.
    Scripted(Arc<ManualClock>),
}

impl Pacing {
    pub fn scripted() -> Self {
        Pacing::Scripted(Arc::new(ManualClock::default()))
    }

    /// The time source the tracker must be built with.
    pub fn clock(&self) -> Arc<dyn Clock> {
        match self {
            Pacing::Realtime => Arc::new(SystemClock),
            Pacing::Scripted(clock) => clock.clone(),
        }
    }

    async fn advance(&self, delta_ms: u64) {
        match self {
            Pacing::Realtime => tokio::time::sleep(Duration::from_millis(delta_ms)).await,
            Pacing::Scripted(clock) => clock.advance_ms(delta_ms as i64),
        }
    }
}

/// What the visitor saw, alongside the captured batches.
#[derive(Debug, Default, Serialize)]
pub struct ReplaySummary {
    pub assignments: BTreeMap<String, String>,
    pub remote_flags: BTreeMap<String, String>,
    pub sections_attached: usize,
    pub steps: usize,
}

/// Play `journey` against a fresh page. `pacing` must be the one whose
/// clock `ctx` was built with.
pub async fn replay(
    ctx: &AppContext,
    journey: Journey,
    pacing: &Pacing,
) -> anyhow::Result<ReplaySummary> {
    let url = Url::parse(&journey.url)
        .with_context(|| format!("invalid journey url {}", journey.url))?;

    ctx.sink.load_flags(journey.flags);

    let mut page = ctx.page();
    page.mount(url);

    let mut summary = ReplaySummary::default();
    for resolved in ctx.catalog.resolve_all(&ctx.assigner) {
        info!(
            experiment = %resolved.experiment,
            variant = %resolved.variant,
            config = %serde_json::Value::Object(resolved.config.clone()),
            "experiment resolved"
        );
        let remote = ctx
            .tracker
            .feature_flag_variant(&resolved.experiment, "control");
        summary.remote_flags.insert(resolved.experiment.clone(), remote);
        summary.assignments.insert(resolved.experiment, resolved.variant);
    }

    let settle_ms = page.settle_delay().as_millis() as u64;
    let mut steps = journey.steps;
    steps.sort_by_key(|s| s.at_ms);

    let mut attach_at = Some(settle_ms);
    let mut frame_pending = false;
    let mut elapsed_ms = 0u64;

    for step in steps {
        if step.at_ms > elapsed_ms {
            pacing.advance(step.at_ms - elapsed_ms).await;
        }
        elapsed_ms = elapsed_ms.max(step.at_ms);

        if attach_at.is_some_and(|due| elapsed_ms >= due) {
            summary.sections_attached = page.attach_sections(journey.sections.iter().cloned());
            attach_at = None;
        }

        match step.action {
            Action::Scroll {
                scroll_top,
                viewport_height,
                document_height,
            } => {
                let metrics = ScrollMetrics {
                    scroll_top,
                    viewport_height,
                    document_height,
                };
                frame_pending |= page.on_scroll(metrics);
            }
            Action::Frame => {
                page.on_animation_frame();
                frame_pending = false;
            }
            action => {
                // The browser runs a requested frame before the next task.
                if frame_pending {
                    page.on_animation_frame();
                    frame_pending = false;
                }
                apply(ctx, &mut page, action);
            }
        }
        summary.steps += 1;
        debug!(at_ms = step.at_ms, "journey step applied");
    }

    if frame_pending {
        page.on_animation_frame();
    }
    page.unload();
    page.unmount();

    Ok(summary)
}

/// Apply one non-scroll action.
fn apply(ctx: &AppContext, page: &mut PageInstrumentation, action: Action) {
    match action {
        Action::Intersect { section_id, ratio } => page.on_intersection(&section_id, ratio),
        Action::Navigate { url } => match Url::parse(&url) {
            Ok(url) => page.route_changed(url),
            Err(e) => warn!(url = %url, error = %e, "skipping navigation to invalid url"),
        },
        Action::Conversion { event, properties } => {
            ctx.tracker.track_conversion(event, properties)
        }
        Action::Interaction { event, properties } => {
            ctx.tracker.track_interaction(event, properties)
        }
        Action::Identify {
            user_id,
            properties,
        } => ctx.tracker.identify(&user_id, properties),
        Action::Unload => page.unload(),
        Action::Scroll { .. } | Action::Frame => {}
    }
}
