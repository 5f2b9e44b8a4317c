//! Page instrumentation. One owner for everything observed during a page
//! load: page views, entry funnel stages, the session timer, section
//! visibility and scroll depth.
//!
//! The host drives it with browser callbacks. Nothing here blocks or fails;
//! after [`PageInstrumentation::unmount`] every callback is ignored.

use std::sync::Arc;
use std::time::Duration;

use funnel_core::config::InstrumentationConfig;
use funnel_core::types::{props, FunnelStage};
use funnel_web_sdk::tracker::EventTracker;
use tracing::{debug, info};
use url::Url;

use crate::funnel::StageGate;
use crate::scroll::{ScrollMetrics, ScrollTracker};
use crate::section::SectionTracker;

pub const PAGE_SESSION_TIMER: &str = "page_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePhase {
    Idle,
    Mounted,
    Detached,
}

pub struct PageInstrumentation {
    tracker: Arc<EventTracker>,
    config: InstrumentationConfig,
    phase: PagePhase,
    gate: StageGate,
    sections: SectionTracker,
    scroll: ScrollTracker,
}

impl PageInstrumentation {
    pub fn new(tracker: Arc<EventTracker>, config: InstrumentationConfig) -> Self {
        let sections = SectionTracker::new(tracker.clone(), config.section_threshold);
        let scroll = ScrollTracker::new(tracker.clone(), &config.scroll_milestones);
        Self {
            tracker,
            config,
            phase: PagePhase::Idle,
            gate: StageGate::new(),
            sections,
            scroll,
        }
    }

    pub fn phase(&self) -> PagePhase {
        self.phase
    }

    /// How long after mount the host should wait before attaching sections.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.config.section_settle_delay_ms)
    }

    pub fn gate(&self) -> &StageGate {
        &self.gate
    }

    pub fn scroll(&self) -> &ScrollTracker {
        &self.scroll
    }

    pub fn mount(&mut self, url: Url) {
        if self.phase != PagePhase::Idle {
            debug!(phase = ?self.phase, "mount ignored");
            return;
        }
        self.phase = PagePhase::Mounted;
        info!(path = url.path(), "page instrumentation mounted");

        self.tracker.set_location(url);
        self.tracker.track_page_view(None);
        for &stage in &self.config.entry_stages {
            self.gate.fire(&self.tracker, stage, None);
        }
        self.tracker.start_timer(PAGE_SESSION_TIMER);
    }

    /// Attach section observers once the DOM has settled.
    pub fn attach_sections<I, S>(&mut self, section_ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.phase != PagePhase::Mounted {
            return 0;
        }
        self.sections.observe(section_ids)
    }

    pub fn on_intersection(&mut self, section_id: &str, ratio: f64) {
        if self.phase != PagePhase::Mounted {
            return;
        }
        self.sections
            .on_intersection(&mut self.gate, section_id, ratio);
    }

    /// Returns `true` when the host must schedule an animation frame.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        if self.phase != PagePhase::Mounted {
            return false;
        }
        self.scroll.on_scroll(metrics)
    }

    pub fn on_animation_frame(&mut self) {
        if self.phase != PagePhase::Mounted {
            return;
        }
        self.scroll.on_animation_frame();
    }

    /// Client-side navigation within the same page lifecycle: a fresh page
    /// view and `page_view` stage tagged with the new path. Scroll
    /// milestones, section stages and experiment assignments carry over.
    pub fn route_changed(&mut self, url: Url) {
        if self.phase != PagePhase::Mounted {
            return;
        }
        let path = url.path().to_string();
        info!(from = ?self.tracker.current_path(), to = %path, "route changed");

        self.tracker.set_location(url);
        self.tracker
            .track_page_view(Some(props([("path", path.as_str())])));
        self.gate.release(FunnelStage::PageView);
        self.gate.fire(
            &self.tracker,
            FunnelStage::PageView,
            Some(props([("path", path.as_str())])),
        );
    }

    /// Best-effort final report before the page goes away.
    pub fn unload(&mut self) {
        if self.phase != PagePhase::Mounted {
            return;
        }
        self.scroll.on_unload();
    }

    /// Flush the session timer and detach every observer.
    pub fn unmount(&mut self) {
        if self.phase != PagePhase::Mounted {
            return;
        }
        self.tracker.end_timer(PAGE_SESSION_TIMER, None);
        self.phase = PagePhase::Detached;
        info!("page instrumentation detached");
    }
}
