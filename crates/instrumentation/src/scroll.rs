//! Scroll depth tracking with once-per-page milestones.
//!
//! Scroll notifications are coalesced: the first one after a frame asks the
//! host for an animation frame, later ones only replace the pending sample.
//! Depth is computed when the frame runs.

use std::collections::BTreeSet;
use std::sync::Arc;

use funnel_core::types::props;
use funnel_web_sdk::tracker::EventTracker;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Viewport geometry at the time of a scroll notification, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub document_height: f64,
}

impl ScrollMetrics {
    /// Share of the document seen so far, as a rounded percentage.
    pub fn percentage(&self) -> Option<u32> {
        if !(self.document_height.is_finite() && self.document_height > 0.0) {
            return None;
        }
        let seen = (self.scroll_top + self.viewport_height) / self.document_height * 100.0;
        if !seen.is_finite() {
            return None;
        }
        Some(seen.round().max(0.0) as u32)
    }
}

pub struct ScrollTracker {
    tracker: Arc<EventTracker>,
    milestones: Vec<u32>,
    running_max: u32,
    triggered: BTreeSet<u32>,
    pending: Option<ScrollMetrics>,
    frame_requested: bool,
    final_sent: bool,
}

impl ScrollTracker {
    pub fn new(tracker: Arc<EventTracker>, milestones: &[u32]) -> Self {
        let mut milestones = milestones.to_vec();
        milestones.sort_unstable();
        milestones.dedup();
        Self {
            tracker,
            milestones,
            running_max: 0,
            triggered: BTreeSet::new(),
            pending: None,
            frame_requested: false,
            final_sent: false,
        }
    }

    /// Record a scroll notification. Returns `true` when the host must
    /// schedule an animation frame.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        self.pending = Some(metrics);
        if self.frame_requested {
            return false;
        }
        self.frame_requested = true;
        true
    }

    /// Process the latest pending sample.
    pub fn on_animation_frame(&mut self) {
        self.frame_requested = false;
        let Some(metrics) = self.pending.take() else {
            return;
        };
        let Some(percentage) = metrics.percentage() else {
            trace!(?metrics, "ignoring scroll sample without document height");
            return;
        };
        self.running_max = self.running_max.max(percentage);

        for &milestone in &self.milestones {
            if percentage >= milestone && self.triggered.insert(milestone) {
                debug!(milestone, "scroll milestone reached");
                self.tracker.track_scroll_depth(milestone, None);
            }
        }
    }

    /// Report the deepest scroll as final, if any milestone was reached.
    pub fn on_unload(&mut self) {
        if self.final_sent || self.triggered.is_empty() {
            return;
        }
        self.final_sent = true;
        self.tracker
            .track_scroll_depth(self.running_max, Some(props([("final", true)])));
    }

    pub fn running_max(&self) -> u32 {
        self.running_max
    }
}
