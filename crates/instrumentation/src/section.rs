//! Section visibility tracking: maps page sections to funnel stages and
//! times how long each stays on screen.
//!
//! The host feeds intersection ratios for attached sections. Crossing the
//! visibility threshold upward fires the section's funnel stage (once per
//! page load) and starts a `section_<id>` timer; crossing back down ends it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use funnel_core::types::{props, FunnelStage};
use funnel_web_sdk::tracker::EventTracker;
use tracing::{debug, trace};

use crate::funnel::StageGate;

/// Section ids on the landing page and the stage each one represents.
pub fn default_stage_map() -> HashMap<String, FunnelStage> {
    [
        ("why-schools", FunnelStage::ProblemSectionView),
        ("how-it-works", FunnelStage::HowItWorksView),
        ("courses", FunnelStage::CoursesView),
        ("results", FunnelStage::ResultsView),
        ("pricing", FunnelStage::PricingView),
    ]
    .into_iter()
    .map(|(id, stage)| (id.to_string(), stage))
    .collect()
}

pub fn section_timer(section_id: &str) -> String {
    format!("section_{section_id}")
}

pub struct SectionTracker {
    tracker: Arc<EventTracker>,
    threshold: f64,
    stage_map: HashMap<String, FunnelStage>,
    observed: HashSet<String>,
    visible: HashSet<String>,
}

impl SectionTracker {
    pub fn new(tracker: Arc<EventTracker>, threshold: f64) -> Self {
        Self {
            tracker,
            threshold,
            stage_map: default_stage_map(),
            observed: HashSet::new(),
            visible: HashSet::new(),
        }
    }

    /// Start observing the given section ids. Returns how many are observed.
    pub fn observe<I, S>(&mut self, section_ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.observed
            .extend(section_ids.into_iter().map(Into::into));
        debug!(sections = self.observed.len(), "observing page sections");
        self.observed.len()
    }

    pub fn is_observing(&self) -> bool {
        !self.observed.is_empty()
    }

    pub fn is_visible(&self, section_id: &str) -> bool {
        self.visible.contains(section_id)
    }

    /// Handle an intersection notification for `section_id`.
    pub fn on_intersection(&mut self, gate: &mut StageGate, section_id: &str, ratio: f64) {
        if !self.observed.contains(section_id) {
            trace!(section_id, "intersection for unobserved section ignored");
            return;
        }
        let now_visible = ratio >= self.threshold;
        let was_visible = self.visible.contains(section_id);

        match (was_visible, now_visible) {
            (false, true) => {
                self.visible.insert(section_id.to_string());
                self.entered(gate, section_id);
            }
            (true, false) => {
                self.visible.remove(section_id);
                self.tracker
                    .end_timer(&section_timer(section_id), Some(props([("section_id", section_id)])));
            }
            _ => {}
        }
    }

    fn entered(&mut self, gate: &mut StageGate, section_id: &str) {
        let Some(stage) = self.stage_map.get(section_id).copied() else {
            trace!(section_id, "section has no funnel stage");
            return;
        };
        gate.fire(
            &self.tracker,
            stage,
            Some(props([("section_id", section_id)])),
        );
        self.tracker.start_timer(&section_timer(section_id));
    }
}
