//! Per-page-load funnel bookkeeping.

use std::collections::BTreeSet;

use funnel_core::types::{FunnelStage, Properties};
use funnel_web_sdk::tracker::EventTracker;
use tracing::debug;

/// Lets each funnel stage through once per page load.
#[derive(Debug, Default)]
pub struct StageGate {
    fired: BTreeSet<FunnelStage>,
}

impl StageGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `stage` unless it already fired. Returns whether it was emitted.
    pub fn fire(
        &mut self,
        tracker: &EventTracker,
        stage: FunnelStage,
        properties: Option<Properties>,
    ) -> bool {
        if !self.fired.insert(stage) {
            debug!(stage = %stage, "funnel stage already tracked for this page");
            return false;
        }
        tracker.track_funnel(stage, properties);
        true
    }

    pub fn has_fired(&self, stage: FunnelStage) -> bool {
        self.fired.contains(&stage)
    }

    /// Let `stage` through once more, e.g. a page view on client-side
    /// navigation.
    pub fn release(&mut self, stage: FunnelStage) {
        self.fired.remove(&stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::sink::{capture_sink, SinkOptions};
    use funnel_core::storage::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_stage_fires_once_until_released() {
        let sink = capture_sink();
        let tracker = EventTracker::new(sink.clone(), Arc::new(MemoryStore::new()));
        tracker.init("phc_test", &SinkOptions::default());
        let mut gate = StageGate::new();

        assert!(gate.fire(&tracker, FunnelStage::PageView, None));
        assert!(!gate.fire(&tracker, FunnelStage::PageView, None));
        assert!(gate.fire(&tracker, FunnelStage::HeroView, None));

        gate.release(FunnelStage::PageView);
        assert!(!gate.has_fired(FunnelStage::PageView));
        assert!(gate.fire(&tracker, FunnelStage::PageView, None));
        assert!(!gate.fire(&tracker, FunnelStage::HeroView, None));
        assert_eq!(sink.count_named("page_view"), 2);
        assert_eq!(sink.count_named("hero_view"), 1);
    }
}
