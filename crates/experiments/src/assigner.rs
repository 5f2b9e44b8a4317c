//! Sticky variant assignment persisted in durable storage.
//!
//! The first read of an experiment draws a variant, stores it under
//! `experiment_<name>` and logs an `experiment_viewed` event. Later reads
//! return the stored label as long as it is still one of the experiment's
//! variants; stale labels are discarded and re-rolled.

use std::collections::BTreeMap;
use std::sync::Arc;

use funnel_core::storage::{experiment_key, KeyValueStore, EXPERIMENT_KEY_PREFIX};
use funnel_web_sdk::tracker::EventTracker;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, info, warn};

use crate::experiment::{select_variant, Experiment};

pub struct VariantAssigner {
    store: Arc<dyn KeyValueStore>,
    tracker: Arc<EventTracker>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl VariantAssigner {
    pub fn new(store: Arc<dyn KeyValueStore>, tracker: Arc<EventTracker>) -> Self {
        Self {
            store,
            tracker,
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
        }
    }

    /// Replace the random source, e.g. with a seeded generator.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    /// Return the sticky variant for `experiment`, assigning one if needed.
    pub fn get_variant(&self, experiment: &Experiment) -> String {
        if let Some(variant) = self.persisted(experiment) {
            return variant;
        }

        let r: f64 = self.rng.lock().gen();
        let variant = select_variant(experiment, r).to_string();
        self.persist(experiment.name(), &variant);
        info!(experiment = experiment.name(), variant = %variant, "variant assigned");
        self.tracker.track_variant(experiment.name(), &variant, None);
        variant
    }

    /// Overwrite the stored assignment for QA and tests.
    pub fn force_variant(&self, experiment_name: &str, variant: &str) {
        self.persist(experiment_name, variant);
        info!(experiment = experiment_name, variant, "variant forced");
        self.tracker.track_variant(experiment_name, variant, None);
    }

    /// Delete every stored assignment.
    pub fn clear_all_experiments(&self) {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list experiment assignments");
                return;
            }
        };
        let mut cleared = 0usize;
        for key in keys.iter().filter(|k| k.starts_with(EXPERIMENT_KEY_PREFIX)) {
            match self.store.remove(key) {
                Ok(()) => cleared += 1,
                Err(e) => warn!(key = %key, error = %e, "failed to clear assignment"),
            }
        }
        info!(cleared, "experiment assignments cleared");
    }

    /// Every stored assignment, keyed by experiment name.
    pub fn active_experiments(&self) -> BTreeMap<String, String> {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list experiment assignments");
                return BTreeMap::new();
            }
        };
        keys.into_iter()
            .filter_map(|key| {
                let name = key.strip_prefix(EXPERIMENT_KEY_PREFIX)?.to_string();
                let variant = self.store.get(&key).ok().flatten()?;
                (!variant.is_empty()).then_some((name, variant))
            })
            .collect()
    }

    fn persisted(&self, experiment: &Experiment) -> Option<String> {
        let stored = match self.store.get(&experiment_key(experiment.name())) {
            Ok(stored) => stored?,
            Err(e) => {
                warn!(experiment = experiment.name(), error = %e, "failed to read assignment");
                return None;
            }
        };
        if experiment.has_variant(&stored) {
            return Some(stored);
        }
        debug!(
            experiment = experiment.name(),
            stale = %stored,
            "stored variant no longer valid, reassigning"
        );
        None
    }

    fn persist(&self, experiment_name: &str, variant: &str) {
        if let Err(e) = self.store.set(&experiment_key(experiment_name), variant) {
            warn!(experiment = experiment_name, error = %e, "failed to persist assignment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::sink::{capture_sink, CaptureSink, SinkOptions};
    use funnel_core::storage::MemoryStore;
    use funnel_core::types::FlagValue;
    use funnel_web_sdk::tracker::EXPERIMENT_VIEWED_EVENT;
    use rand::rngs::mock::StepRng;

    struct Fixture {
        sink: Arc<CaptureSink>,
        store: Arc<MemoryStore>,
        tracker: Arc<EventTracker>,
    }

    fn fixture() -> Fixture {
        let sink = capture_sink();
        let tracker = Arc::new(EventTracker::new(sink.clone(), Arc::new(MemoryStore::new())));
        tracker.init("phc_test", &SinkOptions::default());
        Fixture {
            sink,
            store: Arc::new(MemoryStore::new()),
            tracker,
        }
    }

    fn assigner(f: &Fixture, seed: u64) -> VariantAssigner {
        VariantAssigner::new(f.store.clone(), f.tracker.clone()).with_rng(StdRng::seed_from_u64(seed))
    }

    fn cta_text() -> Experiment {
        Experiment::new(
            "cta_text",
            ["book_call", "schedule_demo", "get_started"],
            Some(vec![0.34, 0.33, 0.33]),
        )
        .unwrap()
    }

    /// A mock generator whose first `f64` draw is `r`.
    fn fixed_draw(r: f64) -> StepRng {
        // rand's f64 sampling takes the top 53 bits of a u64.
        StepRng::new((r * (1u64 << 53) as f64) as u64 * (1 << 11), 0)
    }

    #[test]
    fn test_first_assignment_persists_and_emits_once() {
        let f = fixture();
        let assigner = VariantAssigner::new(f.store.clone(), f.tracker.clone())
            .with_rng(fixed_draw(0.10));

        assert_eq!(assigner.get_variant(&cta_text()), "book_call");
        assert_eq!(
            f.store.get("experiment_cta_text").unwrap().as_deref(),
            Some("book_call")
        );
        let events = f.sink.events_named(EXPERIMENT_VIEWED_EVENT);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].property("experiment").and_then(|v| v.as_str()),
            Some("cta_text")
        );
        assert_eq!(
            events[0].property("variant").and_then(|v| v.as_str()),
            Some("book_call")
        );

        // Repeat reads are sticky and silent.
        assert_eq!(assigner.get_variant(&cta_text()), "book_call");
        assert_eq!(f.sink.count_named(EXPERIMENT_VIEWED_EVENT), 1);
    }

    #[test]
    fn test_get_variant_is_idempotent() {
        let f = fixture();
        let assigner = assigner(&f, 7);
        let first = assigner.get_variant(&cta_text());
        for _ in 0..20 {
            assert_eq!(assigner.get_variant(&cta_text()), first);
        }
    }

    #[test]
    fn test_force_variant_overrides() {
        let f = fixture();
        let assigner = assigner(&f, 1);
        assigner.get_variant(&cta_text());
        assigner.force_variant("cta_text", "get_started");
        assert_eq!(assigner.get_variant(&cta_text()), "get_started");
        assert_eq!(f.sink.count_named(EXPERIMENT_VIEWED_EVENT), 2);
    }

    #[test]
    fn test_stale_assignment_is_reassigned() {
        let f = fixture();
        f.store.set("experiment_cta_text", "talk_to_sales").unwrap();
        let assigner = assigner(&f, 3);

        let variant = assigner.get_variant(&cta_text());
        assert!(cta_text().has_variant(&variant));
        assert_eq!(
            f.store.get("experiment_cta_text").unwrap().as_deref(),
            Some(variant.as_str())
        );
        assert_eq!(f.sink.count_named(EXPERIMENT_VIEWED_EVENT), 1);
    }

    #[test]
    fn test_clear_all_rerolls() {
        let f = fixture();
        f.store.set("timer_page_session", "1").unwrap();
        let assigner = VariantAssigner::new(f.store.clone(), f.tracker.clone())
            .with_rng(fixed_draw(0.10));
        assigner.get_variant(&cta_text());
        assert_eq!(assigner.active_experiments().len(), 1);

        assigner.clear_all_experiments();
        assert!(assigner.active_experiments().is_empty());
        // Non-experiment keys are untouched.
        assert!(f.store.get("timer_page_session").unwrap().is_some());

        assigner.get_variant(&cta_text());
        assert_eq!(f.sink.count_named(EXPERIMENT_VIEWED_EVENT), 2);
    }

    #[test]
    fn test_active_experiments() {
        let f = fixture();
        let assigner = assigner(&f, 11);
        let hero = Experiment::new("hero_headline", ["original", "question_format"], None).unwrap();
        let cta = assigner.get_variant(&cta_text());
        let headline = assigner.get_variant(&hero);

        let active = assigner.active_experiments();
        assert_eq!(active.get("cta_text"), Some(&cta));
        assert_eq!(active.get("hero_headline"), Some(&headline));
    }

    #[test]
    fn test_weighted_distribution_converges() {
        let f = fixture();
        let assigner = assigner(&f, 42);
        let exp = Experiment::new("split", ["a", "b", "c"], Some(vec![0.5, 0.3, 0.2])).unwrap();

        let trials = 20_000;
        let mut counts = BTreeMap::new();
        for _ in 0..trials {
            assigner.clear_all_experiments();
            *counts.entry(assigner.get_variant(&exp)).or_insert(0usize) += 1;
        }
        for (variant, expected) in [("a", 0.5), ("b", 0.3), ("c", 0.2)] {
            let observed = counts[variant] as f64 / trials as f64;
            assert!(
                (observed - expected).abs() < 0.02,
                "{variant}: observed {observed}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_local_assignment_ignores_remote_flag() {
        let f = fixture();
        f.sink
            .set_flag("cta_text", FlagValue::Variant("schedule_demo".into()));
        let assigner = VariantAssigner::new(f.store.clone(), f.tracker.clone())
            .with_rng(fixed_draw(0.10));

        assert_eq!(assigner.get_variant(&cta_text()), "book_call");
        assert_eq!(
            f.tracker.feature_flag_variant("cta_text", "control"),
            "schedule_demo"
        );
    }

    #[test]
    fn test_uninitialized_tracker_still_assigns() {
        let store = Arc::new(MemoryStore::new());
        let sink = capture_sink();
        let tracker = Arc::new(EventTracker::new(sink.clone(), Arc::new(MemoryStore::new())));
        let assigner = VariantAssigner::new(store.clone(), tracker).with_rng(StdRng::seed_from_u64(5));

        let variant = assigner.get_variant(&cta_text());
        assert!(cta_text().has_variant(&variant));
        assert_eq!(sink.count(), 0);
    }
}
