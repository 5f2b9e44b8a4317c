//! Event tracker: normalizes funnel, conversion, interaction, timer and
//! scroll events and forwards them to the configured analytics sink.
//!
//! The tracker starts uninitialized. Until a single successful
//! [`EventTracker::init`] every tracking call is a silent no-op, so callers
//! never need to guard on configuration.

use std::sync::Arc;

use funnel_core::clock::{Clock, SystemClock};
use funnel_core::sink::{AnalyticsSink, SinkOptions};
use funnel_core::storage::{experiment_key, timer_key, KeyValueStore};
use funnel_core::types::{
    props, ConversionEvent, Event, FlagValue, FunnelStage, InteractionEvent, Properties,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use url::Url;

pub const PAGE_VIEW_EVENT: &str = "$pageview";
pub const CONVERSION_EVENT: &str = "conversion";
pub const TIME_SPENT_EVENT: &str = "time_spent";
pub const SCROLL_DEPTH_EVENT: &str = "scroll_depth";
pub const EXPERIMENT_VIEWED_EVENT: &str = "experiment_viewed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Initialized,
}

pub struct EventTracker {
    sink: Arc<dyn AnalyticsSink>,
    session_store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
    location: Mutex<Option<Url>>,
}

impl EventTracker {
    /// `session_store` holds tab-scoped timer entries.
    pub fn new(sink: Arc<dyn AnalyticsSink>, session_store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            sink,
            session_store,
            clock: Arc::new(SystemClock),
            state: Mutex::new(TrackerState::Uninitialized),
            location: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Initialize the sink. Only the first call with a non-empty key has any
    /// effect. Returns whether the tracker is initialized afterwards.
    pub fn init(&self, api_key: &str, options: &SinkOptions) -> bool {
        let mut state = self.state.lock();
        if *state == TrackerState::Initialized {
            debug!("tracker already initialized, ignoring init");
            return true;
        }
        if api_key.trim().is_empty() {
            warn!("no analytics key supplied, tracking disabled");
            return false;
        }
        match self.sink.init(api_key, options) {
            Ok(()) => {
                *state = TrackerState::Initialized;
                info!(api_host = %options.api_host, "analytics tracker initialized");
                true
            }
            Err(e) => {
                warn!(error = %e, "analytics sink failed to initialize, tracking disabled");
                false
            }
        }
    }

    pub fn state(&self) -> TrackerState {
        *self.state.lock()
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == TrackerState::Initialized
    }

    /// Record the page location attached to page views.
    pub fn set_location(&self, url: Url) {
        *self.location.lock() = Some(url);
    }

    pub fn current_path(&self) -> Option<String> {
        self.location.lock().as_ref().map(|u| u.path().to_string())
    }

    pub fn track_funnel(&self, stage: FunnelStage, properties: Option<Properties>) {
        let event = self
            .tagged_envelope(stage.as_str())
            .with_property("funnel_stage", stage.as_str())
            .with_properties(properties);
        self.emit(event);
    }

    /// Emits the specific conversion event plus a generic `conversion` event
    /// so conversion rates can be aggregated across CTAs.
    pub fn track_conversion(&self, conversion: ConversionEvent, properties: Option<Properties>) {
        if !self.is_initialized() {
            return;
        }
        let specific = self
            .tagged_envelope(conversion.as_str())
            .with_property("conversion_event", conversion.as_str())
            .with_properties(properties.clone());
        self.emit(specific);

        let generic = Event::new(CONVERSION_EVENT, self.clock.now())
            .with_property("conversion_type", conversion.as_str())
            .with_properties(properties);
        self.emit(generic);
    }

    pub fn track_interaction(&self, interaction: InteractionEvent, properties: Option<Properties>) {
        let event = self
            .tagged_envelope(interaction.as_str())
            .with_property("interaction_type", interaction.as_str())
            .with_properties(properties);
        self.emit(event);
    }

    pub fn track_page_view(&self, properties: Option<Properties>) {
        let mut event = Event::new(PAGE_VIEW_EVENT, self.clock.now());
        if let Some(url) = self.location.lock().as_ref() {
            event = event
                .with_property("url", url.as_str())
                .with_property("path", url.path());
        }
        self.emit(event.with_properties(properties));
    }

    /// Start (or restart) the timer `name`. Works before initialization since
    /// it only touches session storage.
    pub fn start_timer(&self, name: &str) {
        let started_ms = self.clock.now().timestamp_millis();
        if let Err(e) = self
            .session_store
            .set(&timer_key(name), &started_ms.to_string())
        {
            warn!(timer = name, error = %e, "failed to start timer");
        }
    }

    /// Finish the timer `name` and emit `time_spent`. Without a matching
    /// start this does nothing, so a second end is always a no-op.
    pub fn end_timer(&self, name: &str, properties: Option<Properties>) {
        if !self.is_initialized() {
            return;
        }
        let key = timer_key(name);
        let raw = match self.session_store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!(timer = name, error = %e, "failed to read timer");
                return;
            }
        };
        if let Err(e) = self.session_store.remove(&key) {
            warn!(timer = name, error = %e, "failed to clear timer");
        }

        let Ok(started_ms) = raw.trim().parse::<i64>() else {
            debug!(timer = name, value = %raw, "discarding malformed timer entry");
            return;
        };
        let duration_ms = (self.clock.now().timestamp_millis() - started_ms).max(0);
        let duration_seconds = (duration_ms as f64 / 1000.0).round();

        let event = Event::new(TIME_SPENT_EVENT, self.clock.now())
            .with_property("timer_name", name)
            .with_property("duration_ms", duration_ms)
            .with_property("duration_seconds", duration_seconds)
            .with_properties(properties);
        self.emit(event);
    }

    /// Stateless: milestone deduplication belongs to the caller.
    pub fn track_scroll_depth(&self, depth_percent: u32, properties: Option<Properties>) {
        let event = Event::new(SCROLL_DEPTH_EVENT, self.clock.now())
            .with_property("depth_percentage", depth_percent)
            .with_properties(properties);
        self.emit(event);
    }

    /// Log that `variant` of `experiment` was shown, and record it as a user
    /// property for segmentation.
    pub fn track_variant(&self, experiment: &str, variant: &str, properties: Option<Properties>) {
        if !self.is_initialized() {
            return;
        }
        let event = Event::new(EXPERIMENT_VIEWED_EVENT, self.clock.now())
            .with_property("experiment", experiment)
            .with_property("variant", variant)
            .with_properties(properties);
        self.emit(event);
        self.set_user_properties(props([(experiment_key(experiment), variant)]));
    }

    pub fn identify(&self, user_id: &str, properties: Option<Properties>) {
        if !self.is_initialized() {
            return;
        }
        self.sink.identify(user_id, properties.unwrap_or_default());
    }

    pub fn set_user_properties(&self, properties: Properties) {
        if !self.is_initialized() {
            return;
        }
        self.sink.set_user_properties(properties);
    }

    /// Remote flag lookup served by the sink. This is independent of the
    /// locally persisted assignment made by the variant assigner.
    pub fn feature_flag_variant(&self, flag: &str, default_variant: &str) -> String {
        if !self.is_initialized() {
            return default_variant.to_string();
        }
        match self.sink.feature_flag(flag) {
            Some(FlagValue::Variant(v)) if !v.is_empty() => v,
            Some(FlagValue::Enabled(true)) => "true".to_string(),
            _ => default_variant.to_string(),
        }
    }

    /// Drop the sink's identity, e.g. between QA runs.
    pub fn reset(&self) {
        if !self.is_initialized() {
            return;
        }
        self.sink.reset();
    }

    fn tagged_envelope(&self, name: &str) -> Event {
        let now = self.clock.now();
        Event::new(name, now).with_property("timestamp", now.to_rfc3339())
    }

    fn emit(&self, event: Event) {
        if !self.is_initialized() {
            return;
        }
        debug!(event = %event.name, properties = event.properties.len(), "event captured");
        self.sink.capture(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::clock::ManualClock;
    use funnel_core::sink::{capture_sink, CaptureSink, SinkCall};
    use funnel_core::storage::MemoryStore;
    use funnel_core::types::PropertyValue;

    struct Fixture {
        sink: Arc<CaptureSink>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        tracker: EventTracker,
    }

    fn fixture() -> Fixture {
        let sink = capture_sink();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let tracker = EventTracker::new(sink.clone(), store.clone()).with_clock(clock.clone());
        Fixture {
            sink,
            store,
            clock,
            tracker,
        }
    }

    fn initialized() -> Fixture {
        let f = fixture();
        assert!(f.tracker.init("phc_test", &SinkOptions::default()));
        f
    }

    #[test]
    fn test_calls_before_init_are_noops() {
        let f = fixture();
        f.tracker.track_funnel(FunnelStage::HeroView, None);
        f.tracker.track_conversion(ConversionEvent::BookCallClick, None);
        f.tracker.track_scroll_depth(50, None);
        f.tracker.identify("user-1", None);
        f.tracker.end_timer("page_session", None);
        assert!(f.sink.calls().is_empty());
        assert_eq!(f.tracker.feature_flag_variant("cta_text", "control"), "control");
    }

    #[test]
    fn test_empty_key_keeps_tracker_disabled() {
        let f = fixture();
        assert!(!f.tracker.init("  ", &SinkOptions::default()));
        assert_eq!(f.tracker.state(), TrackerState::Uninitialized);
        f.tracker.track_page_view(None);
        assert!(f.sink.calls().is_empty());
    }

    #[test]
    fn test_init_is_one_way() {
        let f = initialized();
        assert!(f.tracker.init("phc_other", &SinkOptions::default()));
        let inits = f
            .sink
            .calls()
            .into_iter()
            .filter(|c| matches!(c, SinkCall::Init { .. }))
            .count();
        assert_eq!(inits, 1);
    }

    #[test]
    fn test_funnel_envelope() {
        let f = initialized();
        f.tracker.track_funnel(
            FunnelStage::PricingView,
            Some(props([("section_id", "pricing")])),
        );
        let events = f.sink.events_named("pricing_section_view");
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.timestamp, f.clock.now());
        assert_eq!(
            event.property("funnel_stage").and_then(|v| v.as_str()),
            Some("pricing_section_view")
        );
        assert_eq!(
            event.property("section_id").and_then(|v| v.as_str()),
            Some("pricing")
        );
        assert!(event.property("timestamp").is_some());
    }

    #[test]
    fn test_conversion_emits_generic_event() {
        let f = initialized();
        f.tracker.track_conversion(
            ConversionEvent::BookCallClick,
            Some(props([("location", "hero")])),
        );
        assert_eq!(f.sink.count(), 2);
        let generic = &f.sink.events_named(CONVERSION_EVENT)[0];
        assert_eq!(
            generic.property("conversion_type").and_then(|v| v.as_str()),
            Some("book_call_click")
        );
        assert_eq!(
            generic.property("location").and_then(|v| v.as_str()),
            Some("hero")
        );
        // Conversions repeat freely.
        f.tracker.track_conversion(ConversionEvent::BookCallClick, None);
        assert_eq!(f.sink.count_named("book_call_click"), 2);
    }

    #[test]
    fn test_page_view_carries_location() {
        let f = initialized();
        f.tracker
            .set_location(Url::parse("https://example.com/courses?ref=ad").unwrap());
        f.tracker.track_page_view(None);
        let event = &f.sink.events_named(PAGE_VIEW_EVENT)[0];
        assert_eq!(
            event.property("url").and_then(|v| v.as_str()),
            Some("https://example.com/courses?ref=ad")
        );
        assert_eq!(event.property("path").and_then(|v| v.as_str()), Some("/courses"));
    }

    #[test]
    fn test_end_timer_without_start_is_silent() {
        let f = initialized();
        f.tracker.end_timer("never_started", None);
        assert_eq!(f.sink.count(), 0);
    }

    #[test]
    fn test_timer_start_end_end() {
        let f = initialized();
        f.tracker.start_timer("x");
        assert_eq!(f.store.len(), 1);
        f.clock.advance_ms(2_600);
        f.tracker.end_timer("x", Some(props([("section_id", "pricing")])));

        let events = f.sink.events_named(TIME_SPENT_EVENT);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.property("timer_name").and_then(|v| v.as_str()), Some("x"));
        assert_eq!(
            event.property("duration_ms"),
            Some(&PropertyValue::Number(2_600.0))
        );
        assert_eq!(
            event.property("duration_seconds"),
            Some(&PropertyValue::Number(3.0))
        );
        assert!(f.store.is_empty());

        f.tracker.end_timer("x", None);
        assert_eq!(f.sink.count_named(TIME_SPENT_EVENT), 1);
    }

    #[test]
    fn test_restarting_timer_overwrites_start() {
        let f = initialized();
        f.tracker.start_timer("page_session");
        f.clock.advance_ms(5_000);
        f.tracker.start_timer("page_session");
        f.clock.advance_ms(1_000);
        f.tracker.end_timer("page_session", None);
        let event = &f.sink.events_named(TIME_SPENT_EVENT)[0];
        assert_eq!(event.property("duration_ms").and_then(|v| v.as_f64()), Some(1_000.0));
    }

    #[test]
    fn test_timer_clock_skew_clamps_to_zero() {
        let f = initialized();
        f.tracker.start_timer("x");
        f.clock.advance_ms(-500);
        f.tracker.end_timer("x", None);
        let event = &f.sink.events_named(TIME_SPENT_EVENT)[0];
        assert_eq!(event.property("duration_ms").and_then(|v| v.as_f64()), Some(0.0));
    }

    #[test]
    fn test_malformed_timer_entry_is_dropped() {
        let f = initialized();
        f.store.set("timer_x", "yesterday").unwrap();
        f.tracker.end_timer("x", None);
        assert_eq!(f.sink.count(), 0);
        assert!(f.store.is_empty());
    }

    #[test]
    fn test_scroll_depth_is_stateless() {
        let f = initialized();
        f.tracker.track_scroll_depth(50, None);
        f.tracker.track_scroll_depth(50, None);
        assert_eq!(f.sink.count_named(SCROLL_DEPTH_EVENT), 2);
    }

    #[test]
    fn test_track_variant_sets_user_property() {
        let f = initialized();
        f.tracker.track_variant("cta_text", "book_call", None);
        let event = &f.sink.events_named(EXPERIMENT_VIEWED_EVENT)[0];
        assert_eq!(
            event.property("experiment").and_then(|v| v.as_str()),
            Some("cta_text")
        );
        assert!(f.sink.calls().contains(&SinkCall::SetUserProperties(props([(
            "experiment_cta_text",
            "book_call"
        )]))));
    }

    #[test]
    fn test_feature_flag_variant() {
        let f = initialized();
        assert_eq!(f.tracker.feature_flag_variant("cta_text", "control"), "control");
        f.sink
            .set_flag("cta_text", FlagValue::Variant("schedule_demo".into()));
        assert_eq!(
            f.tracker.feature_flag_variant("cta_text", "control"),
            "schedule_demo"
        );
        f.sink.set_flag("new_pricing", FlagValue::Enabled(true));
        assert_eq!(f.tracker.feature_flag_variant("new_pricing", "off"), "true");
        f.sink.set_flag("new_pricing", FlagValue::Enabled(false));
        assert_eq!(f.tracker.feature_flag_variant("new_pricing", "off"), "off");
    }

    #[test]
    fn test_identify_and_reset_forwarded() {
        let f = initialized();
        f.tracker
            .identify("school-7", Some(props([("district", "north")])));
        f.tracker.reset();
        let calls = f.sink.calls();
        assert!(calls.iter().any(|c| matches!(
            c,
            SinkCall::Identify { user_id, properties }
                if user_id == "school-7" && properties.contains_key("district")
        )));
        assert_eq!(calls.last(), Some(&SinkCall::Reset));
    }
}
