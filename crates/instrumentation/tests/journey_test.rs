//! End-to-end visitor journey: experiments resolved for the hero, sections
//! scrolled into view, a CTA conversion, then navigation and teardown.

use std::sync::Arc;

use funnel_core::clock::ManualClock;
use funnel_core::config::InstrumentationConfig;
use funnel_core::sink::{capture_sink, SinkOptions};
use funnel_core::storage::{KeyValueStore, MemoryStore};
use funnel_core::types::{props, ConversionEvent};
use funnel_experiments::catalog::CTA_TEXT;
use funnel_experiments::{ExperimentCatalog, VariantAssigner};
use funnel_instrumentation::{PageInstrumentation, ScrollMetrics, PAGE_SESSION_TIMER};
use funnel_web_sdk::tracker::{
    EventTracker, CONVERSION_EVENT, EXPERIMENT_VIEWED_EVENT, PAGE_VIEW_EVENT, SCROLL_DEPTH_EVENT,
    TIME_SPENT_EVENT,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use url::Url;

fn metrics(scroll_top: f64) -> ScrollMetrics {
    ScrollMetrics {
        scroll_top,
        viewport_height: 1000.0,
        document_height: 6000.0,
    }
}

#[test]
fn test_full_visitor_journey() {
    let sink = capture_sink();
    let session = Arc::new(MemoryStore::new());
    let durable = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::default());

    let tracker = Arc::new(
        EventTracker::new(sink.clone(), session.clone()).with_clock(clock.clone()),
    );
    assert!(tracker.init("phc_test", &SinkOptions::default()));

    let assigner = VariantAssigner::new(durable.clone(), tracker.clone())
        .with_rng(StdRng::seed_from_u64(2024));
    let catalog = ExperimentCatalog::builtin();

    let mut page = PageInstrumentation::new(tracker.clone(), InstrumentationConfig::default());
    page.mount(Url::parse("https://codebridge.example/").unwrap());

    // Presentation resolves its copy for every experiment.
    let resolved = catalog.resolve_all(&assigner);
    assert_eq!(resolved.len(), 3);
    assert!(resolved.iter().all(|r| !r.config.is_empty()));
    assert_eq!(sink.count_named(EXPERIMENT_VIEWED_EVENT), 3);

    // Re-rendering does not re-roll or re-log.
    let cta = catalog.experiment(CTA_TEXT).unwrap();
    let cta_variant = assigner.get_variant(cta);
    assert_eq!(
        durable.get("experiment_cta_text").unwrap().as_deref(),
        Some(cta_variant.as_str())
    );
    assert_eq!(sink.count_named(EXPERIMENT_VIEWED_EVENT), 3);

    clock.advance_ms(1_000);
    page.attach_sections(["why-schools", "how-it-works", "courses", "results", "pricing"]);

    page.on_intersection("why-schools", 0.6);
    for top in [500.0, 1500.0, 2500.0] {
        if page.on_scroll(metrics(top)) {
            page.on_animation_frame();
        }
    }
    clock.advance_ms(4_000);
    page.on_intersection("why-schools", 0.2);
    page.on_intersection("pricing", 0.75);
    page.on_intersection("pricing", 0.0);
    page.on_intersection("pricing", 0.75);

    tracker.track_conversion(
        ConversionEvent::BookCallClick,
        Some(props([("location", "pricing"), ("cta_variant", cta_variant.as_str())])),
    );

    page.route_changed(Url::parse("https://codebridge.example/pricing").unwrap());
    page.on_intersection("pricing", 0.0);
    page.on_intersection("pricing", 0.9);

    page.unload();
    clock.advance_ms(10_000);
    page.unmount();

    assert_eq!(sink.count_named("problem_section_view"), 1);
    assert_eq!(sink.count_named("pricing_section_view"), 1);
    assert_eq!(sink.count_named("book_call_click"), 1);
    assert_eq!(sink.count_named(CONVERSION_EVENT), 1);
    assert_eq!(sink.count_named(PAGE_VIEW_EVENT), 2);
    assert_eq!(sink.count_named("page_view"), 2);
    assert_eq!(sink.count_named("hero_view"), 1);

    // 25% and 50% milestones plus the final report of the 58% maximum,
    // carried across the route change.
    let depths: Vec<f64> = sink
        .events_named(SCROLL_DEPTH_EVENT)
        .iter()
        .filter_map(|e| e.property("depth_percentage").and_then(|v| v.as_f64()))
        .collect();
    assert_eq!(depths, vec![25.0, 50.0, 58.0]);

    let section_time = sink
        .events_named(TIME_SPENT_EVENT)
        .into_iter()
        .find(|e| e.property("timer_name").and_then(|v| v.as_str()) == Some("section_why-schools"))
        .unwrap();
    assert_eq!(
        section_time.property("duration_ms").and_then(|v| v.as_f64()),
        Some(4_000.0)
    );

    let session_time = sink
        .events_named(TIME_SPENT_EVENT)
        .into_iter()
        .find(|e| e.property("timer_name").and_then(|v| v.as_str()) == Some(PAGE_SESSION_TIMER))
        .unwrap();
    assert_eq!(
        session_time.property("duration_seconds").and_then(|v| v.as_f64()),
        Some(15.0)
    );

    // The still-visible pricing timer is left in session storage; the rest is gone.
    assert_eq!(session.len(), 1);
    assert!(session.get("timer_section_pricing").unwrap().is_some());

    // Navigation neither clears nor re-rolls assignments.
    assert_eq!(assigner.active_experiments().len(), 3);
    assert_eq!(
        durable.get("experiment_cta_text").unwrap().as_deref(),
        Some(cta_variant.as_str())
    );
    assert_eq!(sink.count_named(EXPERIMENT_VIEWED_EVENT), 3);
}
