use std::cell::{Cell, RefCell};
use std::rc::Rc;

use approx::assert_relative_eq;
use chart_overlay::api::ChartRegistry;
use chart_overlay::config::{ChartConfig, OverlayRuntimeConfig};
use chart_overlay::core::{ChartId, ContainerId, PaneId, PriceAxisId, Viewport};
use chart_overlay::host::{HeadlessFactory, HeadlessPage};
use chart_overlay::scheduler::ManualClock;
use chart_overlay::snapshot::{CoordinateSnapshot, SnapshotOptions, SnapshotRequest};

struct Harness {
    registry: ChartRegistry,
    clock: ManualClock,
    factory: HeadlessFactory,
}

fn harness() -> Harness {
    let clock = ManualClock::default();
    let page = HeadlessPage::default();
    page.insert(ContainerId::new("main"), Viewport::new(860, 428));
    let factory = HeadlessFactory::default();
    let registry = ChartRegistry::new(
        OverlayRuntimeConfig::default(),
        Rc::new(clock.clone()),
        Box::new(page),
        Box::new(factory.clone()),
    )
    .expect("registry init");
    Harness {
        registry,
        clock,
        factory,
    }
}

fn mounted(h: &mut Harness) -> ChartId {
    let chart = h
        .registry
        .attach(ContainerId::new("main"), ChartConfig::default());
    h.registry.tick();
    chart
}

fn ready(request: SnapshotRequest) -> Rc<CoordinateSnapshot> {
    match request {
        SnapshotRequest::Ready(snapshot) => snapshot,
        SnapshotRequest::Pending { .. } => panic!("expected a cached snapshot"),
    }
}

#[test]
fn consecutive_requests_share_one_snapshot() {
    let mut h = harness();
    let chart = mounted(&mut h);
    let computations = h.registry.snapshot_computations();

    let first = ready(
        h.registry
            .get_snapshot(chart, SnapshotOptions::default(), None)
            .expect("first request"),
    );
    h.clock.advance_ms(100);
    let second = ready(
        h.registry
            .get_snapshot(chart, SnapshotOptions::default(), None)
            .expect("second request"),
    );

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(h.registry.snapshot_computations(), computations);
    assert!(h.registry.cache_stats().hits >= 2);
}

#[test]
fn snapshot_reflects_host_layout() {
    let mut h = harness();
    let chart = mounted(&mut h);
    let snapshot = ready(
        h.registry
            .get_snapshot(chart, SnapshotOptions::default(), None)
            .expect("request"),
    );

    assert!(snapshot.valid);
    let pane = snapshot.pane(PaneId::new(0)).expect("pane 0");
    assert_relative_eq!(pane.rect.width, 800.0);
    assert_relative_eq!(pane.rect.height, 400.0);
    assert_relative_eq!(snapshot.time_axis.y, 400.0);
}

#[test]
fn viewport_change_evicts_and_recomputes_on_next_frame() {
    let mut h = harness();
    let chart = mounted(&mut h);
    let before = ready(
        h.registry
            .get_snapshot(chart, SnapshotOptions::default(), None)
            .expect("warm cache"),
    );

    let invalidations = Rc::new(Cell::new(0));
    let counter = Rc::clone(&invalidations);
    h.registry
        .subscribe_invalidation(chart, Box::new(move |_| counter.set(counter.get() + 1)))
        .expect("subscribe");

    h.factory
        .chart(chart)
        .expect("host handle")
        .pan_by(10.0)
        .expect("pan");
    h.registry.pump_events();
    assert_eq!(invalidations.get(), 1);

    let delivered = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&delivered);
    let request = h
        .registry
        .get_snapshot(
            chart,
            SnapshotOptions::default(),
            Some(Box::new(move |snapshot| *sink.borrow_mut() = Some(snapshot))),
        )
        .expect("request after pan");
    assert!(matches!(request, SnapshotRequest::Pending { schedule: true, .. }));

    h.clock.advance_ms(16);
    h.registry.tick();
    let after = delivered.borrow().clone().expect("delivered at paint opportunity");
    assert!(!Rc::ptr_eq(&before, &after));

    let cached = ready(
        h.registry
            .get_snapshot(chart, SnapshotOptions::default(), None)
            .expect("cached after resolve"),
    );
    assert!(Rc::ptr_eq(&after, &cached));
}

#[test]
fn snapshot_during_resize_debounce_uses_the_new_layout() {
    let mut h = harness();
    let chart = mounted(&mut h);
    let host = h.factory.chart(chart).expect("host handle");

    h.registry
        .notify_container_resized(chart, Viewport::new(500, 428))
        .expect("resize");
    h.registry.tick();
    host.pan_by(1.0).expect("pan");
    h.registry.pump_events();

    let request = h
        .registry
        .get_snapshot(chart, SnapshotOptions::default(), None)
        .expect("request after pan");
    assert!(matches!(request, SnapshotRequest::Pending { .. }));
    h.clock.advance_ms(16);
    h.registry.tick();

    // The debounced container size has not flushed yet.
    assert_eq!(
        h.registry.container(chart).expect("container").size,
        Viewport::new(860, 428)
    );
    let snapshot = ready(
        h.registry
            .get_snapshot(chart, SnapshotOptions::default(), None)
            .expect("resolved"),
    );
    assert!(snapshot.valid);
    assert_eq!(snapshot.container, Viewport::new(500, 428));
    let pane = snapshot.pane(PaneId::new(0)).expect("pane 0");
    assert_relative_eq!(snapshot.time_axis.width, pane.rect.width);
    assert_relative_eq!(pane.rect.width, 440.0);
    let right = snapshot.price_axis(&PriceAxisId::right()).expect("right axis");
    assert_relative_eq!(right.rect.x, 440.0);
    assert_relative_eq!(snapshot.content_rect().right(), 440.0);
}

#[test]
fn expired_entries_are_recomputed() {
    let mut h = harness();
    let chart = mounted(&mut h);
    let evictions = h.registry.cache_stats().evictions;

    h.clock.advance_ms(600);
    let request = h
        .registry
        .get_snapshot(chart, SnapshotOptions::default(), None)
        .expect("request after ttl");
    assert!(matches!(request, SnapshotRequest::Pending { .. }));
    assert_eq!(h.registry.cache_stats().evictions, evictions + 1);
}

#[test]
fn uncached_requests_bypass_the_cache() {
    let mut h = harness();
    let chart = mounted(&mut h);
    let options = SnapshotOptions {
        use_cache: false,
        validate: true,
    };
    let request = h
        .registry
        .get_snapshot(chart, options, None)
        .expect("uncached request");
    assert!(matches!(request, SnapshotRequest::Pending { schedule: true, .. }));
}

#[test]
fn clearing_the_cache_notifies_subscribers() {
    let mut h = harness();
    let chart = mounted(&mut h);
    let invalidations = Rc::new(Cell::new(0));
    let counter = Rc::clone(&invalidations);
    let id = h
        .registry
        .subscribe_invalidation(chart, Box::new(move |_| counter.set(counter.get() + 1)))
        .expect("subscribe");

    h.registry.clear_snapshot_cache();
    assert_eq!(invalidations.get(), 1);
    assert_eq!(h.registry.cache_stats().size, 0);

    assert!(h.registry.unsubscribe_invalidation(id));
    h.registry.invalidate(chart);
    assert_eq!(invalidations.get(), 1);
}

#[test]
fn unknown_chart_is_a_caller_error() {
    let mut h = harness();
    assert!(
        h.registry
            .get_snapshot(ChartId::new(42), SnapshotOptions::default(), None)
            .is_err()
    );
}
