use std::cell::{Cell, RefCell};
use std::rc::Rc;

use approx::assert_relative_eq;
use chart_overlay::api::{ChartRegistry, RegistryEvent};
use chart_overlay::binder::{BoundElementKind, LegendAnchor, LegendBinding, SeriesRange};
use chart_overlay::config::{ChartConfig, OverlayRuntimeConfig};
use chart_overlay::core::{ChartId, ContainerId, PaneId, PixelPoint, PriceAxisId, Viewport};
use chart_overlay::error::OverlayError;
use chart_overlay::host::{HeadlessChartSpec, HeadlessFactory, HeadlessPage, HostChart};
use chart_overlay::lifecycle::{DisposalState, MountPolicy};
use chart_overlay::overlay::VisualPrimitive;
use chart_overlay::render::Color;
use chart_overlay::scheduler::ManualClock;
use chart_overlay::snapshot::{SnapshotOptions, SnapshotRequest};

struct Harness {
    registry: ChartRegistry,
    clock: ManualClock,
    page: HeadlessPage,
    factory: HeadlessFactory,
    events: Rc<RefCell<Vec<RegistryEvent>>>,
}

fn harness_with(config: OverlayRuntimeConfig, factory: HeadlessFactory) -> Harness {
    let clock = ManualClock::default();
    let page = HeadlessPage::default();
    page.insert(ContainerId::new("main"), Viewport::new(860, 428));
    let mut registry = ChartRegistry::new(
        config,
        Rc::new(clock.clone()),
        Box::new(page.clone()),
        Box::new(factory.clone()),
    )
    .expect("registry init");
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    registry.subscribe(Box::new(move |event| sink.borrow_mut().push(event.clone())));
    Harness {
        registry,
        clock,
        page,
        factory,
        events,
    }
}

fn harness() -> Harness {
    harness_with(OverlayRuntimeConfig::default(), HeadlessFactory::default())
}

fn pending_snapshot(h: &mut Harness, chart: ChartId) -> Rc<Cell<bool>> {
    let delivered = Rc::new(Cell::new(false));
    let flag = Rc::clone(&delivered);
    let request = h
        .registry
        .get_snapshot(
            chart,
            SnapshotOptions::default(),
            Some(Box::new(move |_| flag.set(true))),
        )
        .expect("request");
    assert!(matches!(request, SnapshotRequest::Pending { schedule: true, .. }));
    delivered
}

#[test]
fn dispose_before_resolve_writes_nothing() {
    let mut h = harness();
    let chart = h
        .registry
        .attach(ContainerId::new("main"), ChartConfig::default());
    let delivered = pending_snapshot(&mut h, chart);

    h.registry.dispose(chart).expect("dispose");
    assert_eq!(h.registry.pending_tasks(chart), 0);
    h.clock.advance_ms(16);
    h.registry.tick();

    assert!(!delivered.get());
    assert_eq!(h.registry.snapshot_computations(), 0);
    assert_eq!(h.registry.cache_stats().size, 0);
    assert_eq!(h.registry.chart_state(chart), Some(DisposalState::Disposed));
    assert!(h.events.borrow().contains(&RegistryEvent::Disposed { chart }));
}

#[test]
fn external_host_teardown_aborts_pending_work() {
    let mut h = harness();
    let chart = h
        .registry
        .attach(ContainerId::new("main"), ChartConfig::default());
    let delivered = pending_snapshot(&mut h, chart);

    let mut host = h.factory.chart(chart).expect("host");
    host.dispose();
    h.registry.tick();

    assert!(!delivered.get());
    assert_eq!(h.registry.snapshot_computations(), 0);
    assert_eq!(h.registry.cache_stats().size, 0);
    assert_eq!(h.registry.chart_state(chart), Some(DisposalState::Disposed));
}

#[test]
fn dispose_is_idempotent_and_operations_become_no_ops() {
    let mut h = harness();
    let chart = h
        .registry
        .attach(ContainerId::new("main"), ChartConfig::default());
    h.registry.tick();
    h.registry.dispose(chart).expect("first dispose");
    h.registry.dispose(chart).expect("second dispose");

    let red = Color::rgb(1.0, 0.0, 0.0);
    h.registry
        .add_primitive(chart, VisualPrimitive::rectangle(1.0, 1.0, 2.0, 2.0, red))
        .expect("no-op add");
    h.registry.schedule_redraw(chart).expect("no-op redraw");
    assert_eq!(h.registry.pending_tasks(chart), 0);
    assert!(h.registry.primitives(chart).is_none());

    let SnapshotRequest::Ready(snapshot) = h
        .registry
        .get_snapshot(chart, SnapshotOptions::default(), None)
        .expect("disposed chart answers")
    else {
        panic!("disposed chart must not defer");
    };
    assert!(!snapshot.valid);

    let disposed = h
        .events
        .borrow()
        .iter()
        .filter(|event| matches!(event, RegistryEvent::Disposed { .. }))
        .count();
    assert_eq!(disposed, 1);
    assert!(h.registry.dispose(ChartId::new(99)).is_err());
}

#[test]
fn missing_container_is_abandoned_after_bounded_attempts() {
    let mut h = harness();
    h.page
        .insert_delayed(ContainerId::new("never"), Viewport::new(400, 300), u32::MAX);
    let chart = h
        .registry
        .attach(ContainerId::new("never"), ChartConfig::default());

    for _ in 0..20 {
        h.clock.advance_ms(2_000);
        h.registry.tick();
    }

    let policy = MountPolicy::default();
    assert_eq!(h.page.probe_count(&ContainerId::new("never")), policy.max_attempts);
    assert!(h.registry.is_abandoned(chart));
    match h.registry.mount_error(chart) {
        Some(OverlayError::MountTimeout { chart: failed, attempts }) => {
            assert_eq!(failed, chart);
            assert_eq!(attempts, policy.max_attempts);
        }
        other => panic!("expected a mount timeout, got {other:?}"),
    }
    assert_eq!(h.registry.chart_state(chart), Some(DisposalState::Disposed));
    assert_eq!(h.registry.pending_tasks(chart), 0);
    assert!(h.events.borrow().contains(&RegistryEvent::MountAbandoned {
        chart,
        attempts: policy.max_attempts,
    }));
}

#[test]
fn late_container_mounts_on_retry() {
    let mut h = harness();
    h.page
        .insert_delayed(ContainerId::new("late"), Viewport::new(860, 428), 2);
    let chart = h
        .registry
        .attach(ContainerId::new("late"), ChartConfig::default());
    assert_eq!(h.registry.chart_state(chart), Some(DisposalState::Mounting));

    h.clock.advance_ms(50);
    h.registry.tick();
    assert_eq!(h.registry.chart_state(chart), Some(DisposalState::Mounting));
    h.clock.advance_ms(100);
    h.registry.tick();

    assert_eq!(h.registry.chart_state(chart), Some(DisposalState::Ready));
    assert_eq!(h.registry.mount_attempts(chart), 3);
    assert!(h.events.borrow().contains(&RegistryEvent::Mounted { chart }));
}

#[test]
fn dispose_while_mounting_cancels_the_retry() {
    let mut h = harness();
    h.page
        .insert_delayed(ContainerId::new("late"), Viewport::new(860, 428), 1);
    let chart = h
        .registry
        .attach(ContainerId::new("late"), ChartConfig::default());
    h.registry.dispose(chart).expect("dispose");

    h.clock.advance_ms(1_000);
    h.registry.tick();
    assert_eq!(h.page.probe_count(&ContainerId::new("late")), 1);
    assert!(h.factory.chart(chart).is_none());
}

#[test]
fn resize_burst_flushes_once_after_the_quiet_window() {
    let mut h = harness();
    let chart = h
        .registry
        .attach(ContainerId::new("main"), ChartConfig::default());
    h.registry.tick();
    let computations = h.registry.snapshot_computations();

    for (step, width) in [(0, 900), (30, 920), (60, 940)] {
        h.clock.set(std::time::Duration::from_millis(step));
        h.registry
            .notify_container_resized(chart, Viewport::new(width, 500))
            .expect("resize");
        h.registry.tick();
    }
    h.clock.set(std::time::Duration::from_millis(150));
    h.registry.tick();
    assert_eq!(
        h.registry.container(chart).expect("container").size,
        Viewport::new(860, 428)
    );

    h.clock.set(std::time::Duration::from_millis(160));
    h.registry.tick();
    assert_eq!(
        h.registry.container(chart).expect("container").size,
        Viewport::new(940, 500)
    );
    assert_eq!(h.registry.snapshot_computations(), computations + 1);
}

#[test]
fn continuous_resizing_flushes_at_max_wait() {
    let mut h = harness();
    let chart = h
        .registry
        .attach(ContainerId::new("main"), ChartConfig::default());
    h.registry.tick();

    for step in 0..10_u32 {
        h.clock.set(std::time::Duration::from_millis(u64::from(step) * 50));
        h.registry
            .notify_container_resized(chart, Viewport::new(900 + step, 500))
            .expect("resize");
        h.registry.tick();
    }
    h.clock.set(std::time::Duration::from_millis(500));
    h.registry.tick();
    assert_eq!(
        h.registry.container(chart).expect("container").size,
        Viewport::new(909, 500)
    );
}

#[test]
fn clicks_reach_subscribers_and_are_not_relayed() {
    let mut h = harness();
    let chart = h
        .registry
        .attach(ContainerId::new("main"), ChartConfig::default());
    h.registry.tick();

    h.factory
        .chart(chart)
        .expect("host")
        .click(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(400.0, 200.0));
    h.registry.tick();

    let events = h.events.borrow();
    let clicked = events.iter().find_map(|event| match event {
        RegistryEvent::Clicked { chart: origin, position } if *origin == chart => Some(position.clone()),
        _ => None,
    });
    let position = clicked.expect("click forwarded");
    assert_relative_eq!(position.time, 50.0);
}

#[test]
fn legends_bind_to_their_series_pane() {
    let spec = HeadlessChartSpec {
        pane_separator_px: 0.0,
        ..HeadlessChartSpec::default().with_panes(vec![3.0, 1.0])
    };
    let mut h = harness_with(
        OverlayRuntimeConfig::default(),
        HeadlessFactory::with_default_spec(spec),
    );
    let config = ChartConfig::default()
        .with_legend(LegendBinding {
            id: "volume-legend".to_owned(),
            kind: BoundElementKind::Legend,
            pane: None,
            series: vec!["volume".to_owned()],
            anchor: LegendAnchor::TopRight,
            margin: 8.0,
            width: 100.0,
            height: 40.0,
        })
        .with_series(SeriesRange {
            series: "volume".to_owned(),
            pane: PaneId::new(1),
            time: None,
        });
    let chart = h.registry.attach(ContainerId::new("main"), config);
    h.registry.tick();

    let placements = h
        .registry
        .legend_placements(chart)
        .expect("known chart")
        .expect("cached snapshot");
    let [placement] = placements.as_slice() else {
        panic!("expected one placement");
    };
    assert!(placement.visible);
    assert_eq!(placement.pane, PaneId::new(1));
    assert_relative_eq!(placement.rect.x, 692.0);
    assert_relative_eq!(placement.rect.y, 308.0);
}

#[test]
fn attach_accepts_versioned_json_config() {
    let mut h = harness();
    let json = r#"{
        "schema_version": 1,
        "config": {
            "primitives": [{
                "id": "zone",
                "shape": {"type": "rectangle", "time1": 10, "price1": 10, "time2": 20, "price2": 20,
                          "fill": {"red": 1, "green": 0, "blue": 0, "alpha": 0.5}}
            }]
        }
    }"#;
    let chart = h
        .registry
        .attach_json(ContainerId::new("main"), json)
        .expect("valid json");
    h.registry.tick();
    assert_eq!(h.registry.primitives(chart).map(<[_]>::len), Some(1));
    assert!(
        h.registry
            .attach_json(ContainerId::new("main"), "{not json")
            .is_err()
    );
}

#[test]
fn geometry_failure_paints_nothing_but_keeps_running() {
    let mut h = harness();
    let red = Color::rgb(1.0, 0.0, 0.0);
    let chart = h.registry.attach(
        ContainerId::new("main"),
        ChartConfig::default().with_primitives(vec![VisualPrimitive::rectangle(
            10.0, 10.0, 20.0, 20.0, red,
        )]),
    );
    h.factory.chart(chart).expect("host").set_fail_geometry(true);
    h.registry.tick();

    let stats = h.registry.paint_stats(chart).expect("stats");
    assert_eq!(stats.paint_passes, 1);
    assert_eq!(stats.last_command_count, 0);
    assert_eq!(h.registry.paint_failures(), 0);
    assert_eq!(h.registry.chart_state(chart), Some(DisposalState::Ready));
    let host = h.factory.chart(chart).expect("host");
    assert!(!host.is_disposed());
}
