use std::rc::Rc;

use approx::assert_relative_eq;
use chart_overlay::api::ChartRegistry;
use chart_overlay::config::{ChartConfig, OverlayRuntimeConfig};
use chart_overlay::core::{
    ChartId, ContainerId, PaneId, PixelPoint, PriceAxisId, TimeRange, Viewport,
};
use chart_overlay::host::{
    AxisSide, Container, CrosshairPosition, HeadlessAxisSpec, HeadlessChart, HeadlessChartSpec,
    HeadlessFactory, HeadlessPage, HostChart, HostChartFactory, HostEvent, HostResult,
    MountedChart, PaneSize, PriceAxisInfo,
};
use chart_overlay::scheduler::ManualClock;
use chart_overlay::sync::{SyncFlags, SyncGroupId};

struct Group {
    registry: ChartRegistry,
    clock: ManualClock,
    factory: HeadlessFactory,
    charts: Vec<ChartId>,
}

impl Group {
    fn host(&self, index: usize) -> HeadlessChart {
        self.factory.chart(self.charts[index]).expect("mounted host")
    }
}

/// Host that hands out each batch of notifications one drain late, the way
/// a page chart reports setter changes from its next callback.
struct LateNotifier {
    inner: Box<dyn HostChart>,
    held: Vec<HostEvent>,
}

impl HostChart for LateNotifier {
    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
    fn time_to_pixel(&self, time: f64) -> Option<f64> {
        self.inner.time_to_pixel(time)
    }
    fn pixel_to_time(&self, x: f64) -> Option<f64> {
        self.inner.pixel_to_time(x)
    }
    fn price_to_pixel(&self, pane: PaneId, axis: &PriceAxisId, price: f64) -> Option<f64> {
        self.inner.price_to_pixel(pane, axis, price)
    }
    fn pixel_to_price(&self, pane: PaneId, axis: &PriceAxisId, y: f64) -> Option<f64> {
        self.inner.pixel_to_price(pane, axis, y)
    }
    fn bar_spacing(&self) -> Option<f64> {
        self.inner.bar_spacing()
    }
    fn container_size(&self) -> HostResult<Viewport> {
        self.inner.container_size()
    }
    fn time_axis_height(&self) -> HostResult<f64> {
        self.inner.time_axis_height()
    }
    fn price_axes(&self) -> HostResult<Vec<PriceAxisInfo>> {
        self.inner.price_axes()
    }
    fn pane_count(&self) -> HostResult<usize> {
        self.inner.pane_count()
    }
    fn pane_size(&self, index: usize) -> HostResult<PaneSize> {
        self.inner.pane_size(index)
    }
    fn pane_offset(&self, index: usize) -> HostResult<f64> {
        self.inner.pane_offset(index)
    }
    fn visible_time_range(&self) -> Option<TimeRange> {
        self.inner.visible_time_range()
    }
    fn crosshair_position(&self) -> Option<CrosshairPosition> {
        self.inner.crosshair_position()
    }
    fn set_visible_time_range(&mut self, range: TimeRange) -> HostResult<()> {
        self.inner.set_visible_time_range(range)
    }
    fn set_crosshair(
        &mut self,
        pane: PaneId,
        point: PixelPoint,
        time: f64,
        price: f64,
    ) -> HostResult<()> {
        self.inner.set_crosshair(pane, point, time, price)
    }
    fn clear_crosshair(&mut self) -> HostResult<()> {
        self.inner.clear_crosshair()
    }
    fn resize(&mut self, size: Viewport) -> HostResult<()> {
        self.inner.resize(size)
    }
    fn take_notifications(&mut self) -> Vec<HostEvent> {
        let fresh = self.inner.take_notifications();
        std::mem::replace(&mut self.held, fresh)
    }
    fn dispose(&mut self) {
        self.inner.dispose();
    }
}

struct LateFactory(HeadlessFactory);

impl HostChartFactory for LateFactory {
    fn create(
        &mut self,
        chart: ChartId,
        container: &Container,
        config: &ChartConfig,
    ) -> HostResult<MountedChart> {
        let mounted = self.0.create(chart, container, config)?;
        Ok(MountedChart {
            host: Box::new(LateNotifier {
                inner: mounted.host,
                held: Vec::new(),
            }),
            surface: mounted.surface,
        })
    }
}

fn group_of(names: &[&str], factory: HeadlessFactory) -> Group {
    build_group(names, factory.clone(), Box::new(factory))
}

fn late_group(names: &[&str]) -> Group {
    let factory = HeadlessFactory::default();
    build_group(names, factory.clone(), Box::new(LateFactory(factory)))
}

fn build_group(
    names: &[&str],
    factory: HeadlessFactory,
    host_factory: Box<dyn HostChartFactory>,
) -> Group {
    let clock = ManualClock::default();
    let page = HeadlessPage::default();
    for name in names {
        page.insert(ContainerId::new(*name), Viewport::new(860, 428));
    }
    let mut registry = ChartRegistry::new(
        OverlayRuntimeConfig::default(),
        Rc::new(clock.clone()),
        Box::new(page),
        host_factory,
    )
    .expect("registry init");
    let charts = names
        .iter()
        .map(|name| {
            registry.attach(
                ContainerId::new(*name),
                ChartConfig::default().with_sync_group(SyncGroupId::new("g"), None),
            )
        })
        .collect();
    registry.tick();
    Group {
        registry,
        clock,
        factory,
        charts,
    }
}

fn three_charts() -> Group {
    group_of(&["a", "b", "c"], HeadlessFactory::default())
}

#[test]
fn crosshair_reaches_every_sibling_once_without_echo() {
    let mut g = three_charts();
    g.host(0)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(400.0, 200.0));
    g.registry.tick();

    assert_eq!(g.host(0).crosshair_set_calls(), 0);
    for index in [1, 2] {
        let host = g.host(index);
        assert_eq!(host.crosshair_set_calls(), 1);
        let crosshair = host.crosshair().expect("sibling crosshair");
        assert_relative_eq!(crosshair.time, 50.0);
        assert_relative_eq!(crosshair.price, 50.0);
        assert_eq!(host.pending_notifications(), 0);
    }

    let stats = g.registry.sync_stats(&SyncGroupId::new("g")).expect("group");
    assert_eq!(stats.relays, 2);
    assert_eq!(stats.echoes_suppressed, 2);

    g.clock.advance_ms(16);
    g.registry.tick();
    assert_eq!(g.registry.sync_stats(&SyncGroupId::new("g")), Some(stats));
}

#[test]
fn visible_range_relay_does_not_bounce_back() {
    let mut g = three_charts();
    g.host(0).pan_by(10.0).expect("pan");
    g.registry.tick();

    assert_eq!(g.host(0).range_set_calls(), 0);
    for index in [1, 2] {
        let host = g.host(index);
        assert_eq!(host.range_set_calls(), 1);
        let range = host.visible_time_range().expect("range");
        assert_relative_eq!(range.from, 10.0);
        assert_relative_eq!(range.to, 110.0);
    }
    let stats = g.registry.sync_stats(&SyncGroupId::new("g")).expect("group");
    assert_eq!((stats.relays, stats.echoes_suppressed), (2, 2));
}

#[test]
fn simultaneous_moves_settle_on_the_last_one() {
    let mut g = three_charts();
    g.host(0)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(100.0, 100.0));
    g.host(1)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(600.0, 300.0));
    g.registry.tick();

    let stats = g.registry.sync_stats(&SyncGroupId::new("g")).expect("group");
    assert_eq!(stats.relays, 4);
    let last = g.host(2).crosshair().expect("crosshair");
    assert_relative_eq!(last.time, 75.0);
    assert_relative_eq!(last.price, 25.0);
    assert_eq!(g.host(0).crosshair().map(|c| c.time), Some(last.time));
}

#[test]
fn pointer_leave_clears_siblings() {
    let mut g = three_charts();
    g.host(0)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(400.0, 200.0));
    g.registry.tick();
    g.host(0).leave_pointer();
    g.registry.tick();

    assert!(g.host(1).crosshair().is_none());
    assert!(g.host(2).crosshair().is_none());
}

#[test]
fn siblings_map_price_with_their_own_axes() {
    let factory = HeadlessFactory::default();
    factory.set_spec_for(
        ContainerId::new("b"),
        HeadlessChartSpec::default().with_axis(HeadlessAxisSpec {
            id: PriceAxisId::right(),
            side: AxisSide::Right,
            width: 60.0,
            price_min: 0.0,
            price_max: 200.0,
            mode: Default::default(),
        }),
    );
    let mut g = group_of(&["a", "b"], factory);
    g.host(0)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(400.0, 200.0));
    g.registry.tick();

    let crosshair = g.host(1).crosshair().expect("crosshair");
    assert_relative_eq!(crosshair.price, 50.0);
    // 50 of 0..200 sits three quarters down a 400px pane.
    assert_relative_eq!(crosshair.point.y, 300.0);
}

#[test]
fn disabled_crosshair_flag_stops_crosshair_only() {
    let mut g = three_charts();
    let group = SyncGroupId::new("g");
    g.registry
        .set_sync_flags(
            &group,
            SyncFlags {
                crosshair: false,
                time_range: true,
            },
        )
        .expect("flags");
    g.host(0)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(400.0, 200.0));
    g.host(0).pan_by(5.0).expect("pan");
    g.registry.tick();

    assert_eq!(g.host(1).crosshair_set_calls(), 0);
    assert_eq!(g.host(1).range_set_calls(), 1);
    assert!(
        g.registry
            .set_sync_flags(&SyncGroupId::new("missing"), SyncFlags::default())
            .is_err()
    );
}

#[test]
fn disposed_member_leaves_its_groups() {
    let mut g = three_charts();
    g.registry.dispose(g.charts[2]).expect("dispose");
    g.host(0)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(400.0, 200.0));
    g.registry.tick();

    assert_eq!(g.host(1).crosshair_set_calls(), 1);
    assert_eq!(g.host(2).crosshair_set_calls(), 0);
    let stats = g.registry.sync_stats(&SyncGroupId::new("g")).expect("group");
    assert_eq!(stats.relays, 1);
}

#[test]
fn leaving_a_group_stops_relays() {
    let mut g = group_of(&["a", "b"], HeadlessFactory::default());
    let group = SyncGroupId::new("g");
    assert!(g.registry.leave_sync(g.charts[1], &group).expect("leave"));
    g.host(0)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(400.0, 200.0));
    g.registry.tick();
    assert_eq!(g.host(1).crosshair_set_calls(), 0);

    assert!(g.registry.join_sync(g.charts[1], group, None).expect("rejoin"));
    g.host(0)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(200.0, 200.0));
    g.registry.tick();
    assert_eq!(g.host(1).crosshair_set_calls(), 1);
}

#[test]
fn late_notifications_do_not_bounce_between_siblings() {
    let mut g = late_group(&["a", "b"]);
    let group = SyncGroupId::new("g");
    g.host(0).pan_by(10.0).expect("pan");
    g.host(0)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(400.0, 200.0));
    for _ in 0..10 {
        g.clock.advance_ms(16);
        g.registry.tick();
    }

    assert_eq!(g.host(0).range_set_calls(), 0);
    assert_eq!(g.host(0).crosshair_set_calls(), 0);
    assert_eq!(g.host(1).range_set_calls(), 1);
    assert_eq!(g.host(1).crosshair_set_calls(), 1);
    let stats = g.registry.sync_stats(&group).expect("group");
    assert_eq!(stats.relays, 2);
    assert_eq!(stats.unchanged, 2);
}

#[test]
fn member_of_two_groups_is_updated_once() {
    let mut g = three_charts();
    let second = SyncGroupId::new("h");
    assert!(g.registry.join_sync(g.charts[0], second.clone(), None).expect("join a"));
    assert!(g.registry.join_sync(g.charts[1], second.clone(), None).expect("join b"));

    g.host(0)
        .move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(400.0, 200.0));
    g.registry.tick();

    assert_eq!(g.host(1).crosshair_set_calls(), 1);
    assert_eq!(g.host(2).crosshair_set_calls(), 1);
    assert_eq!(g.registry.sync_stats(&second).map(|stats| stats.relays), Some(0));
}
