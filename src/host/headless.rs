use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::ChartConfig;
use crate::core::{
    ChartId, ContainerId, PaneId, PaneSlice, PaneStack, PixelPoint, PriceAxisId, PriceScale,
    PriceScaleMode, TimeRange, TimeScale, Viewport,
};
use crate::error::OverlayResult;
use crate::render::NullSurface;

use super::{
    AxisSide, Container, ContainerLocator, CrosshairPosition, HostChart, HostChartFactory,
    HostError, HostEvent, HostResult, MountedChart, PaneSize, PriceAxisInfo, ViewportChange,
    ViewportChangeReason,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlessAxisSpec {
    pub id: PriceAxisId,
    pub side: AxisSide,
    pub width: f64,
    pub price_min: f64,
    pub price_max: f64,
    #[serde(default)]
    pub mode: PriceScaleMode,
}

/// Declarative layout of a [`HeadlessChart`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlessChartSpec {
    pub time_start: f64,
    pub time_end: f64,
    pub bar_interval: f64,
    pub time_axis_height: f64,
    pub axes: Vec<HeadlessAxisSpec>,
    pub pane_stretch_factors: Vec<f64>,
    pub pane_separator_px: f64,
}

impl Default for HeadlessChartSpec {
    fn default() -> Self {
        Self {
            time_start: 0.0,
            time_end: 100.0,
            bar_interval: 1.0,
            time_axis_height: 28.0,
            axes: vec![HeadlessAxisSpec {
                id: PriceAxisId::right(),
                side: AxisSide::Right,
                width: 60.0,
                price_min: 0.0,
                price_max: 100.0,
                mode: PriceScaleMode::Linear,
            }],
            pane_stretch_factors: vec![1.0],
            pane_separator_px: 1.0,
        }
    }
}

impl HeadlessChartSpec {
    #[must_use]
    pub fn with_axis(mut self, axis: HeadlessAxisSpec) -> Self {
        self.axes.retain(|existing| existing.id != axis.id);
        self.axes.push(axis);
        self
    }

    #[must_use]
    pub fn with_panes(mut self, stretch_factors: Vec<f64>) -> Self {
        self.pane_stretch_factors = stretch_factors;
        self
    }

    #[must_use]
    pub fn with_time_range(mut self, start: f64, end: f64) -> Self {
        self.time_start = start;
        self.time_end = end;
        self
    }
}

#[derive(Debug)]
struct HeadlessAxis {
    side: AxisSide,
    width: f64,
    scale: PriceScale,
}

#[derive(Debug)]
struct HeadlessState {
    size: Viewport,
    time_scale: TimeScale,
    time_axis_height: f64,
    axes: IndexMap<PriceAxisId, HeadlessAxis>,
    panes: PaneStack,
    crosshair: Option<CrosshairPosition>,
    outbox: Vec<HostEvent>,
    disposed: bool,
    fail_geometry: bool,
    range_set_calls: usize,
    crosshair_set_calls: usize,
}

impl HeadlessState {
    fn side_width(&self, side: AxisSide) -> f64 {
        self.axes
            .values()
            .filter(|axis| axis.side == side)
            .map(|axis| axis.width)
            .fold(0.0, f64::max)
    }

    fn content_width(&self) -> f64 {
        (f64::from(self.size.width) - self.side_width(AxisSide::Left) - self.side_width(AxisSide::Right))
            .max(0.0)
    }

    fn panes_height(&self) -> f64 {
        (f64::from(self.size.height) - self.time_axis_height).max(0.0)
    }

    fn pane_slice(&self, index: usize) -> Option<PaneSlice> {
        self.panes.layout(self.panes_height()).get(index).copied()
    }

    fn check_geometry(&self) -> HostResult<()> {
        if self.disposed {
            return Err(HostError::Disposed);
        }
        if self.fail_geometry {
            return Err(HostError::Geometry("injected geometry failure".to_owned()));
        }
        Ok(())
    }

    fn time_to_pixel(&self, time: f64) -> Option<f64> {
        self.check_geometry().ok()?;
        self.time_scale.time_to_pixel(time, self.content_width()).ok()
    }

    fn price_to_pixel(&self, pane: PaneId, axis: &PriceAxisId, price: f64) -> Option<f64> {
        self.check_geometry().ok()?;
        let slice = self.pane_slice(pane.index())?;
        let axis = self.axes.get(axis)?;
        axis.scale.price_to_pixel(price, slice.height).ok()
    }

    fn emit_viewport(&mut self, reason: ViewportChangeReason, size: Option<Viewport>) {
        let visible_range = Some(self.time_scale.visible_range());
        self.outbox.push(HostEvent::ViewportChanged(ViewportChange {
            reason,
            visible_range,
            size,
        }));
    }
}

/// In-memory Host Chart with linear/log price axes and stacked panes.
///
/// Clones share state, so an embedding (or a test) can keep a handle to drive
/// pointer and viewport interactions while the registry owns another.
#[derive(Debug, Clone)]
pub struct HeadlessChart {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessChart {
    pub fn new(size: Viewport, spec: &HeadlessChartSpec) -> OverlayResult<Self> {
        let time_scale = TimeScale::new(spec.time_start, spec.time_end, spec.bar_interval)?;
        let mut axes = IndexMap::new();
        for axis in &spec.axes {
            let scale = PriceScale::with_mode(axis.price_min, axis.price_max, axis.mode)?;
            axes.insert(
                axis.id.clone(),
                HeadlessAxis {
                    side: axis.side,
                    width: if axis.side == AxisSide::Overlay {
                        0.0
                    } else {
                        axis.width.max(0.0)
                    },
                    scale,
                },
            );
        }
        let panes = PaneStack::with_stretch_factors(&spec.pane_stretch_factors, spec.pane_separator_px)?;
        Ok(Self {
            state: Rc::new(RefCell::new(HeadlessState {
                size,
                time_scale,
                time_axis_height: spec.time_axis_height.max(0.0),
                axes,
                panes,
                crosshair: None,
                outbox: Vec::new(),
                disposed: false,
                fail_geometry: false,
                range_set_calls: 0,
                crosshair_set_calls: 0,
            })),
        })
    }

    /// Simulates a user drag that shifts the visible range by `delta_time`.
    pub fn pan_by(&self, delta_time: f64) -> OverlayResult<()> {
        let mut state = self.state.borrow_mut();
        state.time_scale.pan_visible_by_delta(delta_time)?;
        state.emit_viewport(ViewportChangeReason::Pan, None);
        Ok(())
    }

    pub fn zoom_by(&self, factor: f64, anchor_time: f64) -> OverlayResult<()> {
        let mut state = self.state.borrow_mut();
        state.time_scale.zoom_visible_by_factor(factor, anchor_time)?;
        state.emit_viewport(ViewportChangeReason::Zoom, None);
        Ok(())
    }

    /// Simulates the pointer hovering at `point` (pane-local pixels).
    pub fn move_pointer(&self, pane: PaneId, axis: &PriceAxisId, point: PixelPoint) {
        let position = self.position_at(pane, axis, point);
        let mut state = self.state.borrow_mut();
        state.crosshair = position.clone();
        state.outbox.push(HostEvent::CrosshairMoved(position));
    }

    pub fn leave_pointer(&self) {
        let mut state = self.state.borrow_mut();
        state.crosshair = None;
        state.outbox.push(HostEvent::CrosshairMoved(None));
    }

    pub fn click(&self, pane: PaneId, axis: &PriceAxisId, point: PixelPoint) {
        if let Some(position) = self.position_at(pane, axis, point) {
            self.state
                .borrow_mut()
                .outbox
                .push(HostEvent::Clicked(position));
        }
    }

    /// Makes every geometry query fail until reset, as a torn-down page would.
    pub fn set_fail_geometry(&self, fail: bool) {
        self.state.borrow_mut().fail_geometry = fail;
    }

    pub fn set_price_domain(&self, axis: &PriceAxisId, price_min: f64, price_max: f64) -> OverlayResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(entry) = state.axes.get_mut(axis) {
            entry.scale.set_domain(price_min, price_max)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn crosshair(&self) -> Option<CrosshairPosition> {
        self.state.borrow().crosshair.clone()
    }

    #[must_use]
    pub fn range_set_calls(&self) -> usize {
        self.state.borrow().range_set_calls
    }

    #[must_use]
    pub fn crosshair_set_calls(&self) -> usize {
        self.state.borrow().crosshair_set_calls
    }

    #[must_use]
    pub fn pending_notifications(&self) -> usize {
        self.state.borrow().outbox.len()
    }

    fn position_at(&self, pane: PaneId, axis: &PriceAxisId, point: PixelPoint) -> Option<CrosshairPosition> {
        let time = self.pixel_to_time(point.x)?;
        let price = self.pixel_to_price(pane, axis, point.y)?;
        Some(CrosshairPosition {
            time,
            price,
            axis: axis.clone(),
            pane,
            point,
        })
    }
}

impl HostChart for HeadlessChart {
    fn is_disposed(&self) -> bool {
        self.state.borrow().disposed
    }

    fn time_to_pixel(&self, time: f64) -> Option<f64> {
        self.state.borrow().time_to_pixel(time)
    }

    fn pixel_to_time(&self, x: f64) -> Option<f64> {
        let state = self.state.borrow();
        state.check_geometry().ok()?;
        state.time_scale.pixel_to_time(x, state.content_width()).ok()
    }

    fn price_to_pixel(&self, pane: PaneId, axis: &PriceAxisId, price: f64) -> Option<f64> {
        self.state.borrow().price_to_pixel(pane, axis, price)
    }

    fn pixel_to_price(&self, pane: PaneId, axis: &PriceAxisId, y: f64) -> Option<f64> {
        let state = self.state.borrow();
        state.check_geometry().ok()?;
        let slice = state.pane_slice(pane.index())?;
        state.axes.get(axis)?.scale.pixel_to_price(y, slice.height).ok()
    }

    fn bar_spacing(&self) -> Option<f64> {
        let state = self.state.borrow();
        state.check_geometry().ok()?;
        state.time_scale.bar_spacing(state.content_width()).ok()
    }

    fn container_size(&self) -> HostResult<Viewport> {
        let state = self.state.borrow();
        state.check_geometry()?;
        Ok(state.size)
    }

    fn time_axis_height(&self) -> HostResult<f64> {
        let state = self.state.borrow();
        state.check_geometry()?;
        Ok(state.time_axis_height)
    }

    fn price_axes(&self) -> HostResult<Vec<PriceAxisInfo>> {
        let state = self.state.borrow();
        state.check_geometry()?;
        Ok(state
            .axes
            .iter()
            .map(|(id, axis)| PriceAxisInfo {
                id: id.clone(),
                side: axis.side,
                width: axis.width,
            })
            .collect())
    }

    fn pane_count(&self) -> HostResult<usize> {
        let state = self.state.borrow();
        state.check_geometry()?;
        Ok(state.panes.len())
    }

    fn pane_size(&self, index: usize) -> HostResult<PaneSize> {
        let state = self.state.borrow();
        state.check_geometry()?;
        let slice = state.pane_slice(index).ok_or(HostError::UnknownPane(index))?;
        Ok(PaneSize {
            width: state.content_width(),
            height: slice.height,
        })
    }

    fn pane_offset(&self, index: usize) -> HostResult<f64> {
        let state = self.state.borrow();
        state.check_geometry()?;
        state
            .pane_slice(index)
            .map(|slice| slice.top)
            .ok_or(HostError::UnknownPane(index))
    }

    fn visible_time_range(&self) -> Option<TimeRange> {
        let state = self.state.borrow();
        (!state.disposed).then(|| state.time_scale.visible_range())
    }

    fn crosshair_position(&self) -> Option<CrosshairPosition> {
        let state = self.state.borrow();
        if state.disposed {
            return None;
        }
        state.crosshair.clone()
    }

    fn set_visible_time_range(&mut self, range: TimeRange) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        if state.disposed {
            return Err(HostError::Disposed);
        }
        state
            .time_scale
            .set_visible_range(range.from, range.to)
            .map_err(|err| HostError::Rejected(err.to_string()))?;
        state.range_set_calls += 1;
        state.emit_viewport(ViewportChangeReason::RangeSet, None);
        Ok(())
    }

    fn set_crosshair(
        &mut self,
        pane: PaneId,
        point: PixelPoint,
        time: f64,
        price: f64,
    ) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        if state.disposed {
            return Err(HostError::Disposed);
        }
        let axis = state
            .axes
            .keys()
            .next()
            .cloned()
            .unwrap_or_default();
        let position = CrosshairPosition {
            time,
            price,
            axis,
            pane,
            point,
        };
        state.crosshair = Some(position.clone());
        state.crosshair_set_calls += 1;
        state.outbox.push(HostEvent::CrosshairMoved(Some(position)));
        Ok(())
    }

    fn clear_crosshair(&mut self) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        if state.disposed {
            return Err(HostError::Disposed);
        }
        if state.crosshair.take().is_some() {
            state.crosshair_set_calls += 1;
            state.outbox.push(HostEvent::CrosshairMoved(None));
        }
        Ok(())
    }

    fn resize(&mut self, size: Viewport) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        if state.disposed {
            return Err(HostError::Disposed);
        }
        if state.size != size {
            state.size = size;
            state.emit_viewport(ViewportChangeReason::Resize, Some(size));
        }
        Ok(())
    }

    fn take_notifications(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.state.borrow_mut().outbox)
    }

    fn dispose(&mut self) {
        let mut state = self.state.borrow_mut();
        state.disposed = true;
        state.outbox.clear();
        state.crosshair = None;
    }
}

#[derive(Debug, Clone, Copy)]
struct PageEntry {
    size: Viewport,
    probes_before_ready: u32,
    probes: u32,
}

/// Page model whose containers can become available only after some probes,
/// reproducing a host that lays out its DOM late.
#[derive(Debug, Clone, Default)]
pub struct HeadlessPage {
    entries: Rc<RefCell<HashMap<ContainerId, PageEntry>>>,
}

impl HeadlessPage {
    pub fn insert(&self, id: ContainerId, size: Viewport) {
        self.insert_delayed(id, size, 0);
    }

    pub fn insert_delayed(&self, id: ContainerId, size: Viewport, probes_before_ready: u32) {
        self.entries.borrow_mut().insert(
            id,
            PageEntry {
                size,
                probes_before_ready,
                probes: 0,
            },
        );
    }

    pub fn remove(&self, id: &ContainerId) {
        self.entries.borrow_mut().remove(id);
    }

    #[must_use]
    pub fn probe_count(&self, id: &ContainerId) -> u32 {
        self.entries
            .borrow()
            .get(id)
            .map_or(0, |entry| entry.probes)
    }
}

impl ContainerLocator for HeadlessPage {
    fn locate(&mut self, id: &ContainerId) -> Option<Viewport> {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.get_mut(id)?;
        entry.probes = entry.probes.saturating_add(1);
        (entry.probes > entry.probes_before_ready).then_some(entry.size)
    }
}

#[derive(Debug, Default)]
struct FactoryState {
    default_spec: HeadlessChartSpec,
    specs: HashMap<ContainerId, HeadlessChartSpec>,
    charts: IndexMap<ChartId, HeadlessChart>,
}

/// Factory producing [`HeadlessChart`]s backed by [`NullSurface`]s.
#[derive(Debug, Clone, Default)]
pub struct HeadlessFactory {
    state: Rc<RefCell<FactoryState>>,
}

impl HeadlessFactory {
    #[must_use]
    pub fn with_default_spec(spec: HeadlessChartSpec) -> Self {
        let factory = Self::default();
        factory.state.borrow_mut().default_spec = spec;
        factory
    }

    pub fn set_spec_for(&self, container: ContainerId, spec: HeadlessChartSpec) {
        self.state.borrow_mut().specs.insert(container, spec);
    }

    /// Handle to the chart created for `chart`, if it was mounted.
    #[must_use]
    pub fn chart(&self, chart: ChartId) -> Option<HeadlessChart> {
        self.state.borrow().charts.get(&chart).cloned()
    }
}

impl HostChartFactory for HeadlessFactory {
    fn create(
        &mut self,
        chart: ChartId,
        container: &Container,
        _config: &ChartConfig,
    ) -> HostResult<MountedChart> {
        let mut state = self.state.borrow_mut();
        let spec = state
            .specs
            .get(&container.id)
            .unwrap_or(&state.default_spec)
            .clone();
        let host = HeadlessChart::new(container.size, &spec)
            .map_err(|err| HostError::Rejected(err.to_string()))?;
        state.charts.insert(chart, host.clone());
        Ok(MountedChart {
            host: Box::new(host),
            surface: Box::new(NullSurface::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{HeadlessChart, HeadlessChartSpec};
    use crate::core::{PaneId, PixelPoint, PriceAxisId, TimeRange, Viewport};
    use crate::host::{HostChart, HostEvent};

    #[test]
    fn geometry_excludes_axes() {
        let chart = HeadlessChart::new(Viewport::new(860, 428), &HeadlessChartSpec::default())
            .expect("chart");
        let pane = chart.pane_size(0).expect("pane");
        assert!((pane.width - 800.0).abs() <= 1e-9);
        assert!((pane.height - 400.0).abs() <= 1e-9);
        assert!((chart.time_to_pixel(50.0).expect("x") - 400.0).abs() <= 1e-9);
    }

    #[test]
    fn setters_emit_notifications() {
        let mut chart = HeadlessChart::new(Viewport::new(860, 428), &HeadlessChartSpec::default())
            .expect("chart");
        chart
            .set_visible_time_range(TimeRange::new(10.0, 20.0).expect("range"))
            .expect("set range");
        chart.move_pointer(PaneId::new(0), &PriceAxisId::right(), PixelPoint::new(10.0, 10.0));
        let events = chart.take_notifications();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], HostEvent::ViewportChanged(_)));
        assert!(matches!(events[1], HostEvent::CrosshairMoved(Some(_))));
        assert!(chart.take_notifications().is_empty());
    }

    #[test]
    fn disposed_chart_refuses_geometry() {
        let mut chart = HeadlessChart::new(Viewport::new(400, 300), &HeadlessChartSpec::default())
            .expect("chart");
        chart.dispose();
        assert!(chart.is_disposed());
        assert!(chart.pane_count().is_err());
        assert!(chart.time_to_pixel(1.0).is_none());
    }
}
