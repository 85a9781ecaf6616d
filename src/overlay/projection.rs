use crate::core::{PaneId, PixelPoint, PixelRect, PriceAxisId};
use crate::host::HostChart;
use crate::render::{AreaCommand, Color, DrawCommand, PolylineCommand, RectCommand, Stroke};
use crate::snapshot::{CoordinateSnapshot, PaneBounds};

use super::primitive::{
    BandShape, LineSpec, PrimitiveShape, RectangleShape, RibbonShape, SignalStripeShape,
    VisualPrimitive,
};

/// Maps time/price anchors into container pixels for one paint pass.
///
/// Horizontal positions are offset by the content origin (left of the time
/// axis) and vertical positions by the pane top taken from the snapshot.
pub struct Projector<'a> {
    host: &'a dyn HostChart,
    snapshot: &'a CoordinateSnapshot,
}

impl<'a> Projector<'a> {
    #[must_use]
    pub fn new(host: &'a dyn HostChart, snapshot: &'a CoordinateSnapshot) -> Self {
        Self { host, snapshot }
    }

    #[must_use]
    pub fn x(&self, time: f64) -> Option<f64> {
        let x = self.host.time_to_pixel(time)?;
        let x = self.snapshot.time_axis.x + x;
        x.is_finite().then_some(x)
    }

    #[must_use]
    pub fn y(&self, pane: PaneBounds, axis: &PriceAxisId, price: f64) -> Option<f64> {
        let y = self.host.price_to_pixel(pane.pane, axis, price)?;
        let y = pane.offset() + y;
        y.is_finite().then_some(y)
    }

    #[must_use]
    pub fn point(&self, pane: PaneBounds, axis: &PriceAxisId, time: f64, price: f64) -> Option<PixelPoint> {
        Some(PixelPoint::new(self.x(time)?, self.y(pane, axis, price)?))
    }

    #[must_use]
    pub fn pane(&self, pane: PaneId) -> Option<PaneBounds> {
        self.snapshot
            .pane(pane)
            .filter(|bounds| bounds.rect.has_area())
    }

    /// Pixel width of one bar; falls back to the smallest gap between
    /// consecutive sample positions when the host cannot tell.
    #[must_use]
    pub fn bar_spacing(&self, xs: &[f64]) -> f64 {
        if let Some(spacing) = self.host.bar_spacing().filter(|s| s.is_finite() && *s > 0.0) {
            return spacing;
        }
        xs.windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .filter(|gap| *gap > 0.0)
            .fold(None, |min: Option<f64>, gap| Some(min.map_or(gap, |m| m.min(gap))))
            .unwrap_or(1.0)
    }
}

/// Draw commands for one primitive; empty when nothing maps.
#[must_use]
pub fn project(primitive: &VisualPrimitive, projector: &Projector<'_>) -> Vec<DrawCommand> {
    let Some(pane) = projector.pane(primitive.pane) else {
        return Vec::new();
    };
    let opacity = primitive.opacity;
    match &primitive.shape {
        PrimitiveShape::Rectangle(shape) => {
            project_rectangle(shape, pane, &primitive.axis, opacity, projector)
                .map(DrawCommand::Rect)
                .into_iter()
                .collect()
        }
        PrimitiveShape::Band(shape) => project_band(shape, pane, &primitive.axis, opacity, projector),
        PrimitiveShape::Ribbon(shape) => {
            project_ribbon(shape, pane, &primitive.axis, opacity, projector)
        }
        PrimitiveShape::SignalStripe(shape) => project_signal_stripe(shape, pane, opacity, projector),
    }
}

#[must_use]
pub fn project_rectangle(
    shape: &RectangleShape,
    pane: PaneBounds,
    axis: &PriceAxisId,
    opacity: f64,
    projector: &Projector<'_>,
) -> Option<RectCommand> {
    let a = projector.point(pane, axis, shape.time1, shape.price1)?;
    let b = projector.point(pane, axis, shape.time2, shape.price2)?;
    let rect = PixelRect::from_corners(a, b);
    if !rect.has_area() {
        return None;
    }
    Some(RectCommand {
        rect,
        fill: shape.fill.map(|fill| fill.with_opacity(opacity)),
        border: shape.border.map(|border| fade_stroke(border, opacity)),
    })
}

#[must_use]
pub fn project_band(
    shape: &BandShape,
    pane: PaneBounds,
    axis: &PriceAxisId,
    opacity: f64,
    projector: &Projector<'_>,
) -> Vec<DrawCommand> {
    let mut commands = Vec::new();
    if let Some(fill) = shape.fill {
        let edges = shape.points.iter().map(|point| {
            let x = projector.x(point.time)?;
            let upper = projector.y(pane, axis, point.upper?)?;
            let lower = projector.y(pane, axis, point.lower?)?;
            Some((x, upper, lower))
        });
        push_fills(&mut commands, edges, fill.with_opacity(opacity));
    }
    for (line, values) in [
        (shape.upper_line, shape.points.iter().map(|p| (p.time, p.upper)).collect::<Vec<_>>()),
        (shape.middle_line, shape.points.iter().map(|p| (p.time, p.middle)).collect()),
        (shape.lower_line, shape.points.iter().map(|p| (p.time, p.lower)).collect()),
    ] {
        push_line(&mut commands, line, &values, pane, axis, opacity, projector);
    }
    commands
}

#[must_use]
pub fn project_ribbon(
    shape: &RibbonShape,
    pane: PaneBounds,
    axis: &PriceAxisId,
    opacity: f64,
    projector: &Projector<'_>,
) -> Vec<DrawCommand> {
    let mut commands = Vec::new();
    if let Some(fill) = shape.fill {
        let edges = shape.points.iter().map(|point| {
            let x = projector.x(point.time)?;
            let upper = projector.y(pane, axis, point.upper?)?;
            let lower = projector.y(pane, axis, point.lower?)?;
            Some((x, upper, lower))
        });
        push_fills(&mut commands, edges, fill.with_opacity(opacity));
    }
    let upper: Vec<(f64, Option<f64>)> = shape.points.iter().map(|p| (p.time, p.upper)).collect();
    let lower: Vec<(f64, Option<f64>)> = shape.points.iter().map(|p| (p.time, p.lower)).collect();
    push_line(&mut commands, shape.upper_line, &upper, pane, axis, opacity, projector);
    push_line(&mut commands, shape.lower_line, &lower, pane, axis, opacity, projector);
    commands
}

/// One span per run of equal values, covering the full pane height.
#[must_use]
pub fn project_signal_stripe(
    shape: &SignalStripeShape,
    pane: PaneBounds,
    opacity: f64,
    projector: &Projector<'_>,
) -> Vec<DrawCommand> {
    let xs: Vec<f64> = shape
        .samples
        .iter()
        .filter_map(|sample| projector.x(sample.time))
        .collect();
    let half = projector.bar_spacing(&xs) / 2.0;
    shape
        .runs()
        .into_iter()
        .filter_map(|run| {
            let color = shape.palette.color_for(run.value)?;
            let left = projector.x(run.first_time)? - half;
            let right = projector.x(run.last_time)? + half;
            let rect = PixelRect::new(left, pane.rect.y, right - left, pane.rect.height);
            rect.has_area().then(|| {
                DrawCommand::Rect(RectCommand {
                    rect,
                    fill: Some(color.with_opacity(opacity)),
                    border: None,
                })
            })
        })
        .collect()
}

/// Splits a mapped series at every missing entry.
#[must_use]
pub fn split_runs<T>(items: impl IntoIterator<Item = Option<T>>) -> Vec<Vec<T>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for item in items {
        match item {
            Some(value) => current.push(value),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn push_fills(
    commands: &mut Vec<DrawCommand>,
    edges: impl IntoIterator<Item = Option<(f64, f64, f64)>>,
    fill: Color,
) {
    if fill.is_transparent() {
        return;
    }
    for run in split_runs(edges) {
        if run.len() < 2 {
            continue;
        }
        let mut outline: Vec<PixelPoint> = run
            .iter()
            .map(|(x, upper, _)| PixelPoint::new(*x, *upper))
            .collect();
        outline.extend(run.iter().rev().map(|(x, _, lower)| PixelPoint::new(*x, *lower)));
        commands.push(DrawCommand::Area(AreaCommand { outline, fill }));
    }
}

fn push_line(
    commands: &mut Vec<DrawCommand>,
    line: LineSpec,
    values: &[(f64, Option<f64>)],
    pane: PaneBounds,
    axis: &PriceAxisId,
    opacity: f64,
    projector: &Projector<'_>,
) {
    if !line.visible {
        return;
    }
    let stroke = fade_stroke(line.stroke, opacity);
    let points = values
        .iter()
        .map(|(time, price)| projector.point(pane, axis, *time, (*price)?));
    for run in split_runs(points) {
        if run.len() >= 2 {
            commands.push(DrawCommand::Polyline(PolylineCommand { points: run, stroke }));
        }
    }
}

fn fade_stroke(stroke: Stroke, opacity: f64) -> Stroke {
    Stroke {
        color: stroke.color.with_opacity(opacity),
        ..stroke
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Projector, project, split_runs};
    use crate::core::{ChartId, ContainerId, Viewport};
    use crate::host::{Container, HeadlessChart, HeadlessChartSpec};
    use crate::overlay::{PrimitiveShape, RibbonPoint, RibbonShape, LineSpec, VisualPrimitive};
    use crate::render::{Color, DrawCommand, Stroke};
    use crate::snapshot::SnapshotBuilder;

    #[test]
    fn split_runs_breaks_on_gaps() {
        let runs = split_runs([Some(1), Some(2), None, None, Some(3), None]);
        assert_eq!(runs, vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn rectangle_is_offset_by_content_origin() {
        let host = HeadlessChart::new(Viewport::new(860, 428), &HeadlessChartSpec::default())
            .expect("chart");
        let container = Container::new(ContainerId::new("c"), Viewport::new(860, 428));
        let mut builder = SnapshotBuilder::new(Duration::from_millis(100));
        let snapshot = builder.compute(ChartId::new(1), &host, &container, Duration::ZERO, true);
        let projector = Projector::new(&host, &snapshot);

        let primitive = VisualPrimitive::rectangle(25.0, 75.0, 50.0, 25.0, Color::rgb(0.0, 0.5, 0.0));
        let commands = project(&primitive, &projector);
        let [DrawCommand::Rect(rect)] = commands.as_slice() else {
            panic!("expected one rect, got {commands:?}");
        };
        assert!((rect.rect.x - 200.0).abs() <= 1e-9);
        assert!((rect.rect.width - 200.0).abs() <= 1e-9);
        assert!((rect.rect.y - 100.0).abs() <= 1e-9);
        assert!((rect.rect.height - 200.0).abs() <= 1e-9);
    }

    #[test]
    fn ribbon_single_point_runs_do_not_fill() {
        let host = HeadlessChart::new(Viewport::new(860, 428), &HeadlessChartSpec::default())
            .expect("chart");
        let container = Container::new(ContainerId::new("c"), Viewport::new(860, 428));
        let mut builder = SnapshotBuilder::new(Duration::from_millis(100));
        let snapshot = builder.compute(ChartId::new(1), &host, &container, Duration::ZERO, true);
        let projector = Projector::new(&host, &snapshot);

        let stroke = Stroke::solid(Color::rgb(0.0, 0.0, 1.0), 1.0);
        let point = |time: f64, present: bool| RibbonPoint {
            time,
            upper: present.then_some(60.0),
            lower: present.then_some(40.0),
        };
        let primitive = VisualPrimitive::new(PrimitiveShape::Ribbon(RibbonShape {
            points: vec![point(10.0, true), point(11.0, false), point(12.0, true)],
            upper_line: LineSpec::new(stroke),
            lower_line: LineSpec::new(stroke),
            fill: Some(Color::rgba(0.0, 0.0, 1.0, 0.2)),
        }));
        assert!(project(&primitive, &projector).is_empty());
    }
}
