use tracing::{debug, trace, warn};

use crate::core::ChartId;
use crate::error::OverlayResult;
use crate::host::HostChart;
use crate::render::{OverlayFrame, OverlaySurface};
use crate::snapshot::CoordinateSnapshot;

use super::primitive::VisualPrimitive;
use super::projection::{Projector, project};

/// What the caller has to do after a renderer mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedrawDirective {
    /// First request since the last paint: a frame must be requested.
    RequestFrame,
    /// A repaint is already pending and will pick the change up.
    Coalesced,
    /// Nothing visible changed.
    Unchanged,
    /// The renderer was destroyed; nothing will ever paint.
    Inert,
}

impl RedrawDirective {
    #[must_use]
    pub fn needs_frame(self) -> bool {
        matches!(self, Self::RequestFrame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaintStats {
    pub paint_passes: u64,
    pub redraw_requests: u64,
    pub coalesced_requests: u64,
    pub last_command_count: usize,
    pub commands_emitted: u64,
    pub rejected_primitives: u64,
}

/// Per-chart overlay renderer.
///
/// Mutations only mark the renderer dirty; painting happens when the owner
/// runs the frame the returned [`RedrawDirective`] asked for.
pub struct PrimitiveRenderer {
    chart: ChartId,
    surface: Box<dyn OverlaySurface>,
    primitives: Vec<VisualPrimitive>,
    redraw_pending: bool,
    destroyed: bool,
    stats: PaintStats,
}

impl PrimitiveRenderer {
    #[must_use]
    pub fn attach(chart: ChartId, surface: Box<dyn OverlaySurface>) -> Self {
        debug!(chart_id = %chart, "overlay renderer attached");
        Self {
            chart,
            surface,
            primitives: Vec::new(),
            redraw_pending: false,
            destroyed: false,
            stats: PaintStats::default(),
        }
    }

    #[must_use]
    pub fn chart(&self) -> ChartId {
        self.chart
    }

    #[must_use]
    pub fn primitives(&self) -> &[VisualPrimitive] {
        &self.primitives
    }

    #[must_use]
    pub fn stats(&self) -> PaintStats {
        self.stats
    }

    #[must_use]
    pub fn is_redraw_pending(&self) -> bool {
        self.redraw_pending
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Replaces every primitive. Invalid entries are dropped with a warning.
    pub fn set_primitives(&mut self, primitives: Vec<VisualPrimitive>) -> RedrawDirective {
        if self.destroyed {
            return RedrawDirective::Inert;
        }
        self.primitives.clear();
        for primitive in primitives {
            if let Some(primitive) = self.accept(primitive) {
                self.insert(primitive);
            }
        }
        self.schedule_redraw()
    }

    /// Appends a primitive, replacing any existing one with the same id.
    pub fn add_primitive(&mut self, primitive: VisualPrimitive) -> RedrawDirective {
        if self.destroyed {
            return RedrawDirective::Inert;
        }
        match self.accept(primitive) {
            Some(primitive) => {
                self.insert(primitive);
                self.schedule_redraw()
            }
            None => RedrawDirective::Unchanged,
        }
    }

    /// Returns `None` when no primitive carries `id`.
    pub fn remove_primitive(&mut self, id: &str) -> Option<RedrawDirective> {
        if self.destroyed {
            return None;
        }
        let index = self
            .primitives
            .iter()
            .position(|primitive| primitive.id.as_deref() == Some(id))?;
        self.primitives.remove(index);
        Some(self.schedule_redraw())
    }

    pub fn clear(&mut self) -> RedrawDirective {
        if self.destroyed {
            return RedrawDirective::Inert;
        }
        self.primitives.clear();
        self.schedule_redraw()
    }

    /// Marks the renderer dirty. Only the first call between two paints asks
    /// for a frame.
    pub fn schedule_redraw(&mut self) -> RedrawDirective {
        if self.destroyed {
            return RedrawDirective::Inert;
        }
        self.stats.redraw_requests = self.stats.redraw_requests.saturating_add(1);
        if self.redraw_pending {
            self.stats.coalesced_requests = self.stats.coalesced_requests.saturating_add(1);
            return RedrawDirective::Coalesced;
        }
        self.redraw_pending = true;
        trace!(chart_id = %self.chart, "overlay redraw scheduled");
        RedrawDirective::RequestFrame
    }

    /// Forgets a pending redraw whose frame was cancelled.
    pub fn cancel_pending(&mut self) {
        self.redraw_pending = false;
    }

    /// Projects every visible primitive, bottom z-order first.
    #[must_use]
    pub fn build_frame(&self, host: &dyn HostChart, snapshot: &CoordinateSnapshot) -> OverlayFrame {
        let mut frame = OverlayFrame::new(snapshot.container, snapshot.content_rect());
        if !snapshot.valid || !frame.clip.has_area() {
            return frame;
        }
        let projector = Projector::new(host, snapshot);
        let mut ordered: Vec<&VisualPrimitive> =
            self.primitives.iter().filter(|primitive| primitive.visible).collect();
        ordered.sort_by_key(|primitive| primitive.z_order);
        for primitive in ordered {
            let commands = project(primitive, &projector);
            if commands.is_empty() {
                trace!(chart_id = %self.chart, primitive = %primitive.label(), "primitive outside mapped domain, skipped");
            }
            frame.commands.extend(commands);
        }
        frame
    }

    /// Paints the pending redraw. A no-op once destroyed.
    pub fn paint(&mut self, host: &dyn HostChart, snapshot: &CoordinateSnapshot) -> OverlayResult<()> {
        self.redraw_pending = false;
        if self.destroyed || host.is_disposed() {
            return Ok(());
        }
        let frame = self.build_frame(host, snapshot);
        self.stats.paint_passes = self.stats.paint_passes.saturating_add(1);
        self.stats.last_command_count = frame.commands.len();
        self.stats.commands_emitted = self
            .stats
            .commands_emitted
            .saturating_add(frame.commands.len() as u64);
        if frame.is_empty() {
            return self.surface.clear();
        }
        self.surface.paint(&frame)
    }

    /// Releases the surface; every later call is inert.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.redraw_pending = false;
        self.primitives.clear();
        self.surface.destroy();
        debug!(chart_id = %self.chart, "overlay renderer destroyed");
    }

    fn accept(&mut self, primitive: VisualPrimitive) -> Option<VisualPrimitive> {
        match primitive.validated() {
            Ok(primitive) => Some(primitive),
            Err(err) => {
                self.stats.rejected_primitives = self.stats.rejected_primitives.saturating_add(1);
                warn!(chart_id = %self.chart, error = %err, "dropping invalid primitive");
                None
            }
        }
    }

    fn insert(&mut self, primitive: VisualPrimitive) {
        let existing = primitive.id.as_deref().and_then(|id| {
            self.primitives
                .iter()
                .position(|current| current.id.as_deref() == Some(id))
        });
        match existing {
            Some(index) => self.primitives[index] = primitive,
            None => self.primitives.push(primitive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PrimitiveRenderer, RedrawDirective};
    use crate::core::ChartId;
    use crate::overlay::{VisualPrimitive, ZOrder};
    use crate::render::{Color, NullSurface};

    fn renderer() -> PrimitiveRenderer {
        PrimitiveRenderer::attach(ChartId::new(7), Box::new(NullSurface::default()))
    }

    #[test]
    fn redraw_requests_coalesce_until_paint() {
        let mut renderer = renderer();
        assert_eq!(renderer.schedule_redraw(), RedrawDirective::RequestFrame);
        assert_eq!(renderer.schedule_redraw(), RedrawDirective::Coalesced);
        renderer.cancel_pending();
        assert!(renderer.schedule_redraw().needs_frame());
    }

    #[test]
    fn add_replaces_by_id_and_drops_invalid() {
        let mut renderer = renderer();
        let green = Color::rgb(0.0, 1.0, 0.0);
        renderer.add_primitive(VisualPrimitive::rectangle(1.0, 1.0, 2.0, 2.0, green).with_id("a"));
        renderer.add_primitive(
            VisualPrimitive::rectangle(3.0, 3.0, 4.0, 4.0, green)
                .with_id("a")
                .with_z_order(ZOrder::Top),
        );
        renderer.add_primitive(VisualPrimitive::rectangle(f64::INFINITY, 1.0, 2.0, 2.0, green));
        assert_eq!(renderer.primitives().len(), 1);
        assert_eq!(renderer.primitives()[0].z_order, ZOrder::Top);
        assert_eq!(renderer.stats().rejected_primitives, 1);
        assert!(renderer.remove_primitive("a").is_some());
        assert!(renderer.remove_primitive("a").is_none());
    }

    #[test]
    fn destroyed_renderer_is_inert() {
        let mut renderer = renderer();
        renderer.destroy();
        assert_eq!(renderer.clear(), RedrawDirective::Inert);
        assert_eq!(renderer.schedule_redraw(), RedrawDirective::Inert);
    }
}
