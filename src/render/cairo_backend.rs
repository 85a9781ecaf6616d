use cairo::{Context, Format, ImageSurface, Operator};

use crate::error::{OverlayError, OverlayResult};
use crate::render::{Color, DrawCommand, OverlayFrame, OverlaySurface, Stroke};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CairoPaintStats {
    pub rects_drawn: usize,
    pub areas_drawn: usize,
    pub polylines_drawn: usize,
}

/// Transparent Cairo image surface stacked above the host chart canvas.
#[derive(Debug)]
pub struct CairoOverlaySurface {
    surface: ImageSurface,
    last_stats: CairoPaintStats,
}

impl CairoOverlaySurface {
    pub fn new(width: i32, height: i32) -> OverlayResult<Self> {
        if width <= 0 || height <= 0 {
            return Err(OverlayError::InvalidData(
                "cairo surface size must be > 0".to_owned(),
            ));
        }

        let surface = ImageSurface::create(Format::ARgb32, width, height)
            .map_err(|err| map_backend_error("failed to create cairo surface", err))?;
        Ok(Self {
            surface,
            last_stats: CairoPaintStats::default(),
        })
    }

    #[must_use]
    pub fn surface(&self) -> &ImageSurface {
        &self.surface
    }

    #[must_use]
    pub fn last_stats(&self) -> CairoPaintStats {
        self.last_stats
    }

    /// Paints `frame` onto an external context, e.g. a widget draw callback.
    pub fn paint_on_context(&mut self, context: &Context, frame: &OverlayFrame) -> OverlayResult<()> {
        frame.validate()?;
        clear_context(context)?;

        context
            .save()
            .map_err(|err| map_backend_error("failed to save context", err))?;
        context.rectangle(frame.clip.x, frame.clip.y, frame.clip.width, frame.clip.height);
        context.clip();

        let mut stats = CairoPaintStats::default();
        for command in &frame.commands {
            match command {
                DrawCommand::Rect(rect) => {
                    context.rectangle(rect.rect.x, rect.rect.y, rect.rect.width, rect.rect.height);
                    if let Some(fill) = rect.fill {
                        apply_color(context, fill);
                        context
                            .fill_preserve()
                            .map_err(|err| map_backend_error("failed to fill rectangle", err))?;
                    }
                    if let Some(border) = rect.border {
                        apply_stroke(context, border);
                        context
                            .stroke()
                            .map_err(|err| map_backend_error("failed to stroke rectangle", err))?;
                    } else {
                        context.new_path();
                    }
                    stats.rects_drawn += 1;
                }
                DrawCommand::Area(area) => {
                    let mut points = area.outline.iter();
                    if let Some(first) = points.next() {
                        context.move_to(first.x, first.y);
                        for point in points {
                            context.line_to(point.x, point.y);
                        }
                        context.close_path();
                        apply_color(context, area.fill);
                        context
                            .fill()
                            .map_err(|err| map_backend_error("failed to fill area", err))?;
                        stats.areas_drawn += 1;
                    }
                }
                DrawCommand::Polyline(line) => {
                    let mut points = line.points.iter();
                    if let Some(first) = points.next() {
                        context.move_to(first.x, first.y);
                        for point in points {
                            context.line_to(point.x, point.y);
                        }
                        apply_stroke(context, line.stroke);
                        context
                            .stroke()
                            .map_err(|err| map_backend_error("failed to stroke polyline", err))?;
                        stats.polylines_drawn += 1;
                    }
                }
            }
        }

        context
            .restore()
            .map_err(|err| map_backend_error("failed to restore context", err))?;
        self.last_stats = stats;
        Ok(())
    }
}

impl OverlaySurface for CairoOverlaySurface {
    fn paint(&mut self, frame: &OverlayFrame) -> OverlayResult<()> {
        let context = Context::new(&self.surface)
            .map_err(|err| map_backend_error("failed to create cairo context", err))?;
        self.paint_on_context(&context, frame)
    }

    fn clear(&mut self) -> OverlayResult<()> {
        let context = Context::new(&self.surface)
            .map_err(|err| map_backend_error("failed to create cairo context", err))?;
        self.last_stats = CairoPaintStats::default();
        clear_context(&context)
    }
}

fn clear_context(context: &Context) -> OverlayResult<()> {
    context.set_operator(Operator::Clear);
    context
        .paint()
        .map_err(|err| map_backend_error("failed to clear surface", err))?;
    context.set_operator(Operator::Over);
    Ok(())
}

fn apply_color(context: &Context, color: Color) {
    context.set_source_rgba(color.red, color.green, color.blue, color.alpha);
}

fn apply_stroke(context: &Context, stroke: Stroke) {
    apply_color(context, stroke.color);
    context.set_line_width(stroke.width);
    context.set_dash(&stroke.style.dash_pattern(stroke.width), 0.0);
}

fn map_backend_error(prefix: &str, err: cairo::Error) -> OverlayError {
    OverlayError::InvalidData(format!("{prefix}: {err}"))
}
