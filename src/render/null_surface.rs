use crate::error::OverlayResult;
use crate::render::{OverlayFrame, OverlaySurface};

/// Surface that keeps the last frame instead of drawing it.
///
/// It still validates frame content so tests catch invalid geometry without a
/// real backend.
#[derive(Debug, Default)]
pub struct NullSurface {
    pub paint_calls: usize,
    pub clear_calls: usize,
    pub last_frame: Option<OverlayFrame>,
    pub destroyed: bool,
}

impl OverlaySurface for NullSurface {
    fn paint(&mut self, frame: &OverlayFrame) -> OverlayResult<()> {
        frame.validate()?;
        self.paint_calls += 1;
        self.last_frame = Some(frame.clone());
        Ok(())
    }

    fn clear(&mut self) -> OverlayResult<()> {
        self.clear_calls += 1;
        self.last_frame = None;
        Ok(())
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.last_frame = None;
    }
}
