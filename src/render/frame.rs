use crate::core::{PixelRect, Viewport};
use crate::error::OverlayResult;

use super::DrawCommand;

/// Backend-agnostic overlay scene for one paint pass.
///
/// Commands are in container pixel space and must be painted in order, with
/// everything clipped to `clip`.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFrame {
    pub viewport: Viewport,
    pub clip: PixelRect,
    pub commands: Vec<DrawCommand>,
}

impl OverlayFrame {
    #[must_use]
    pub fn new(viewport: Viewport, clip: PixelRect) -> Self {
        Self {
            viewport,
            clip,
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn validate(&self) -> OverlayResult<()> {
        for command in &self.commands {
            command.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[must_use]
    pub fn area_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Area(_)))
            .count()
    }

    #[must_use]
    pub fn rect_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Rect(_)))
            .count()
    }

    #[must_use]
    pub fn polyline_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Polyline(_)))
            .count()
    }
}
