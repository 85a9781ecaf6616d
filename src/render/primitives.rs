use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use crate::core::{PixelPoint, PixelRect};
use crate::error::{OverlayError, OverlayResult};

/// RGBA color in normalized 0..=1 channel values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

impl Color {
    #[must_use]
    pub const fn rgba(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    #[must_use]
    pub const fn rgb(red: f64, green: f64, blue: f64) -> Self {
        Self::rgba(red, green, blue, 1.0)
    }

    /// Multiplies alpha by a primitive-level opacity, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_opacity(self, opacity: f64) -> Self {
        let opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            alpha: self.alpha * opacity,
            ..self
        }
    }

    #[must_use]
    pub fn is_transparent(self) -> bool {
        self.alpha <= 0.0
    }

    pub fn validate(self) -> OverlayResult<()> {
        for (channel, value) in [
            ("red", self.red),
            ("green", self.green),
            ("blue", self.blue),
            ("alpha", self.alpha),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(OverlayError::InvalidData(format!(
                    "color channel `{channel}` must be finite and in [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

/// Border/line pattern, expressed at paint time as a dash pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineStrokeStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl LineStrokeStyle {
    /// On/off dash lengths scaled by the stroke width; empty means solid.
    #[must_use]
    pub fn dash_pattern(self, width: f64) -> SmallVec<[f64; 2]> {
        let unit = if width.is_finite() && width > 0.0 {
            width
        } else {
            1.0
        };
        match self {
            Self::Solid => SmallVec::new(),
            Self::Dashed => smallvec![unit * 4.0, unit * 2.0],
            Self::Dotted => smallvec![unit, unit],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub color: Color,
    pub width: f64,
    #[serde(default)]
    pub style: LineStrokeStyle,
}

impl Stroke {
    #[must_use]
    pub const fn solid(color: Color, width: f64) -> Self {
        Self {
            color,
            width,
            style: LineStrokeStyle::Solid,
        }
    }

    pub fn validate(self) -> OverlayResult<()> {
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err(OverlayError::InvalidData(
                "stroke width must be finite and > 0".to_owned(),
            ));
        }
        self.color.validate()
    }
}

/// Filled (and optionally stroked) rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectCommand {
    pub rect: PixelRect,
    pub fill: Option<Color>,
    pub border: Option<Stroke>,
}

/// Closed filled polygon, used for band/ribbon fills.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaCommand {
    pub outline: Vec<PixelPoint>,
    pub fill: Color,
}

/// Open polyline, used for band/ribbon edges.
#[derive(Debug, Clone, PartialEq)]
pub struct PolylineCommand {
    pub points: Vec<PixelPoint>,
    pub stroke: Stroke,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect(RectCommand),
    Area(AreaCommand),
    Polyline(PolylineCommand),
}

impl DrawCommand {
    pub fn validate(&self) -> OverlayResult<()> {
        match self {
            Self::Rect(command) => {
                if !command.rect.has_area() {
                    return Err(OverlayError::InvalidData(
                        "rect command must have a finite positive area".to_owned(),
                    ));
                }
                if let Some(fill) = command.fill {
                    fill.validate()?;
                }
                if let Some(border) = command.border {
                    border.validate()?;
                }
                Ok(())
            }
            Self::Area(command) => {
                if command.outline.len() < 3 || command.outline.iter().any(|p| !p.is_finite()) {
                    return Err(OverlayError::InvalidData(
                        "area command needs at least three finite points".to_owned(),
                    ));
                }
                command.fill.validate()
            }
            Self::Polyline(command) => {
                if command.points.len() < 2 || command.points.iter().any(|p| !p.is_finite()) {
                    return Err(OverlayError::InvalidData(
                        "polyline command needs at least two finite points".to_owned(),
                    ));
                }
                command.stroke.validate()
            }
        }
    }
}
