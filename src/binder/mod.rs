//! Positions legends and range switchers relative to pane bounds.

use serde::{Deserialize, Serialize};

use crate::core::{PaneId, PixelRect, TimeRange};
use crate::error::{OverlayError, OverlayResult};
use crate::snapshot::CoordinateSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendAnchor {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundElementKind {
    #[default]
    Legend,
    RangeSwitcher,
}

/// An auxiliary element pinned to a pane corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendBinding {
    pub id: String,
    #[serde(default)]
    pub kind: BoundElementKind,
    /// Explicit pane; otherwise the pane of the first listed series.
    #[serde(default)]
    pub pane: Option<PaneId>,
    #[serde(default)]
    pub series: Vec<String>,
    #[serde(default)]
    pub anchor: LegendAnchor,
    #[serde(default = "default_margin")]
    pub margin: f64,
    pub width: f64,
    pub height: f64,
}

fn default_margin() -> f64 {
    8.0
}

impl LegendBinding {
    pub fn validate(&self) -> OverlayResult<()> {
        for (name, value) in [("margin", self.margin), ("width", self.width), ("height", self.height)] {
            if !value.is_finite() || value < 0.0 {
                return Err(OverlayError::InvalidData(format!(
                    "legend `{}`: `{name}` must be finite and >= 0",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Data extent of one series as reported by the series layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRange {
    pub series: String,
    #[serde(default)]
    pub pane: PaneId,
    #[serde(default)]
    pub time: Option<TimeRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendPlacement {
    pub id: String,
    pub kind: BoundElementKind,
    pub pane: PaneId,
    pub rect: PixelRect,
    /// `false` when the pane is missing or too small for the element.
    pub visible: bool,
}

/// Consumer of coordinate snapshots that lays out bound elements.
#[derive(Debug, Clone, Default)]
pub struct PositionBinder {
    bindings: Vec<LegendBinding>,
    series: Vec<SeriesRange>,
}

impl PositionBinder {
    pub fn new(bindings: Vec<LegendBinding>, series: Vec<SeriesRange>) -> OverlayResult<Self> {
        for binding in &bindings {
            binding.validate()?;
        }
        Ok(Self { bindings, series })
    }

    #[must_use]
    pub fn bindings(&self) -> &[LegendBinding] {
        &self.bindings
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Explicit pane, else the pane of the first known series, else pane 0.
    #[must_use]
    pub fn resolve_pane(&self, binding: &LegendBinding) -> PaneId {
        binding.pane.unwrap_or_else(|| {
            binding
                .series
                .iter()
                .find_map(|name| self.series.iter().find(|range| &range.series == name))
                .map(|range| range.pane)
                .unwrap_or_default()
        })
    }

    #[must_use]
    pub fn place(&self, snapshot: &CoordinateSnapshot) -> Vec<LegendPlacement> {
        self.bindings
            .iter()
            .map(|binding| {
                let pane = self.resolve_pane(binding);
                let rect = snapshot
                    .pane(pane)
                    .and_then(|bounds| anchor_rect(binding, bounds.rect));
                LegendPlacement {
                    id: binding.id.clone(),
                    kind: binding.kind,
                    pane,
                    rect: rect.unwrap_or_else(PixelRect::zero),
                    visible: rect.is_some(),
                }
            })
            .collect()
    }
}

fn anchor_rect(binding: &LegendBinding, pane: PixelRect) -> Option<PixelRect> {
    let margin = binding.margin;
    if binding.width + 2.0 * margin > pane.width || binding.height + 2.0 * margin > pane.height {
        return None;
    }
    let left = pane.x + margin;
    let right = pane.right() - margin - binding.width;
    let top = pane.y + margin;
    let bottom = pane.bottom() - margin - binding.height;
    let (x, y) = match binding.anchor {
        LegendAnchor::TopLeft => (left, top),
        LegendAnchor::TopRight => (right, top),
        LegendAnchor::BottomLeft => (left, bottom),
        LegendAnchor::BottomRight => (right, bottom),
    };
    Some(PixelRect::new(x, y, binding.width, binding.height))
}
