use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{PaneId, PriceAxisId, datetime_to_unix_seconds, decimal_to_f64};
use crate::error::{OverlayError, OverlayResult};
use crate::render::{Color, Stroke};

/// Paint order bucket; primitives paint bottom to top, stable within a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZOrder {
    Bottom,
    #[default]
    Normal,
    Top,
}

/// Time/price-anchored overlay shape plus its binding to a pane and axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualPrimitive {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub pane: PaneId,
    #[serde(default)]
    pub axis: PriceAxisId,
    #[serde(default)]
    pub z_order: ZOrder,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    pub shape: PrimitiveShape,
}

fn default_visible() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveShape {
    Rectangle(RectangleShape),
    Band(BandShape),
    Ribbon(RibbonShape),
    SignalStripe(SignalStripeShape),
}

/// Colored zone between two time/price corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleShape {
    pub time1: f64,
    pub price1: f64,
    pub time2: f64,
    pub price2: f64,
    #[serde(default)]
    pub fill: Option<Color>,
    #[serde(default)]
    pub border: Option<Stroke>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSpec {
    pub stroke: Stroke,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl LineSpec {
    #[must_use]
    pub const fn new(stroke: Stroke) -> Self {
        Self {
            stroke,
            visible: true,
        }
    }
}

/// One time slice of a band; a `None` value is a gap for that line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPoint {
    pub time: f64,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default)]
    pub middle: Option<f64>,
    #[serde(default)]
    pub lower: Option<f64>,
}

/// Three lines with the region between upper and lower filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandShape {
    pub points: Vec<BandPoint>,
    pub upper_line: LineSpec,
    pub middle_line: LineSpec,
    pub lower_line: LineSpec,
    #[serde(default)]
    pub fill: Option<Color>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RibbonPoint {
    pub time: f64,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default)]
    pub lower: Option<f64>,
}

/// Two lines with a gap-aware fill between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RibbonShape {
    pub points: Vec<RibbonPoint>,
    pub upper_line: LineSpec,
    pub lower_line: LineSpec,
    #[serde(default)]
    pub fill: Option<Color>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    pub time: f64,
    pub value: f64,
}

/// Colors picked by sample sign; a missing color leaves that span empty.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalPalette {
    #[serde(default)]
    pub neutral: Option<Color>,
    #[serde(default)]
    pub signal: Option<Color>,
    #[serde(default)]
    pub alert: Option<Color>,
}

impl SignalPalette {
    #[must_use]
    pub fn color_for(self, value: f64) -> Option<Color> {
        if value > 0.0 {
            self.signal
        } else if value < 0.0 {
            self.alert
        } else {
            self.neutral
        }
    }
}

/// Full-pane-height background stripes colored by sample value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStripeShape {
    pub samples: Vec<SignalSample>,
    pub palette: SignalPalette,
}

/// Consecutive samples sharing one value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalRun {
    pub value: f64,
    pub first_time: f64,
    pub last_time: f64,
    pub len: usize,
}

impl SignalStripeShape {
    /// Merges consecutive same-valued samples so each run paints once.
    #[must_use]
    pub fn runs(&self) -> Vec<SignalRun> {
        let mut runs: Vec<SignalRun> = Vec::new();
        for sample in &self.samples {
            match runs.last_mut() {
                Some(run) if OrderedFloat(run.value) == OrderedFloat(sample.value) => {
                    run.last_time = sample.time;
                    run.len += 1;
                }
                _ => runs.push(SignalRun {
                    value: sample.value,
                    first_time: sample.time,
                    last_time: sample.time,
                    len: 1,
                }),
            }
        }
        runs
    }
}

impl VisualPrimitive {
    #[must_use]
    pub fn new(shape: PrimitiveShape) -> Self {
        Self {
            id: None,
            pane: PaneId::default(),
            axis: PriceAxisId::default(),
            z_order: ZOrder::default(),
            visible: true,
            opacity: 1.0,
            shape,
        }
    }

    /// Rectangle between two corners in any order.
    #[must_use]
    pub fn rectangle(time1: f64, price1: f64, time2: f64, price2: f64, fill: Color) -> Self {
        Self::new(PrimitiveShape::Rectangle(RectangleShape {
            time1,
            price1,
            time2,
            price2,
            fill: Some(fill),
            border: None,
        }))
    }

    pub fn rectangle_from_decimal(
        time1: DateTime<Utc>,
        price1: Decimal,
        time2: DateTime<Utc>,
        price2: Decimal,
        fill: Color,
    ) -> OverlayResult<Self> {
        Ok(Self::rectangle(
            datetime_to_unix_seconds(time1),
            decimal_to_f64(price1, "price1")?,
            datetime_to_unix_seconds(time2),
            decimal_to_f64(price2, "price2")?,
            fill,
        ))
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn on_pane(mut self, pane: PaneId) -> Self {
        self.pane = pane;
        self
    }

    #[must_use]
    pub fn on_axis(mut self, axis: PriceAxisId) -> Self {
        self.axis = axis;
        self
    }

    #[must_use]
    pub fn with_z_order(mut self, z_order: ZOrder) -> Self {
        self.z_order = z_order;
        self
    }

    #[must_use]
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.shape {
            PrimitiveShape::Rectangle(_) => "rectangle",
            PrimitiveShape::Band(_) => "band",
            PrimitiveShape::Ribbon(_) => "ribbon",
            PrimitiveShape::SignalStripe(_) => "signal_stripe",
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.kind().to_owned())
    }

    /// Checks anchors and styles and returns the normalized primitive.
    ///
    /// Rectangle corners are reordered so `time1 <= time2` and
    /// `price1 <= price2`; series points and samples are sorted by time.
    pub fn validated(mut self) -> OverlayResult<Self> {
        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(self.invalid("opacity must be finite and in [0, 1]"));
        }
        let checked = match &mut self.shape {
            PrimitiveShape::Rectangle(shape) => normalize_rectangle(shape),
            PrimitiveShape::Band(shape) => normalize_band(shape),
            PrimitiveShape::Ribbon(shape) => normalize_ribbon(shape),
            PrimitiveShape::SignalStripe(shape) => normalize_signal_stripe(shape),
        };
        match checked {
            Ok(()) => Ok(self),
            Err(reason) => Err(self.invalid(&reason)),
        }
    }

    fn invalid(&self, reason: &str) -> OverlayError {
        OverlayError::InvalidPrimitive {
            id: self.label(),
            reason: reason.to_owned(),
        }
    }
}

type ShapeCheck = Result<(), String>;

fn normalize_rectangle(shape: &mut RectangleShape) -> ShapeCheck {
    for (name, value) in [
        ("time1", shape.time1),
        ("price1", shape.price1),
        ("time2", shape.time2),
        ("price2", shape.price2),
    ] {
        if !value.is_finite() {
            return Err(format!("`{name}` must be finite"));
        }
    }
    if shape.time1 > shape.time2 {
        std::mem::swap(&mut shape.time1, &mut shape.time2);
    }
    if shape.price1 > shape.price2 {
        std::mem::swap(&mut shape.price1, &mut shape.price2);
    }
    if let Some(fill) = shape.fill {
        fill.validate().map_err(|err| err.to_string())?;
    }
    if let Some(border) = shape.border {
        border.validate().map_err(|err| err.to_string())?;
    }
    if shape.fill.is_none() && shape.border.is_none() {
        return Err("rectangle needs a fill or a border".to_owned());
    }
    Ok(())
}

fn normalize_band(shape: &mut BandShape) -> ShapeCheck {
    let times: Vec<f64> = shape.points.iter().map(|point| point.time).collect();
    check_values(
        shape
            .points
            .iter()
            .flat_map(|point| [point.upper, point.middle, point.lower]),
    )?;
    check_times(&times)?;
    shape
        .points
        .sort_by(|a, b| a.time.total_cmp(&b.time));
    check_strictly_increasing(shape.points.iter().map(|point| point.time))?;
    for line in [shape.upper_line, shape.middle_line, shape.lower_line] {
        line.stroke.validate().map_err(|err| err.to_string())?;
    }
    if let Some(fill) = shape.fill {
        fill.validate().map_err(|err| err.to_string())?;
    }
    Ok(())
}

fn normalize_ribbon(shape: &mut RibbonShape) -> ShapeCheck {
    let times: Vec<f64> = shape.points.iter().map(|point| point.time).collect();
    check_values(
        shape
            .points
            .iter()
            .flat_map(|point| [point.upper, point.lower]),
    )?;
    check_times(&times)?;
    shape
        .points
        .sort_by(|a, b| a.time.total_cmp(&b.time));
    check_strictly_increasing(shape.points.iter().map(|point| point.time))?;
    for line in [shape.upper_line, shape.lower_line] {
        line.stroke.validate().map_err(|err| err.to_string())?;
    }
    if let Some(fill) = shape.fill {
        fill.validate().map_err(|err| err.to_string())?;
    }
    Ok(())
}

fn normalize_signal_stripe(shape: &mut SignalStripeShape) -> ShapeCheck {
    let times: Vec<f64> = shape.samples.iter().map(|sample| sample.time).collect();
    check_times(&times)?;
    if shape.samples.iter().any(|sample| !sample.value.is_finite()) {
        return Err("signal values must be finite".to_owned());
    }
    shape
        .samples
        .sort_by(|a, b| a.time.total_cmp(&b.time));
    check_strictly_increasing(shape.samples.iter().map(|sample| sample.time))?;
    for color in [
        shape.palette.neutral,
        shape.palette.signal,
        shape.palette.alert,
    ]
    .into_iter()
    .flatten()
    {
        color.validate().map_err(|err| err.to_string())?;
    }
    Ok(())
}

fn check_times(times: &[f64]) -> ShapeCheck {
    if times.is_empty() {
        return Err("series primitive needs at least one point".to_owned());
    }
    if times.iter().any(|time| !time.is_finite()) {
        return Err("point times must be finite".to_owned());
    }
    Ok(())
}

/// `None` is a gap; `Some(non-finite)` is malformed.
fn check_values(values: impl Iterator<Item = Option<f64>>) -> ShapeCheck {
    for value in values.flatten() {
        if !value.is_finite() {
            return Err("point prices must be finite or absent".to_owned());
        }
    }
    Ok(())
}

fn check_strictly_increasing(times: impl Iterator<Item = f64>) -> ShapeCheck {
    let mut previous: Option<f64> = None;
    for time in times {
        if previous.is_some_and(|prev| prev >= time) {
            return Err(format!("duplicate point time {time}"));
        }
        previous = Some(time);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        PrimitiveShape, SignalPalette, SignalSample, SignalStripeShape, VisualPrimitive,
    };
    use crate::render::Color;

    #[test]
    fn rectangle_corners_are_normalized() {
        let primitive = VisualPrimitive::rectangle(50.0, 80.0, 10.0, 20.0, Color::rgb(0.0, 1.0, 0.0))
            .validated()
            .expect("valid rectangle");
        let PrimitiveShape::Rectangle(shape) = primitive.shape else {
            panic!("expected rectangle");
        };
        assert_eq!((shape.time1, shape.time2), (10.0, 50.0));
        assert_eq!((shape.price1, shape.price2), (20.0, 80.0));
    }

    #[test]
    fn non_finite_anchor_is_rejected() {
        let err = VisualPrimitive::rectangle(f64::NAN, 1.0, 2.0, 3.0, Color::rgb(0.0, 0.0, 0.0))
            .with_id("zone-a")
            .validated()
            .expect_err("nan anchor");
        assert!(err.to_string().contains("zone-a"));
    }

    #[test]
    fn signal_runs_merge_consecutive_values() {
        let values = [0.0, 1.0, 1.0, 1.0, -1.0, -1.0, 0.0];
        let shape = SignalStripeShape {
            samples: values
                .iter()
                .enumerate()
                .map(|(index, value)| SignalSample {
                    time: index as f64,
                    value: *value,
                })
                .collect(),
            palette: SignalPalette::default(),
        };
        let runs = shape.runs();
        let lens: Vec<usize> = runs.iter().map(|run| run.len).collect();
        assert_eq!(lens, vec![1, 3, 2, 1]);
        assert_eq!((runs[1].first_time, runs[1].last_time), (1.0, 3.0));
    }
}
