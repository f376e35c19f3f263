//! Text runs and the edits that target them

use serde::{Deserialize, Serialize};

use crate::color::PackedColor;
use crate::error::PdfEditError;

/// A point in page coordinates (origin top-left, y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle `(x0, y0, x1, y1)` in page coordinates.
///
/// Equality is exact per component; an edit's identity is its bbox, so two
/// boxes that differ only by rounding noise are different keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Result<Self, PdfEditError> {
        if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
            return Err(PdfEditError::InvalidBBox(format!(
                "non-finite coordinate in [{}, {}, {}, {}]",
                x0, y0, x1, y1
            )));
        }
        if x0 > x1 || y0 > y1 {
            return Err(PdfEditError::InvalidBBox(format!(
                "[{}, {}, {}, {}] is not ordered",
                x0, y0, x1, y1
            )));
        }
        Ok(Self { x0, y0, x1, y1 })
    }

    /// Smallest box holding all `points`. Callers guarantee finite input.
    pub(crate) fn enclosing(points: &[(f64, f64)]) -> Self {
        let mut bbox = BBox {
            x0: f64::INFINITY,
            y0: f64::INFINITY,
            x1: f64::NEG_INFINITY,
            y1: f64::NEG_INFINITY,
        };
        for &(x, y) in points {
            bbox.x0 = bbox.x0.min(x);
            bbox.y0 = bbox.y0.min(y);
            bbox.x1 = bbox.x1.max(x);
            bbox.y1 = bbox.y1.max(y);
        }
        bbox
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Grow by `d` on every side.
    pub fn inflate(&self, d: f64) -> Self {
        Self {
            x0: self.x0 - d,
            y0: self.y0 - d,
            x1: self.x1 + d,
            y1: self.y1 + d,
        }
    }

    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// `(x0, y1)`: where replacement text starts its baseline.
    pub fn bottom_left(&self) -> Point {
        Point::new(self.x0, self.y1)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x0 && p.x <= self.x1 && p.y >= self.y0 && p.y <= self.y1
    }
}

impl TryFrom<[f64; 4]> for BBox {
    type Error = PdfEditError;

    fn try_from(v: [f64; 4]) -> Result<Self, Self::Error> {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// One positioned, styled piece of text as reported by extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub bbox: BBox,
    pub text: String,
    pub font: String,
    pub size: f64,
    pub color: PackedColor,
    pub flags: u32,
}

/// The attributes of the targeted run, as echoed back by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub font: String,
    #[serde(default = "default_size")]
    pub size: f64,
    #[serde(default)]
    pub color: PackedColor,
    #[serde(default)]
    pub flags: u32,
}

fn default_size() -> f64 {
    12.0
}

impl Default for RunSnapshot {
    fn default() -> Self {
        Self {
            text: String::new(),
            font: String::new(),
            size: default_size(),
            color: PackedColor::BLACK,
            flags: 0,
        }
    }
}

impl RunSnapshot {
    /// Font size must be a positive finite number of points.
    pub fn validate(&self) -> Result<(), PdfEditError> {
        if self.size.is_finite() && self.size > 0.0 {
            Ok(())
        } else {
            Err(PdfEditError::InvalidEdit(format!(
                "font size must be positive, got {}",
                self.size
            )))
        }
    }
}

impl From<&TextRun> for RunSnapshot {
    fn from(run: &TextRun) -> Self {
        Self {
            text: run.text.clone(),
            font: run.font.clone(),
            size: run.size,
            color: run.color,
            flags: run.flags,
        }
    }
}

/// A pending replacement of one run's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edit {
    pub bbox_key: BBox,
    pub old_text: String,
    pub new_text: String,
    pub font_name: String,
    pub font_size: f64,
    pub color: PackedColor,
    pub style_flags: u32,
}

impl Edit {
    pub fn new(bbox_key: BBox, new_text: impl Into<String>, original: RunSnapshot) -> Self {
        Self {
            bbox_key,
            old_text: original.text,
            new_text: new_text.into(),
            font_name: original.font,
            font_size: original.size,
            color: original.color,
            style_flags: original.flags,
        }
    }
}
