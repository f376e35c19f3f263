//! Packed 24-bit color <-> normalized RGB
//!
//! Extraction reports fill colors as a single integer (`0xRRGGBB`), while the
//! PDF drawing operators take three floats in the 0-1 range. Integers outside
//! the 24-bit range are rejected rather than clamped.

use serde::{Deserialize, Serialize};

use crate::error::PdfEditError;

pub const MAX_PACKED: u32 = 0xFF_FFFF;

/// A validated `0xRRGGBB` color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct PackedColor(u32);

impl PackedColor {
    pub const BLACK: PackedColor = PackedColor(0);
    pub const WHITE: PackedColor = PackedColor(MAX_PACKED);

    pub fn new(value: u32) -> Result<Self, PdfEditError> {
        Self::try_from(value as i64)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for PackedColor {
    type Error = PdfEditError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=MAX_PACKED as i64).contains(&value) {
            Ok(PackedColor(value as u32))
        } else {
            Err(PdfEditError::ColorOutOfRange(value))
        }
    }
}

impl From<PackedColor> for u32 {
    fn from(color: PackedColor) -> Self {
        color.0
    }
}

/// Normalized RGB triple, each channel in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Rgb = Rgb {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn gray(level: f32) -> Self {
        Self::new(level, level, level)
    }

    pub fn from_cmyk(c: f32, m: f32, y: f32, k: f32) -> Self {
        let k = k.clamp(0.0, 1.0);
        Self::new(
            (1.0 - c.clamp(0.0, 1.0)) * (1.0 - k),
            (1.0 - m.clamp(0.0, 1.0)) * (1.0 - k),
            (1.0 - y.clamp(0.0, 1.0)) * (1.0 - k),
        )
    }
}

/// Split a packed color into normalized channels.
pub fn decode(packed: PackedColor) -> Rgb {
    let p = packed.value();
    Rgb {
        r: ((p >> 16) & 0xFF) as f32 / 255.0,
        g: ((p >> 8) & 0xFF) as f32 / 255.0,
        b: (p & 0xFF) as f32 / 255.0,
    }
}

/// Pack normalized channels, clamping to `[0, 1]` and rounding each channel
/// to the nearest byte.
pub fn encode(rgb: Rgb) -> PackedColor {
    fn channel(v: f32) -> u32 {
        let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        (v * 255.0).round() as u32
    }
    PackedColor((channel(rgb.r) << 16) | (channel(rgb.g) << 8) | channel(rgb.b))
}
