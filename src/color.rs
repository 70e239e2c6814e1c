//! Fill colors for redaction patches.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An RGB fill color with every channel in `[0, 1]`.
///
/// The fields are private so the range invariant cannot be broken: every
/// constructor clamps its input and replaces non-finite values with `1.0`,
/// which biases a corrupt channel towards white, the documented fallback.
/// Deserialization goes through [`FillColor::new`] as well.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawChannels")]
pub struct FillColor {
    r: f32,
    g: f32,
    b: f32,
}

/// Unchecked channels as they appear on the wire.
#[derive(Deserialize)]
struct RawChannels {
    r: f32,
    g: f32,
    b: f32,
}

impl From<RawChannels> for FillColor {
    fn from(raw: RawChannels) -> Self {
        Self::new(raw.r, raw.g, raw.b)
    }
}

/// Error returned by [`FillColor::from_hex`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorParseError {
    /// The string (after an optional `#`) is not exactly six characters.
    #[error("expected 6 hex digits, got {0}")]
    Length(usize),

    /// A character outside `[0-9a-fA-F]` was found.
    #[error("invalid hex digit in {0:?}")]
    Digit(String),
}

impl FillColor {
    /// Pure white, the fallback for every failed parse or estimate.
    pub const WHITE: FillColor = FillColor {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    /// Pure black.
    pub const BLACK: FillColor = FillColor {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Create a color from normalized channels, clamping into `[0, 1]`.
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: sanitize(r),
            g: sanitize(g),
            b: sanitize(b),
        }
    }

    /// Create a color from 8-bit channels.
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    /// Parse `#RRGGBB` or `RRGGBB`.
    ///
    /// Exactly three two-digit hexadecimal pairs are accepted; shorthand
    /// (`#fff`) and alpha suffixes are rejected.
    pub fn from_hex(input: &str) -> Result<Self, ColorParseError> {
        let hex = input.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError::Digit(hex.to_string()));
        }
        if hex.len() != 6 {
            return Err(ColorParseError::Length(hex.len()));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| ColorParseError::Digit(hex.to_string()))
        };
        Ok(Self::from_rgb8(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Parse a hex color, falling back to white on any error.
    pub fn from_hex_or_white(input: &str) -> Self {
        Self::from_hex(input).unwrap_or_else(|e| {
            log::warn!("Unusable fill color {:?} ({}); using white", input, e);
            Self::WHITE
        })
    }

    /// Red channel in `[0, 1]`.
    pub fn r(&self) -> f32 {
        self.r
    }

    /// Green channel in `[0, 1]`.
    pub fn g(&self) -> f32 {
        self.g
    }

    /// Blue channel in `[0, 1]`.
    pub fn b(&self) -> f32 {
        self.b
    }

    /// Channels as an array.
    pub fn to_array(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// Channels rounded to 8 bits.
    pub fn to_rgb8(&self) -> [u8; 3] {
        [to_u8(self.r), to_u8(self.g), to_u8(self.b)]
    }

    /// `#rrggbb` representation.
    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.to_rgb8();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

impl Default for FillColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl std::fmt::Display for FillColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
