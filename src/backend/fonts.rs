//! Glyph metrics for placing text.
//!
//! Widths come from the font dictionary when present (`/Widths` for simple
//! fonts, `/W` + `/DW` on the descendant of a Type0 font). Fonts without
//! widths fall back to the metrics of a standard family.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use super::{get_number, resolve, resolve_dict};

/// Glyph top above the baseline, in em.
pub(crate) const ASCENT: f32 = 0.8;
/// Glyph bottom below the baseline, in em (negative).
pub(crate) const DESCENT: f32 = -0.2;

const DEFAULT_WIDTH: f32 = 556.0;

// Helvetica advance widths for codes 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StandardFamily {
    Helvetica,
    Courier,
}

impl StandardFamily {
    fn from_base_font(name: &[u8]) -> Self {
        let name = String::from_utf8_lossy(name).to_lowercase();
        if name.contains("courier") || name.contains("mono") {
            StandardFamily::Courier
        } else {
            StandardFamily::Helvetica
        }
    }

    fn width(&self, code: u32) -> f32 {
        match self {
            StandardFamily::Courier => 600.0,
            StandardFamily::Helvetica => match code {
                32..=126 => HELVETICA_WIDTHS[(code - 32) as usize] as f32,
                _ => DEFAULT_WIDTH,
            },
        }
    }
}

#[derive(Debug, Clone)]
enum WidthSource {
    Simple {
        first_char: u32,
        widths: Vec<f32>,
        missing: f32,
    },
    Cid {
        default: f32,
        widths: HashMap<u32, f32>,
    },
    Standard(StandardFamily),
}

/// Advance widths and code length of one font.
#[derive(Debug, Clone)]
pub(crate) struct FontMetrics {
    source: WidthSource,
    two_byte: bool,
    // Glyph space to text space; 1/1000 except for Type3 fonts.
    scale: f32,
}

impl FontMetrics {
    /// Metrics used when no font is selected or the font is unreadable.
    pub fn fallback() -> Self {
        Self {
            source: WidthSource::Standard(StandardFamily::Helvetica),
            two_byte: false,
            scale: 0.001,
        }
    }

    /// Read metrics from a font dictionary.
    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let subtype = font.get(b"Subtype").ok().and_then(|o| o.as_name().ok());

        if subtype == Some(b"Type0".as_slice()) {
            return Self::type0(doc, font);
        }

        let scale = if subtype == Some(b"Type3".as_slice()) {
            font.get(b"FontMatrix")
                .ok()
                .and_then(|m| resolve(doc, m).as_array().ok())
                .and_then(|m| m.first().and_then(get_number))
                .unwrap_or(0.001)
        } else {
            0.001
        };

        let widths = font
            .get(b"Widths")
            .ok()
            .and_then(|w| resolve(doc, w).as_array().ok())
            .map(|arr| {
                arr.iter()
                    .map(|w| get_number(resolve(doc, w)).unwrap_or(0.0))
                    .collect::<Vec<f32>>()
            });

        let source = match widths {
            Some(widths) if !widths.is_empty() => {
                let first_char = font
                    .get(b"FirstChar")
                    .ok()
                    .and_then(|o| get_number(resolve(doc, o)))
                    .unwrap_or(0.0)
                    .max(0.0) as u32;
                let missing = font
                    .get(b"FontDescriptor")
                    .ok()
                    .and_then(|d| resolve_dict(doc, d))
                    .and_then(|d| d.get(b"MissingWidth").ok())
                    .and_then(get_number)
                    .unwrap_or(0.0);
                WidthSource::Simple {
                    first_char,
                    widths,
                    missing,
                }
            }
            _ => {
                let base = font
                    .get(b"BaseFont")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    .unwrap_or(b"Helvetica".as_slice());
                WidthSource::Standard(StandardFamily::from_base_font(base))
            }
        };

        Self {
            source,
            two_byte: false,
            scale,
        }
    }

    fn type0(doc: &Document, font: &Dictionary) -> Self {
        let descendant = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|d| resolve(doc, d).as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|d| resolve_dict(doc, d));

        let mut default = 1000.0;
        let mut widths = HashMap::new();

        if let Some(cid) = descendant {
            if let Some(dw) = cid.get(b"DW").ok().and_then(get_number) {
                default = dw;
            }
            if let Some(w) = cid.get(b"W").ok().and_then(|w| resolve(doc, w).as_array().ok()) {
                parse_cid_widths(doc, w, &mut widths);
            }
        }

        Self {
            source: WidthSource::Cid { default, widths },
            two_byte: true,
            scale: 0.001,
        }
    }

    /// Bytes per character code.
    pub fn code_len(&self) -> usize {
        if self.two_byte {
            2
        } else {
            1
        }
    }

    /// Whether codes are two bytes wide.
    pub fn is_two_byte(&self) -> bool {
        self.two_byte
    }

    /// Split a shown string into character codes.
    pub fn split_codes<'b>(&self, bytes: &'b [u8]) -> std::slice::Chunks<'b, u8> {
        bytes.chunks(self.code_len())
    }

    /// Advance width of `code` in text space units per unit font size.
    pub fn width(&self, code: &[u8]) -> f32 {
        let value = code_value(code);
        let glyph_units = match &self.source {
            WidthSource::Simple {
                first_char,
                widths,
                missing,
            } => value
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize).copied())
                .unwrap_or(*missing),
            WidthSource::Cid { default, widths } => {
                widths.get(&value).copied().unwrap_or(*default)
            }
            WidthSource::Standard(family) => family.width(value),
        };
        glyph_units * self.scale
    }
}

fn code_value(code: &[u8]) -> u32 {
    code.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

// `/W` entries are either `c [w1 w2 ...]` or `c_first c_last w`.
fn parse_cid_widths(doc: &Document, w: &[Object], out: &mut HashMap<u32, f32>) {
    let mut i = 0;
    while i < w.len() {
        let Some(first) = get_number(resolve(doc, &w[i])) else {
            break;
        };
        let first = first.max(0.0) as u32;
        match w.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, width) in list.iter().enumerate() {
                    if let Some(width) = get_number(resolve(doc, width)) {
                        out.insert(first + offset as u32, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = get_number(last).unwrap_or(0.0).max(0.0) as u32;
                let width = w.get(i + 2).and_then(|o| get_number(resolve(doc, o)));
                if let Some(width) = width {
                    // Guard against absurd ranges in broken files.
                    for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                        out.insert(cid, width);
                    }
                }
                i += 3;
            }
            None => break,
        }
    }
}

/// Decode shown bytes without font information.
pub(crate) fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    // Latin-1
    bytes.iter().map(|&b| b as char).collect()
}
