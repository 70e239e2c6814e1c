//! Document model backend.
//!
//! The masking heuristics only talk to a PDF through the
//! [`DocumentProvider`] trait: page geometry, positioned text, shape and
//! image boxes, rasterized pixels, and a queue-then-commit redaction
//! primitive. [`LopdfProvider`] is the concrete implementation built on
//! `lopdf`, with its own content-stream interpreter. Pages are rendered
//! with PDFium when the `pdfium` feature is enabled and the library can be
//! found, and with a built-in rasterizer otherwise.

mod fonts;
mod lopdf_provider;
#[cfg(feature = "pdfium")]
mod pdfium;
mod raster;
mod redact;
mod scene;
mod text;

#[cfg(test)]
pub(crate) mod testing;

pub use lopdf_provider::LopdfProvider;
pub use raster::FillRule;
pub use redact::OverlapPolicy;

use serde::{Deserialize, Serialize};

use crate::color::FillColor;
use crate::error::Result;
use crate::geometry::Rect;
use crate::mask::IconRegion;

/// Size of a page in document user-space units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Page width
    pub width: f32,
    /// Page height
    pub height: f32,
}

impl PageGeometry {
    /// The whole page as a rectangle in page space.
    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

/// One extracted line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    /// Bounding box of every glyph on the line
    pub rect: Rect,
    /// Concatenated text of all runs on the line
    pub text: String,
}

/// One whitespace-delimited word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// Bounding box of the word's glyphs
    pub rect: Rect,
    /// Word text
    pub text: String,
}

/// A rectangle queued for destructive redaction together with its fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RedactionAnnotation {
    /// Area to paint and strip, in page space
    pub rect: Rect,
    /// Fill painted over the stripped area
    pub color: FillColor,
}

impl RedactionAnnotation {
    /// Pair a mask rectangle with its fill color.
    pub fn new(rect: Rect, color: FillColor) -> Self {
        Self { rect, color }
    }
}

/// Raw pixels produced by rasterizing part of a page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PixelBuffer {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Interleaved channels per pixel (3 = RGB, 4 = RGBA)
    pub channels: u8,
    /// Row-major samples
    pub samples: Vec<u8>,
}

impl PixelBuffer {
    /// Whether the buffer covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.samples.is_empty()
    }

    /// Iterate pixels as RGB triples, dropping any alpha channel.
    ///
    /// Buffers with fewer than three channels are expanded from gray.
    pub fn rgb_pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        let channels = self.channels.max(1) as usize;
        self.samples.chunks_exact(channels).map(move |px| {
            if channels >= 3 {
                [px[0], px[1], px[2]]
            } else {
                [px[0], px[0], px[0]]
            }
        })
    }

    /// Encode as an RGB PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        raster::encode_png(self)
    }
}

/// Access to an opened document, as needed by the masking engine.
///
/// Page indices are zero-based. Implementations own their document
/// exclusively; nothing is shared between providers.
pub trait DocumentProvider: Send + Sync {
    /// Number of pages.
    fn page_count(&self) -> usize;

    /// Width and height of a page.
    fn page_geometry(&self, page: usize) -> Result<PageGeometry>;

    /// Text lines with their bounding boxes, in content order.
    fn text_lines(&self, page: usize) -> Result<Vec<TextLine>>;

    /// Word boxes.
    fn words(&self, page: usize) -> Result<Vec<Word>>;

    /// Bounding boxes of painted vector paths.
    fn vector_rects(&self, page: usize) -> Result<Vec<Rect>>;

    /// Bounding boxes of placed raster images.
    fn image_rects(&self, page: usize) -> Result<Vec<Rect>>;

    /// Case-insensitive literal search; one rectangle per hit.
    fn search(&self, page: usize, needle: &str) -> Result<Vec<Rect>>;

    /// Rasterize `clip` at one pixel per unit. Parts of `clip` outside the
    /// page are cut away; a clip with no on-page area yields an empty buffer.
    fn render_clip(&self, page: usize, clip: &Rect) -> Result<PixelBuffer>;

    /// Rasterize the whole page at `scale` pixels per unit.
    fn render_page(&self, page: usize, scale: f32) -> Result<PixelBuffer>;

    /// Queue an annotation for the next commit of `page`.
    fn queue_redaction(&mut self, page: usize, annotation: RedactionAnnotation) -> Result<()>;

    /// Apply every queued annotation of `page` at once, painting the fills
    /// and removing the content underneath. Returns what was applied.
    fn commit_redactions(&mut self, page: usize) -> Result<Vec<RedactionAnnotation>>;

    /// Serialize the (possibly mutated) document.
    fn to_bytes(&mut self) -> Result<Vec<u8>>;

    /// Vector and raster shapes that may be icons.
    fn icon_regions(&self, page: usize) -> Result<Vec<IconRegion>> {
        let mut regions: Vec<IconRegion> = self
            .vector_rects(page)?
            .into_iter()
            .map(IconRegion::vector)
            .collect();
        regions.extend(self.image_rects(page)?.into_iter().map(IconRegion::raster));
        Ok(regions)
    }
}

/// Follow a reference to the object it points at.
///
/// Dangling references resolve to the reference itself so callers see an
/// object of the wrong type rather than an error.
pub(crate) fn resolve<'a>(doc: &'a lopdf::Document, obj: &'a lopdf::Object) -> &'a lopdf::Object {
    match obj {
        lopdf::Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Resolve and view an object as a dictionary (streams yield their dict).
pub(crate) fn resolve_dict<'a>(
    doc: &'a lopdf::Document,
    obj: &'a lopdf::Object,
) -> Option<&'a lopdf::Dictionary> {
    match resolve(doc, obj) {
        lopdf::Object::Dictionary(d) => Some(d),
        lopdf::Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

/// Read a number from an integer or real object.
pub(crate) fn get_number(obj: &lopdf::Object) -> Option<f32> {
    match obj {
        lopdf::Object::Integer(i) => Some(*i as f32),
        lopdf::Object::Real(r) => Some(*r),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_pixels_drops_alpha() {
        let buf = PixelBuffer {
            width: 2,
            height: 1,
            channels: 4,
            samples: vec![1, 2, 3, 255, 4, 5, 6, 0],
        };
        let px: Vec<_> = buf.rgb_pixels().collect();
        assert_eq!(px, vec![[1, 2, 3], [4, 5, 6]]);
    }

    #[test]
    fn test_rgb_pixels_expands_gray() {
        let buf = PixelBuffer {
            width: 2,
            height: 1,
            channels: 1,
            samples: vec![10, 200],
        };
        let px: Vec<_> = buf.rgb_pixels().collect();
        assert_eq!(px, vec![[10, 10, 10], [200, 200, 200]]);
    }

    #[test]
    fn test_empty_buffer() {
        assert!(PixelBuffer::default().is_empty());
    }

    #[test]
    fn test_get_number() {
        assert_eq!(get_number(&lopdf::Object::Integer(42)), Some(42.0));
        assert_eq!(get_number(&lopdf::Object::Real(1.5)), Some(1.5));
        assert_eq!(get_number(&lopdf::Object::Null), None);
    }
}
