//! Built-in rasterizer, used when PDFium is not available.
//!
//! Paths are scan-converted with the nonzero or even-odd rule, images are
//! resampled nearest-neighbour, and glyphs are drawn as solid x-height
//! blocks in their fill colour. Text is not legible, but ink lands where
//! the glyphs are, in the right colour.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use lopdf::{Object, ObjectId, Stream};

use crate::geometry::{Matrix, Rect};

use super::scene::{stream_bytes, PageScene, SceneItem, TextRun};
use super::PixelBuffer;

const PLACEHOLDER_GRAY: [u8; 3] = [192, 192, 192];
const WHITE: [u8; 3] = [255, 255, 255];

/// Winding rule for filled paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    /// Nonzero winding number
    NonZero,
    /// Even-odd parity
    EvenOdd,
}

/// A pixel-aligned region of the page at some scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Pixels fully or partly covered by `rect` at `scale`.
    pub fn covering(rect: &Rect, scale: f32) -> Self {
        let x0 = (rect.x0 * scale).floor() as i64;
        let y0 = (rect.y0 * scale).floor() as i64;
        let x1 = (rect.x1 * scale).ceil() as i64;
        let y1 = (rect.y1 * scale).ceil() as i64;
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        }
    }
}

pub(crate) struct Canvas {
    image: RgbImage,
    origin: (f32, f32),
    scale: f32,
}

impl Canvas {
    pub fn new(region: PixelRect, scale: f32) -> Self {
        Self {
            image: RgbImage::from_pixel(region.width, region.height, Rgb(WHITE)),
            origin: (region.x as f32, region.y as f32),
            scale,
        }
    }

    /// Visible area in page space.
    fn page_rect(&self) -> Rect {
        Rect::new(
            self.origin.0 / self.scale,
            self.origin.1 / self.scale,
            (self.origin.0 + self.image.width() as f32) / self.scale,
            (self.origin.1 + self.image.height() as f32) / self.scale,
        )
    }

    fn to_pixels(&self, p: (f32, f32)) -> (f32, f32) {
        (
            p.0 * self.scale - self.origin.0,
            p.1 * self.scale - self.origin.1,
        )
    }

    fn blend(&mut self, x: u32, y: u32, color: [u8; 3], alpha: f32) {
        let px = self.image.get_pixel_mut(x, y);
        if alpha >= 1.0 {
            *px = Rgb(color);
            return;
        }
        for (dst, src) in px.0.iter_mut().zip(color) {
            *dst = (*dst as f32 * (1.0 - alpha) + src as f32 * alpha).round() as u8;
        }
    }

    /// Scan-convert closed polygons given in page space.
    pub fn fill_polygon(&mut self, subpaths: &[Vec<(f32, f32)>], rule: FillRule, color: [u8; 3], alpha: f32) {
        let mut edges = Vec::new();
        for sub in subpaths {
            let pts: Vec<(f32, f32)> = sub.iter().map(|p| self.to_pixels(*p)).collect();
            for i in 0..pts.len() {
                let a = pts[i];
                let b = pts[(i + 1) % pts.len()];
                if a.1 != b.1 {
                    edges.push((a, b));
                }
            }
        }
        if edges.is_empty() {
            return;
        }

        let (width, height) = self.image.dimensions();
        let min_y = edges.iter().map(|(a, b)| a.1.min(b.1)).fold(f32::INFINITY, f32::min);
        let max_y = edges.iter().map(|(a, b)| a.1.max(b.1)).fold(f32::NEG_INFINITY, f32::max);
        let row_start = min_y.floor().max(0.0) as u32;
        let row_end = (max_y.ceil().max(0.0) as u32).min(height);

        let mut crossings: Vec<(f32, i32)> = Vec::new();
        for row in row_start..row_end {
            let yc = row as f32 + 0.5;
            crossings.clear();
            for (a, b) in &edges {
                let (lo, hi) = if a.1 < b.1 { (a, b) } else { (b, a) };
                if yc >= lo.1 && yc < hi.1 {
                    let x = lo.0 + (yc - lo.1) * (hi.0 - lo.0) / (hi.1 - lo.1);
                    crossings.push((x, if b.1 > a.1 { 1 } else { -1 }));
                }
            }
            crossings.sort_by(|p, q| p.0.total_cmp(&q.0));

            let mut winding = 0;
            for k in 0..crossings.len().saturating_sub(1) {
                winding += crossings[k].1;
                let inside = match rule {
                    FillRule::NonZero => winding != 0,
                    FillRule::EvenOdd => (k + 1) % 2 == 1,
                };
                if !inside {
                    continue;
                }
                let start = (crossings[k].0 - 0.5).ceil().max(0.0) as u32;
                let end = ((crossings[k + 1].0 - 0.5).ceil().max(0.0) as u32).min(width);
                for x in start..end {
                    self.blend(x, row, color, alpha);
                }
            }
        }
    }

    pub fn fill_rect(&mut self, rect: &Rect, color: [u8; 3], alpha: f32) {
        let corners = vec![
            (rect.x0, rect.y0),
            (rect.x1, rect.y0),
            (rect.x1, rect.y1),
            (rect.x0, rect.y1),
        ];
        self.fill_polygon(&[corners], FillRule::NonZero, color, alpha);
    }

    /// Stroke open polylines as one quad per segment.
    pub fn stroke(&mut self, subpaths: &[Vec<(f32, f32)>], width: f32, color: [u8; 3]) {
        let half = (width / 2.0).max(0.5 / self.scale);
        for sub in subpaths {
            for pair in sub.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let (dx, dy) = (b.0 - a.0, b.1 - a.1);
                let len = (dx * dx + dy * dy).sqrt();
                if len <= f32::EPSILON {
                    continue;
                }
                let (nx, ny) = (-dy / len * half, dx / len * half);
                let quad = vec![
                    (a.0 + nx, a.1 + ny),
                    (b.0 + nx, b.1 + ny),
                    (b.0 - nx, b.1 - ny),
                    (a.0 - nx, a.1 - ny),
                ];
                self.fill_polygon(&[quad], FillRule::NonZero, color, 1.0);
            }
        }
    }

    /// Draw `src` into the unit square mapped by `transform`.
    pub fn draw_image(&mut self, transform: &Matrix, src: &RgbImage) {
        let Some(inverse) = transform.invert() else {
            return;
        };
        let (src_w, src_h) = src.dimensions();
        if src_w == 0 || src_h == 0 {
            return;
        }

        let bounds = transform.apply_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
        let (x0, y0) = self.to_pixels((bounds.x0, bounds.y0));
        let (x1, y1) = self.to_pixels((bounds.x1, bounds.y1));
        let (width, height) = self.image.dimensions();

        for row in (y0.floor().max(0.0) as u32)..(y1.ceil().max(0.0) as u32).min(height) {
            for col in (x0.floor().max(0.0) as u32)..(x1.ceil().max(0.0) as u32).min(width) {
                let px = (col as f32 + 0.5 + self.origin.0) / self.scale;
                let py = (row as f32 + 0.5 + self.origin.1) / self.scale;
                let (u, v) = inverse.apply(px, py);
                if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                    continue;
                }
                let sx = ((u * src_w as f32) as u32).min(src_w - 1);
                // Image row 0 is the top edge, v = 1 in image space.
                let sy = (((1.0 - v) * src_h as f32) as u32).min(src_h - 1);
                let color = src.get_pixel(sx, sy).0;
                self.image.put_pixel(col, row, Rgb(color));
            }
        }
    }

    fn draw_text(&mut self, run: &TextRun) {
        let color = run.color.to_rgb8();
        for glyph in &run.glyphs {
            if glyph.text.chars().all(char::is_whitespace) {
                continue;
            }
            // Glyph boxes span descender to ascender; draw baseline to x-height.
            let r = glyph.rect;
            let h = r.height();
            let w = r.width();
            let bar = Rect::new(r.x0 + 0.1 * w, r.y0 + 0.3 * h, r.x1 - 0.1 * w, r.y0 + 0.8 * h);
            self.fill_rect(&bar, color, 1.0);
        }
    }

    pub fn into_buffer(self) -> PixelBuffer {
        let (width, height) = self.image.dimensions();
        PixelBuffer {
            width,
            height,
            channels: 3,
            samples: self.image.into_raw(),
        }
    }
}

/// Paint every scene item overlapping `region` onto a white canvas.
pub(crate) fn render<F>(scene: &PageScene, region: PixelRect, scale: f32, image_for: F) -> PixelBuffer
where
    F: Fn(ObjectId) -> Option<Arc<RgbImage>>,
{
    let mut canvas = Canvas::new(region, scale);
    let visible = canvas.page_rect();

    for item in &scene.items {
        match item {
            SceneItem::Text(run) if !run.invisible && run.rect().intersects(&visible) => {
                canvas.draw_text(run)
            }
            SceneItem::Path(path) if path.rect.intersects(&visible) => {
                if let Some((color, rule)) = path.fill {
                    canvas.fill_polygon(&path.subpaths, rule, color.to_rgb8(), 1.0);
                }
                if let Some((color, width)) = path.stroke {
                    canvas.stroke(&path.subpaths, width, color.to_rgb8());
                }
            }
            SceneItem::Image(image) if image.rect.intersects(&visible) => {
                match image_for(image.xobject) {
                    Some(pixels) => canvas.draw_image(&image.transform, &pixels),
                    None => canvas.fill_rect(&image.rect, PLACEHOLDER_GRAY, 1.0),
                }
            }
            _ => {}
        }
    }

    canvas.into_buffer()
}

/// Cut `region` out of a full-page image rendered at the same scale.
///
/// Pixels outside the page come out white.
pub(crate) fn crop(page: &RgbImage, region: PixelRect) -> PixelBuffer {
    let (width, height) = page.dimensions();
    let image = RgbImage::from_fn(region.width, region.height, |col, row| {
        let x = region.x + col as i64;
        let y = region.y + row as i64;
        if (0..width as i64).contains(&x) && (0..height as i64).contains(&y) {
            *page.get_pixel(x as u32, y as u32)
        } else {
            Rgb(WHITE)
        }
    });
    PixelBuffer {
        width: region.width,
        height: region.height,
        channels: 3,
        samples: image.into_raw(),
    }
}

/// Decode an image XObject to RGB.
///
/// Handles JPEG data and raw 8-bit gray, RGB or CMYK samples. Anything
/// else (masks, JPEG 2000, packed bit depths) yields `None`.
pub(crate) fn decode_image(stream: &Stream) -> Option<RgbImage> {
    let dict = &stream.dict;
    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return None;
    }

    let filters: Vec<&[u8]> = match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(arr)) => arr.iter().filter_map(|f| f.as_name().ok()).collect(),
        _ => Vec::new(),
    };

    if filters.iter().any(|f| *f == b"DCTDecode") {
        let decoded = image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg);
        return match decoded {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                log::debug!("JPEG image decode failed: {}", e);
                None
            }
        };
    }
    if filters.iter().any(|f| *f == b"JPXDecode" || *f == b"JBIG2Decode" || *f == b"CCITTFaxDecode") {
        return None;
    }

    let width = dict.get(b"Width").ok().and_then(|o| o.as_i64().ok())?;
    let height = dict.get(b"Height").ok().and_then(|o| o.as_i64().ok())?;
    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if width <= 0 || height <= 0 || bits != 8 {
        return None;
    }
    let (width, height) = (width as u32, height as u32);

    let data = stream_bytes(stream)?;
    let pixels = width as usize * height as usize;
    let components = data.len() / pixels;
    if !matches!(components, 1 | 3 | 4) {
        return None;
    }

    Some(RgbImage::from_fn(width, height, |x, y| {
        let i = (y as usize * width as usize + x as usize) * components;
        match components {
            1 => Rgb([data[i], data[i], data[i]]),
            3 => Rgb([data[i], data[i + 1], data[i + 2]]),
            _ => {
                let k = 255 - data[i + 3] as u32;
                let ch = |c: u8| ((255 - c as u32) * k / 255) as u8;
                Rgb([ch(data[i]), ch(data[i + 1]), ch(data[i + 2])])
            }
        }
    }))
}

/// Encode a pixel buffer as PNG.
pub(crate) fn encode_png(buffer: &PixelBuffer) -> crate::error::Result<Vec<u8>> {
    let samples: Vec<u8> = buffer.rgb_pixels().flatten().collect();
    let image = RgbImage::from_raw(buffer.width, buffer.height, samples)
        .ok_or_else(|| crate::error::Error::Render("pixel buffer size mismatch".to_string()))?;
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn pixel(buf: &PixelBuffer, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * buf.width + x) * 3) as usize;
        [buf.samples[i], buf.samples[i + 1], buf.samples[i + 2]]
    }

    fn square(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<(f32, f32)> {
        vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
    }

    #[test]
    fn test_fill_rect_covers_pixel_centers() {
        let region = PixelRect::covering(&Rect::new(0.0, 0.0, 10.0, 10.0), 1.0);
        let mut canvas = Canvas::new(region, 1.0);
        canvas.fill_rect(&Rect::new(2.0, 2.0, 5.0, 5.0), [255, 0, 0], 1.0);
        let buf = canvas.into_buffer();
        assert_eq!(pixel(&buf, 2, 2), [255, 0, 0]);
        assert_eq!(pixel(&buf, 4, 4), [255, 0, 0]);
        assert_eq!(pixel(&buf, 5, 5), WHITE);
        assert_eq!(pixel(&buf, 1, 3), WHITE);
    }

    #[test]
    fn test_even_odd_leaves_hole() {
        let region = PixelRect::covering(&Rect::new(0.0, 0.0, 10.0, 10.0), 1.0);
        let outer = square(0.0, 0.0, 10.0, 10.0);
        let inner = square(3.0, 3.0, 7.0, 7.0);

        let mut canvas = Canvas::new(region, 1.0);
        canvas.fill_polygon(&[outer.clone(), inner.clone()], FillRule::EvenOdd, [0, 0, 0], 1.0);
        let buf = canvas.into_buffer();
        assert_eq!(pixel(&buf, 1, 1), [0, 0, 0]);
        assert_eq!(pixel(&buf, 5, 5), WHITE);

        let mut canvas = Canvas::new(region, 1.0);
        canvas.fill_polygon(&[outer, inner], FillRule::NonZero, [0, 0, 0], 1.0);
        let buf = canvas.into_buffer();
        assert_eq!(pixel(&buf, 5, 5), [0, 0, 0]);
    }

    #[test]
    fn test_offset_region_and_scale() {
        // Region starting at page (10, 10), rendered at 2x.
        let region = PixelRect::covering(&Rect::new(10.0, 10.0, 15.0, 15.0), 2.0);
        assert_eq!(region, PixelRect { x: 20, y: 20, width: 10, height: 10 });
        let mut canvas = Canvas::new(region, 2.0);
        canvas.fill_rect(&Rect::new(0.0, 0.0, 12.0, 12.0), [0, 255, 0], 1.0);
        let buf = canvas.into_buffer();
        assert_eq!(pixel(&buf, 3, 3), [0, 255, 0]);
        assert_eq!(pixel(&buf, 4, 4), WHITE);
    }

    #[test]
    fn test_text_is_drawn_in_its_fill_color() {
        let (doc, page_id) = crate::backend::testing::single_page(
            "BT /F1 60 Tf 72 700 Td (HIM) Tj ET",
            crate::backend::testing::helvetica_resources,
        );
        let ops = crate::backend::scene::decode_page(&doc, page_id).unwrap();
        let scene = crate::backend::scene::interpret_page(&doc, page_id, &ops);

        let region = PixelRect::covering(&Rect::new(60.0, 30.0, 200.0, 110.0), 1.0);
        let buf = render(&scene, region, 1.0, |_| None);
        let darkest = buf.rgb_pixels().map(|p| p[0].max(p[1]).max(p[2])).min().unwrap();
        assert_eq!(darkest, 0);
    }

    #[test]
    fn test_crop_pads_outside_page() {
        let page = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let buf = crop(&page, PixelRect { x: 2, y: -1, width: 4, height: 2 });
        assert_eq!((buf.width, buf.height), (4, 2));
        assert_eq!(pixel(&buf, 0, 0), WHITE);
        assert_eq!(pixel(&buf, 0, 1), [10, 20, 30]);
        assert_eq!(pixel(&buf, 1, 1), [10, 20, 30]);
        assert_eq!(pixel(&buf, 2, 1), WHITE);
    }

    #[test]
    fn test_translucent_blend() {
        let region = PixelRect::covering(&Rect::new(0.0, 0.0, 2.0, 2.0), 1.0);
        let mut canvas = Canvas::new(region, 1.0);
        canvas.fill_rect(&Rect::new(0.0, 0.0, 2.0, 2.0), [0, 0, 0], 0.5);
        let buf = canvas.into_buffer();
        assert_eq!(pixel(&buf, 0, 0), [128, 128, 128]);
    }

    #[test]
    fn test_stroke_draws_thin_line() {
        let region = PixelRect::covering(&Rect::new(0.0, 0.0, 10.0, 10.0), 1.0);
        let mut canvas = Canvas::new(region, 1.0);
        canvas.stroke(&[vec![(0.0, 5.0), (10.0, 5.0)]], 0.2, [0, 0, 255]);
        let buf = canvas.into_buffer();
        assert_eq!(pixel(&buf, 5, 4), [0, 0, 255]);
        assert_eq!(pixel(&buf, 5, 7), WHITE);
    }

    #[test]
    fn test_draw_image_orientation() {
        // 1x2 image: red on top, blue at the bottom, placed on (0,0)-(4,4).
        let mut src = RgbImage::new(1, 2);
        src.put_pixel(0, 0, Rgb([255, 0, 0]));
        src.put_pixel(0, 1, Rgb([0, 0, 255]));
        // Unit square -> page: x * 4, y flipped so v = 1 is the top.
        let transform = Matrix::new(4.0, 0.0, 0.0, -4.0, 0.0, 4.0);

        let region = PixelRect::covering(&Rect::new(0.0, 0.0, 4.0, 4.0), 1.0);
        let mut canvas = Canvas::new(region, 1.0);
        canvas.draw_image(&transform, &src);
        let buf = canvas.into_buffer();
        assert_eq!(pixel(&buf, 1, 0), [255, 0, 0]);
        assert_eq!(pixel(&buf, 1, 3), [0, 0, 255]);
    }

    #[test]
    fn test_decode_raw_rgb_and_gray() {
        let rgb = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 1,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![10, 20, 30, 40, 50, 60],
        );
        let img = decode_image(&rgb).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [40, 50, 60]);

        let gray = Stream::new(
            dictionary! { "Width" => 1, "Height" => 1, "BitsPerComponent" => 8 },
            vec![77],
        );
        assert_eq!(decode_image(&gray).unwrap().get_pixel(0, 0).0, [77, 77, 77]);
    }

    #[test]
    fn test_decode_rejects_masks_and_short_data() {
        let mask = Stream::new(
            dictionary! { "Width" => 1, "Height" => 1, "ImageMask" => true },
            vec![0],
        );
        assert!(decode_image(&mask).is_none());
        let short = Stream::new(
            dictionary! { "Width" => 4, "Height" => 4, "BitsPerComponent" => 8 },
            vec![0; 5],
        );
        assert!(decode_image(&short).is_none());
    }

    #[test]
    fn test_encode_png_signature() {
        let buf = PixelBuffer {
            width: 1,
            height: 1,
            channels: 3,
            samples: vec![1, 2, 3],
        };
        let png = encode_png(&buf).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
