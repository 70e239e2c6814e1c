//! [`DocumentProvider`] backed by `lopdf`.
//!
//! `lopdf` owns the object model: text and shapes come from the crate's own
//! content interpreter and commits rewrite content streams in place. Pixels
//! come from PDFium when the `pdfium` feature is on and the library can be
//! bound, and from the built-in rasterizer otherwise.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use image::RgbImage;
use lopdf::{Document, Object, ObjectId};

use crate::detect::sniff_header;
use crate::error::{Error, Result};
use crate::geometry::Rect;

use super::raster::{self, PixelRect};
use super::redact::{self, OverlapPolicy};
use super::scene::{self, PageFrame, PageScene};
use super::text::{self, LineLayout};
use super::{
    DocumentProvider, PageGeometry, PixelBuffer, RedactionAnnotation, TextLine, Word,
};

// Keeps a hostile MediaBox or scale from allocating gigabytes.
const MAX_RENDER_PIXELS: u64 = 64 * 1024 * 1024;

struct PageCache {
    scene: PageScene,
    lines: Vec<LineLayout>,
}

/// An opened PDF with its own content interpreter.
///
/// Parsed pages and 1x page renders are cached until the page is
/// committed. The caches sit behind mutexes so read-only queries can run
/// from several threads.
pub struct LopdfProvider {
    doc: Document,
    pages: Vec<ObjectId>,
    graphics: OverlapPolicy,
    images: OverlapPolicy,
    queued: HashMap<usize, Vec<RedactionAnnotation>>,
    page_cache: Mutex<HashMap<usize, Arc<PageCache>>>,
    image_cache: Mutex<HashMap<ObjectId, Option<Arc<RgbImage>>>>,
    /// Serialized current state, as handed to PDFium
    #[cfg(feature = "pdfium")]
    snapshot: Vec<u8>,
    #[cfg(feature = "pdfium")]
    raster_cache: Mutex<HashMap<usize, Arc<RgbImage>>>,
}

impl LopdfProvider {
    /// Open a document from memory.
    ///
    /// Fails with [`Error::UnknownFormat`] when the bytes carry no PDF
    /// header, [`Error::Encrypted`] for documents that stay encrypted, and
    /// [`Error::PdfParse`] when the structure cannot be read.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = sniff_header(data)?;
        log::debug!("Opening {} ({} bytes)", header, data.len());

        let doc = Document::load_mem(data).map_err(|e| match e {
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::PdfParse(e.to_string()),
        })?;
        if doc.is_encrypted() {
            return Err(Error::Encrypted);
        }

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        Ok(Self {
            doc,
            pages,
            graphics: OverlapPolicy::default(),
            images: OverlapPolicy::default(),
            queued: HashMap::new(),
            page_cache: Mutex::new(HashMap::new()),
            image_cache: Mutex::new(HashMap::new()),
            #[cfg(feature = "pdfium")]
            snapshot: data.to_vec(),
            #[cfg(feature = "pdfium")]
            raster_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Open a document from a file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Set how vector paths and images under a mask are treated on commit.
    pub fn with_overlap_policies(mut self, graphics: OverlapPolicy, images: OverlapPolicy) -> Self {
        self.graphics = graphics;
        self.images = images;
        self
    }

    /// PDF version from the file header.
    pub fn version(&self) -> &str {
        &self.doc.version
    }

    fn page_id(&self, page: usize) -> Result<ObjectId> {
        self.pages
            .get(page)
            .copied()
            .ok_or(Error::PageOutOfRange(page as u32, self.pages.len() as u32))
    }

    fn page(&self, page: usize) -> Result<Arc<PageCache>> {
        if let Some(cached) = lock(&self.page_cache).get(&page) {
            return Ok(Arc::clone(cached));
        }

        let page_id = self.page_id(page)?;
        let ops = scene::decode_page(&self.doc, page_id)?;
        let scene = scene::interpret_page(&self.doc, page_id, &ops);
        let lines = text::build_lines(&scene);
        log::trace!(
            "Page {}: {} operators, {} items, {} lines",
            page,
            ops.len(),
            scene.items.len(),
            lines.len()
        );

        let entry = Arc::new(PageCache { scene, lines });
        lock(&self.page_cache).insert(page, Arc::clone(&entry));
        Ok(entry)
    }

    fn image(&self, id: ObjectId) -> Option<Arc<RgbImage>> {
        if let Some(cached) = lock(&self.image_cache).get(&id) {
            return cached.clone();
        }

        let decoded = match self.doc.get_object(id) {
            Ok(Object::Stream(stream)) => raster::decode_image(stream).map(Arc::new),
            _ => None,
        };
        if decoded.is_none() {
            log::warn!("Image object {:?} could not be decoded; drawing a placeholder", id);
        }
        lock(&self.image_cache).insert(id, decoded.clone());
        decoded
    }

    fn render_region(&self, page: usize, region: PixelRect, scale: f32) -> Result<PixelBuffer> {
        check_render_size(region)?;

        #[cfg(feature = "pdfium")]
        if let Some(full) = self.pdfium_page(page, scale)? {
            return Ok(raster::crop(&full, region));
        }

        let cache = self.page(page)?;
        Ok(raster::render(&cache.scene, region, scale, |id| self.image(id)))
    }

    /// The whole page rendered by PDFium, `None` without a PDFium library.
    #[cfg(feature = "pdfium")]
    fn pdfium_page(&self, page: usize, scale: f32) -> Result<Option<Arc<RgbImage>>> {
        // Colour sampling renders many small clips at 1x; keep those pages.
        let cacheable = scale == 1.0;
        if cacheable {
            if let Some(cached) = lock(&self.raster_cache).get(&page) {
                return Ok(Some(Arc::clone(cached)));
            }
        }

        let full = PixelRect::covering(&self.page_geometry(page)?.rect(), scale);
        check_render_size(full)?;
        let Some(image) = super::pdfium::render_page(&self.snapshot, page, full.width, full.height)?
        else {
            return Ok(None);
        };

        let image = Arc::new(image);
        if cacheable {
            lock(&self.raster_cache).insert(page, Arc::clone(&image));
        }
        Ok(Some(image))
    }
}

fn check_render_size(region: PixelRect) -> Result<()> {
    if region.width as u64 * region.height as u64 > MAX_RENDER_PIXELS {
        return Err(Error::Render(format!(
            "{}x{} pixels exceeds the render limit",
            region.width, region.height
        )));
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A panic while holding the lock leaves only a partially filled cache.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DocumentProvider for LopdfProvider {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_geometry(&self, page: usize) -> Result<PageGeometry> {
        let page_id = self.page_id(page)?;
        Ok(PageFrame::of(&self.doc, page_id).geometry())
    }

    fn text_lines(&self, page: usize) -> Result<Vec<TextLine>> {
        Ok(self
            .page(page)?
            .lines
            .iter()
            .map(LineLayout::to_text_line)
            .collect())
    }

    fn words(&self, page: usize) -> Result<Vec<Word>> {
        Ok(self
            .page(page)?
            .lines
            .iter()
            .flat_map(LineLayout::words)
            .collect())
    }

    fn vector_rects(&self, page: usize) -> Result<Vec<Rect>> {
        Ok(self.page(page)?.scene.paths().map(|p| p.rect).collect())
    }

    fn image_rects(&self, page: usize) -> Result<Vec<Rect>> {
        Ok(self.page(page)?.scene.images().map(|i| i.rect).collect())
    }

    fn search(&self, page: usize, needle: &str) -> Result<Vec<Rect>> {
        Ok(text::search(&self.page(page)?.lines, needle))
    }

    fn render_clip(&self, page: usize, clip: &Rect) -> Result<PixelBuffer> {
        let geometry = self.page_geometry(page)?;
        let visible = clip.intersection(&geometry.rect());
        if visible.is_empty() || !visible.is_finite() {
            return Ok(PixelBuffer {
                channels: 3,
                ..PixelBuffer::default()
            });
        }
        self.render_region(page, PixelRect::covering(&visible, 1.0), 1.0)
    }

    fn render_page(&self, page: usize, scale: f32) -> Result<PixelBuffer> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(Error::Render(format!("invalid scale {}", scale)));
        }
        let geometry = self.page_geometry(page)?;
        self.render_region(page, PixelRect::covering(&geometry.rect(), scale), scale)
    }

    fn queue_redaction(&mut self, page: usize, annotation: RedactionAnnotation) -> Result<()> {
        self.page_id(page)?;
        self.queued.entry(page).or_default().push(annotation);
        Ok(())
    }

    fn commit_redactions(&mut self, page: usize) -> Result<Vec<RedactionAnnotation>> {
        let page_id = self.page_id(page)?;
        let annotations = self.queued.remove(&page).unwrap_or_default();
        if annotations.is_empty() {
            return Ok(annotations);
        }

        let stats = redact::apply(
            &mut self.doc,
            page_id,
            &annotations,
            self.graphics,
            self.images,
        )?;
        log::debug!(
            "Page {}: {} masks applied, removed {} glyphs, {} paths, {} images, {} forms, {} links; {} forms copied",
            page,
            annotations.len(),
            stats.glyphs,
            stats.paths,
            stats.images,
            stats.forms,
            stats.links,
            stats.copied_forms
        );

        lock(&self.page_cache).remove(&page);
        #[cfg(feature = "pdfium")]
        {
            lock(&self.raster_cache).remove(&page);
            self.snapshot.clear();
            self.doc
                .save_to(&mut self.snapshot)
                .map_err(|e| Error::Encode(format!("save: {}", e)))?;
        }
        Ok(annotations)
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>> {
        // Replaced content streams are unreferenced now; drop them so the
        // removed text is not still in the file.
        let pruned = self.doc.prune_objects();
        log::trace!("Pruned {} unreferenced objects", pruned.len());

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| Error::Encode(format!("save: {}", e)))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{helvetica_resources, single_page};
    use crate::color::FillColor;

    fn provider(content: &str) -> LopdfProvider {
        let (mut doc, _) = single_page(content, helvetica_resources);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        LopdfProvider::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_rejects_non_pdf() {
        assert!(matches!(
            LopdfProvider::from_bytes(b"hello world"),
            Err(Error::UnknownFormat)
        ));
        assert!(LopdfProvider::from_bytes(b"%PDF-1.7\ngarbage").is_err());
    }

    #[test]
    fn test_geometry_and_lines() {
        let p = provider("BT /F1 12 Tf 72 700 Td (Phone: 0912 345 678) Tj ET");
        assert_eq!(p.page_count(), 1);
        let geometry = p.page_geometry(0).unwrap();
        assert_eq!((geometry.width, geometry.height), (612.0, 792.0));
        let lines = p.text_lines(0).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Phone: 0912 345 678");
        assert!(matches!(p.text_lines(1), Err(Error::PageOutOfRange(1, 1))));
    }

    #[test]
    fn test_render_clip_reads_background() {
        let p = provider("0.2 0.4 0.6 rg 0 0 612 792 re f");
        let buf = p.render_clip(0, &Rect::new(10.0, 10.0, 20.0, 15.0)).unwrap();
        assert_eq!((buf.width, buf.height), (10, 5));
        assert!(buf.rgb_pixels().all(|px| px == [51, 102, 153]));
    }

    #[test]
    fn test_render_clip_off_page_is_empty() {
        let p = provider("");
        let buf = p.render_clip(0, &Rect::new(700.0, 10.0, 720.0, 20.0)).unwrap();
        assert!(buf.is_empty());
        let partial = p.render_clip(0, &Rect::new(600.0, 0.0, 620.0, 4.0)).unwrap();
        assert_eq!((partial.width, partial.height), (12, 4));
    }

    #[test]
    fn test_render_page_scale() {
        let p = provider("");
        let buf = p.render_page(0, 0.5).unwrap();
        assert_eq!((buf.width, buf.height), (306, 396));
        assert!(p.render_page(0, 0.0).is_err());
    }

    #[test]
    fn test_commit_and_serialize() {
        let mut p = provider("BT /F1 12 Tf 72 700 Td (me@example.com) Tj ET");
        let line = p.text_lines(0).unwrap()[0].rect;
        p.queue_redaction(0, RedactionAnnotation::new(line.inflate(1.0), FillColor::BLACK))
            .unwrap();
        assert!(p.queue_redaction(3, RedactionAnnotation::new(line, FillColor::BLACK)).is_err());

        let applied = p.commit_redactions(0).unwrap();
        assert_eq!(applied.len(), 1);
        assert!(p.text_lines(0).unwrap().is_empty());
        // Nothing left to apply.
        assert!(p.commit_redactions(0).unwrap().is_empty());

        let bytes = p.to_bytes().unwrap();
        let reopened = LopdfProvider::from_bytes(&bytes).unwrap();
        assert!(reopened.text_lines(0).unwrap().is_empty());
        assert!(reopened.search(0, "example").unwrap().is_empty());
        assert_eq!(reopened.vector_rects(0).unwrap().len(), 1);
    }

    #[test]
    fn test_render_shows_dark_glyphs() {
        let p = provider("BT /F1 60 Tf 72 700 Td (HIM) Tj ET");
        let buf = p.render_clip(0, &Rect::new(60.0, 30.0, 200.0, 110.0)).unwrap();
        let darkest = buf.rgb_pixels().map(|px| px[0].max(px[1]).max(px[2])).min().unwrap();
        assert!(darkest < 64, "darkest channel {}", darkest);
    }

    #[test]
    fn test_render_after_commit_shows_fill() {
        let mut p = provider("BT /F1 12 Tf 72 700 Td (me@example.com) Tj ET");
        let line = p.text_lines(0).unwrap()[0].rect;
        // Warm the render caches before committing.
        p.render_clip(0, &line).unwrap();

        let fill = FillColor::new(1.0, 0.0, 0.0);
        p.queue_redaction(0, RedactionAnnotation::new(line.inflate(1.0), fill))
            .unwrap();
        p.commit_redactions(0).unwrap();

        let (cx, cy) = line.center();
        let buf = p.render_clip(0, &Rect::new(cx - 1.0, cy - 1.0, cx + 1.0, cy + 1.0)).unwrap();
        assert!(buf.rgb_pixels().all(|px| px == [255, 0, 0]));
    }

    #[test]
    fn test_rotated_page_geometry() {
        let (mut doc, page_id) = single_page(
            "BT /F1 12 Tf 72 700 Td (Rotated) Tj ET",
            helvetica_resources,
        );
        doc.get_dictionary_mut(page_id).unwrap().set("Rotate", 90);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        let p = LopdfProvider::from_bytes(&bytes).unwrap();

        let geometry = p.page_geometry(0).unwrap();
        assert_eq!((geometry.width, geometry.height), (792.0, 612.0));
        let buf = p.render_page(0, 0.5).unwrap();
        assert_eq!((buf.width, buf.height), (396, 306));

        // Turned clockwise: the baseline at PDF y = 700 becomes page x = 700
        // and the text runs down the page from y = 72.
        let lines = p.text_lines(0).unwrap();
        assert!(!lines.is_empty());
        let rect = lines[1..].iter().fold(lines[0].rect, |acc, l| acc.union(&l.rect));
        assert!(rect.x0 > 690.0 && rect.x1 < 715.0, "{:?}", rect);
        assert!(rect.y0 >= 70.0 && rect.y1 > rect.y0 + 30.0, "{:?}", rect);
    }
}
