//! Background color estimation for mask fills.
//!
//! A redaction fill should blend into whatever is behind the masked line,
//! which on a resume is often a colored sidebar rather than white paper.
//! The sampler renders a thin strip next to the line, takes the most common
//! color there, and averages every pixel close to it so anti-aliased text
//! and rule edges do not pull the result away from the background.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::{DocumentProvider, PixelBuffer};
use crate::color::FillColor;
use crate::error::Error;
use crate::geometry::Rect;

/// Tuning constants for background sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Units trimmed from the top and bottom of the target before sampling.
    pub vertical_inset: f32,
    /// Distance between the target edge and the sampling strip.
    pub strip_gap: f32,
    /// Width of the sampling strip.
    pub strip_width: f32,
    /// Pixels farther than this (Euclidean, 8-bit RGB) from the dominant
    /// color are left out of the average.
    pub similarity_threshold: f32,
    /// Side of the square patch sampled when the strip renders nothing.
    pub fallback_patch: f32,
}

impl SamplerConfig {
    /// Create a sampler config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the strip width.
    pub fn with_strip_width(mut self, width: f32) -> Self {
        self.strip_width = width;
        self
    }

    /// Set the similarity threshold.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            vertical_inset: 2.0,
            strip_gap: 2.0,
            strip_width: 23.0,
            similarity_threshold: 30.0,
            fallback_patch: 2.0,
        }
    }
}

/// Why a sample produced no color.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    /// The provider failed to render the region.
    #[error("render failed: {0}")]
    Render(#[from] Error),

    /// Neither the strip nor the fallback patch produced pixels.
    #[error("no pixels sampled")]
    NoPixels,

    /// No pixel lies close enough to the dominant color.
    #[error("no pixels near the dominant color")]
    NoSimilarPixels,
}

/// Estimates the background color around a page rectangle.
#[derive(Debug, Clone, Default)]
pub struct BackgroundSampler {
    config: SamplerConfig,
}

impl BackgroundSampler {
    /// Create a sampler.
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// The sampler's configuration.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Color to fill `rect` with. Every failure yields white.
    pub fn sample<P>(&self, provider: &P, page: usize, rect: &Rect, page_width: f32) -> FillColor
    where
        P: DocumentProvider + ?Sized,
    {
        match self.try_sample(provider, page, rect, page_width) {
            Ok(color) => color,
            Err(e) => {
                log::warn!("Background sampling at {} failed ({}); using white", rect, e);
                FillColor::WHITE
            }
        }
    }

    /// Like [`sample`](Self::sample) but reports why sampling failed.
    pub fn try_sample<P>(
        &self,
        provider: &P,
        page: usize,
        rect: &Rect,
        page_width: f32,
    ) -> Result<FillColor, SampleError>
    where
        P: DocumentProvider + ?Sized,
    {
        let strip = self.sample_region(rect, page_width);
        let mut pixels = provider.render_clip(page, &strip)?;

        if pixels.is_empty() {
            let size = self.config.fallback_patch;
            let patch = Rect::new(rect.x0, rect.y0, rect.x0 + size, rect.y0 + size);
            log::trace!("Strip {} rendered nothing, sampling patch {}", strip, patch);
            pixels = provider.render_clip(page, &patch)?;
        }

        let color = dominant_color(&pixels, self.config.similarity_threshold)?;
        log::trace!("Sampled {} from {} pixels at {}", color, pixels.width * pixels.height, strip);
        Ok(color)
    }

    /// The strip rendered for `rect`: right of it, or left of it when the
    /// right strip would leave the page.
    pub fn sample_region(&self, rect: &Rect, page_width: f32) -> Rect {
        let SamplerConfig {
            vertical_inset,
            strip_gap,
            strip_width,
            ..
        } = self.config;

        let (mut y0, mut y1) = (rect.y0 + vertical_inset, rect.y1 - vertical_inset);
        if y1 <= y0 {
            y0 = rect.y0;
            y1 = rect.y1;
        }

        let right = Rect::new(rect.x1 + strip_gap, y0, rect.x1 + strip_gap + strip_width, y1);
        if right.x1 > page_width {
            Rect::new(rect.x0 - strip_gap - strip_width, y0, rect.x0 - strip_gap, y1)
        } else {
            right
        }
    }
}

/// Mean of the pixels within `threshold` of the most frequent color.
///
/// Ties for the most frequent color go to the one seen first.
pub fn dominant_color(pixels: &PixelBuffer, threshold: f32) -> Result<FillColor, SampleError> {
    let rgb: Vec<[u8; 3]> = pixels.rgb_pixels().collect();
    if rgb.is_empty() {
        return Err(SampleError::NoPixels);
    }

    // color -> (count, first position)
    let mut counts: HashMap<[u8; 3], (usize, usize)> = HashMap::new();
    for (i, px) in rgb.iter().enumerate() {
        counts.entry(*px).or_insert((0, i)).0 += 1;
    }
    let mode = counts
        .iter()
        .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then(fb.cmp(fa)))
        .map(|(color, _)| *color)
        .ok_or(SampleError::NoPixels)?;

    let mut sum = [0f64; 3];
    let mut n = 0usize;
    for px in rgb.iter().filter(|px| distance(px, &mode) < threshold) {
        for (acc, c) in sum.iter_mut().zip(px) {
            *acc += *c as f64;
        }
        n += 1;
    }
    if n == 0 {
        return Err(SampleError::NoSimilarPixels);
    }

    let channel = |i: usize| (sum[i] / n as f64 / 255.0) as f32;
    Ok(FillColor::new(channel(0), channel(1), channel(2)))
}

fn distance(a: &[u8; 3], b: &[u8; 3]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as f32 - *y as f32;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PageGeometry, RedactionAnnotation, TextLine, Word};
    use crate::error::Result;

    /// A page whose pixels come from a function of their position.
    struct PaintedPage {
        width: f32,
        height: f32,
        paint: fn(u32, u32) -> [u8; 3],
    }

    impl DocumentProvider for PaintedPage {
        fn page_count(&self) -> usize {
            1
        }

        fn page_geometry(&self, _page: usize) -> Result<PageGeometry> {
            Ok(PageGeometry {
                width: self.width,
                height: self.height,
            })
        }

        fn text_lines(&self, _page: usize) -> Result<Vec<TextLine>> {
            Ok(Vec::new())
        }

        fn words(&self, _page: usize) -> Result<Vec<Word>> {
            Ok(Vec::new())
        }

        fn vector_rects(&self, _page: usize) -> Result<Vec<Rect>> {
            Ok(Vec::new())
        }

        fn image_rects(&self, _page: usize) -> Result<Vec<Rect>> {
            Ok(Vec::new())
        }

        fn search(&self, _page: usize, _needle: &str) -> Result<Vec<Rect>> {
            Ok(Vec::new())
        }

        fn render_clip(&self, _page: usize, clip: &Rect) -> Result<PixelBuffer> {
            let visible = clip.intersection(&Rect::new(0.0, 0.0, self.width, self.height));
            if visible.is_empty() || !visible.is_finite() {
                return Ok(PixelBuffer::default());
            }
            let (x0, y0) = (visible.x0.floor() as u32, visible.y0.floor() as u32);
            let (x1, y1) = (visible.x1.ceil() as u32, visible.y1.ceil() as u32);
            let mut samples = Vec::new();
            for y in y0..y1 {
                for x in x0..x1 {
                    samples.extend_from_slice(&(self.paint)(x, y));
                }
            }
            Ok(PixelBuffer {
                width: x1 - x0,
                height: y1 - y0,
                channels: 3,
                samples,
            })
        }

        fn render_page(&self, _page: usize, _scale: f32) -> Result<PixelBuffer> {
            Err(Error::Render("not needed".into()))
        }

        fn queue_redaction(&mut self, _page: usize, _annotation: RedactionAnnotation) -> Result<()> {
            Ok(())
        }

        fn commit_redactions(&mut self, _page: usize) -> Result<Vec<RedactionAnnotation>> {
            Ok(Vec::new())
        }

        fn to_bytes(&mut self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    struct BrokenRenderer;

    impl DocumentProvider for BrokenRenderer {
        fn page_count(&self) -> usize {
            1
        }
        fn page_geometry(&self, _page: usize) -> Result<PageGeometry> {
            Ok(PageGeometry {
                width: 100.0,
                height: 100.0,
            })
        }
        fn text_lines(&self, _page: usize) -> Result<Vec<TextLine>> {
            Ok(Vec::new())
        }
        fn words(&self, _page: usize) -> Result<Vec<Word>> {
            Ok(Vec::new())
        }
        fn vector_rects(&self, _page: usize) -> Result<Vec<Rect>> {
            Ok(Vec::new())
        }
        fn image_rects(&self, _page: usize) -> Result<Vec<Rect>> {
            Ok(Vec::new())
        }
        fn search(&self, _page: usize, _needle: &str) -> Result<Vec<Rect>> {
            Ok(Vec::new())
        }
        fn render_clip(&self, _page: usize, _clip: &Rect) -> Result<PixelBuffer> {
            Err(Error::Render("boom".into()))
        }
        fn render_page(&self, _page: usize, _scale: f32) -> Result<PixelBuffer> {
            Err(Error::Render("boom".into()))
        }
        fn queue_redaction(&mut self, _page: usize, _a: RedactionAnnotation) -> Result<()> {
            Ok(())
        }
        fn commit_redactions(&mut self, _page: usize) -> Result<Vec<RedactionAnnotation>> {
            Ok(Vec::new())
        }
        fn to_bytes(&mut self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn sidebar(x: u32, _y: u32) -> [u8; 3] {
        if x < 200 {
            [30, 60, 90]
        } else {
            [255, 255, 255]
        }
    }

    fn noisy(x: u32, y: u32) -> [u8; 3] {
        // Mostly light gray with dark text strokes and a slightly off pixel.
        match (x + y) % 10 {
            0 => [0, 0, 0],
            1 => [236, 236, 236],
            _ => [240, 240, 240],
        }
    }

    fn page(paint: fn(u32, u32) -> [u8; 3]) -> PaintedPage {
        PaintedPage {
            width: 612.0,
            height: 792.0,
            paint,
        }
    }

    #[test]
    fn test_sample_region_right_of_target() {
        let sampler = BackgroundSampler::default();
        let region = sampler.sample_region(&Rect::new(72.0, 100.0, 200.0, 112.0), 612.0);
        assert_eq!(region, Rect::new(202.0, 102.0, 225.0, 110.0));
    }

    #[test]
    fn test_sample_region_flips_left_at_page_edge() {
        let sampler = BackgroundSampler::default();
        let region = sampler.sample_region(&Rect::new(400.0, 100.0, 600.0, 112.0), 612.0);
        assert_eq!(region, Rect::new(375.0, 102.0, 398.0, 110.0));
    }

    #[test]
    fn test_sample_region_keeps_thin_extent() {
        let sampler = BackgroundSampler::default();
        let region = sampler.sample_region(&Rect::new(72.0, 100.0, 200.0, 103.0), 612.0);
        assert_eq!((region.y0, region.y1), (100.0, 103.0));
    }

    #[test]
    fn test_samples_sidebar_color() {
        let sampler = BackgroundSampler::default();
        let color = sampler.sample(&page(sidebar), 0, &Rect::new(20.0, 100.0, 150.0, 112.0), 612.0);
        assert_eq!(color.to_rgb8(), [30, 60, 90]);
    }

    #[test]
    fn test_outliers_do_not_shift_average() {
        let sampler = BackgroundSampler::default();
        let color = sampler.sample(&page(noisy), 0, &Rect::new(20.0, 100.0, 150.0, 112.0), 612.0);
        let [r, g, b] = color.to_rgb8();
        assert!((239..=240).contains(&r));
        assert_eq!((r, g), (g, b));
    }

    #[test]
    fn test_zero_area_target_uses_patch() {
        let sampler = BackgroundSampler::default();
        let color = sampler.sample(&page(sidebar), 0, &Rect::new(50.0, 50.0, 50.0, 50.0), 612.0);
        assert_eq!(color.to_rgb8(), [30, 60, 90]);
    }

    #[test]
    fn test_off_page_target_is_white() {
        let sampler = BackgroundSampler::default();
        let rect = Rect::new(-500.0, -500.0, -400.0, -490.0);
        assert_eq!(sampler.sample(&page(sidebar), 0, &rect, 612.0), FillColor::WHITE);
        assert!(matches!(
            sampler.try_sample(&page(sidebar), 0, &rect, 612.0),
            Err(SampleError::NoPixels)
        ));
    }

    #[test]
    fn test_render_failure_is_white() {
        let sampler = BackgroundSampler::default();
        let rect = Rect::new(10.0, 10.0, 40.0, 20.0);
        assert_eq!(sampler.sample(&BrokenRenderer, 0, &rect, 100.0), FillColor::WHITE);
        assert!(matches!(
            sampler.try_sample(&BrokenRenderer, 0, &rect, 100.0),
            Err(SampleError::Render(_))
        ));
    }

    #[test]
    fn test_non_finite_target_is_white() {
        let sampler = BackgroundSampler::default();
        let rect = Rect::new(f32::NAN, 0.0, 10.0, f32::INFINITY);
        let [r, g, b] = sampler.sample(&page(sidebar), 0, &rect, 612.0).to_array();
        assert!([r, g, b].iter().all(|c| (0.0..=1.0).contains(c)));
    }

    #[test]
    fn test_mode_tie_goes_to_first_seen() {
        let buf = PixelBuffer {
            width: 2,
            height: 1,
            channels: 3,
            samples: vec![10, 10, 10, 200, 200, 200],
        };
        assert_eq!(dominant_color(&buf, 30.0).unwrap().to_rgb8(), [10, 10, 10]);
    }

    #[test]
    fn test_rgba_alpha_is_ignored() {
        let buf = PixelBuffer {
            width: 2,
            height: 1,
            channels: 4,
            samples: vec![100, 0, 0, 0, 100, 0, 0, 255],
        };
        assert_eq!(dominant_color(&buf, 30.0).unwrap().to_rgb8(), [100, 0, 0]);
    }

    #[test]
    fn test_empty_buffer_has_no_color() {
        assert!(matches!(
            dominant_color(&PixelBuffer::default(), 30.0),
            Err(SampleError::NoPixels)
        ));
    }
}
