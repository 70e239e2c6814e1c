//! # cvmask
//!
//! Contact-information redaction for resume-style PDF documents.
//!
//! Emails, phone numbers and profile links are found line by line, the
//! mask is widened to swallow a contact icon next to the line, and the
//! fill color is sampled from the surrounding background so the patch
//! blends in. Redaction is destructive: the text, paths and images under
//! each mask are removed from the content stream, not just painted over.
//!
//! ## Quick Start
//!
//! ```no_run
//! fn main() -> cvmask::Result<()> {
//!     let input = std::fs::read("resume.pdf")?;
//!
//!     // Automatic detection on the first page
//!     let redacted = cvmask::auto_redact(&input)?;
//!     std::fs::write("resume.redacted.pdf", redacted)?;
//!
//!     // User-drawn boxes from a 1224 px wide preview, snapped to words
//!     let boxes = [cvmask::ManualBox::new(0, 140.0, 210.0, 320.0, 28.0, 1224.0)];
//!     let redacted = cvmask::manual_redact(&input, &boxes, "#ffffff", true)?;
//!     std::fs::write("resume.manual.pdf", redacted)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Icon-aware masks**: small vector or image glyphs left of a contact
//!   line are masked with it
//! - **Background matching**: fills are sampled from the page around the mask
//! - **Destructive commit**: covered glyphs are removed from the content
//!   stream and the old stream is dropped from the file
//! - **Manual mode**: preview-space boxes with optional snapping to words
//! - **Parallel sampling**: uses Rayon to sample fill colors

pub mod backend;
pub mod color;
pub mod detect;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod options;
pub mod pii;
pub mod preview;
pub mod redaction;
pub mod sampler;

// Re-export commonly used types
pub use backend::{
    DocumentProvider, LopdfProvider, OverlapPolicy, PageGeometry, PixelBuffer, TextLine, Word,
};
pub use color::{ColorParseError, FillColor};
pub use detect::{is_pdf_bytes, sniff_header, PdfHeader};
pub use error::{Error, Result};
pub use geometry::{Matrix, Rect};
pub use mask::{build_mask_region, keyword_mask_region, IconKind, IconRegion, MaskConfig};
pub use options::{PageScope, RedactOptions};
pub use pii::{PiiDetector, PiiKind, URL_KEYWORDS};
pub use preview::{get_info, preview, DocumentInfo};
pub use redaction::{
    AutoRedactor, ManualBox, ManualRedactor, PageReport, RedactionAnnotation, RedactionQueue,
    RedactionReport, SkipReason, SkippedBox,
};
pub use sampler::{BackgroundSampler, SamplerConfig};

use std::path::Path;

fn open(data: &[u8], options: &RedactOptions) -> Result<LopdfProvider> {
    Ok(LopdfProvider::from_bytes(data)?.with_overlap_policies(options.graphics, options.images))
}

/// Redact contact information on the first page of a PDF.
///
/// # Arguments
///
/// * `data` - PDF file content as bytes
///
/// # Returns
///
/// The redacted document, or an error if the input cannot be opened.
///
/// # Example
///
/// ```no_run
/// let data = std::fs::read("resume.pdf").unwrap();
/// let redacted = cvmask::auto_redact(&data).unwrap();
/// ```
pub fn auto_redact(data: &[u8]) -> Result<Vec<u8>> {
    auto_redact_with_options(data, &RedactOptions::default())
}

/// Redact contact information with custom options.
///
/// # Example
///
/// ```no_run
/// use cvmask::{auto_redact_with_options, MaskConfig, RedactOptions};
///
/// let options = RedactOptions::new()
///     .with_mask(MaskConfig::compact())
///     .all_pages();
/// let data = std::fs::read("resume.pdf").unwrap();
/// let redacted = auto_redact_with_options(&data, &options).unwrap();
/// ```
pub fn auto_redact_with_options(data: &[u8], options: &RedactOptions) -> Result<Vec<u8>> {
    auto_redact_with_report(data, options).map(|(bytes, _)| bytes)
}

/// Redact contact information and report what was masked.
pub fn auto_redact_with_report(
    data: &[u8],
    options: &RedactOptions,
) -> Result<(Vec<u8>, RedactionReport)> {
    let mut provider = open(data, options)?;
    let report = AutoRedactor::new(options.clone()).run(&mut provider)?;
    Ok((provider.to_bytes()?, report))
}

/// Redact user-drawn boxes with one fill color.
///
/// # Arguments
///
/// * `data` - PDF file content as bytes
/// * `boxes` - Boxes in preview pixel space
/// * `color_hex` - Fill color as `#RRGGBB`; anything unparsable means white
/// * `snapping` - Grow each box to the whole words it touches
///
/// Boxes naming a page the document does not have are skipped.
pub fn manual_redact(
    data: &[u8],
    boxes: &[ManualBox],
    color_hex: &str,
    snapping: bool,
) -> Result<Vec<u8>> {
    manual_redact_with_options(data, boxes, color_hex, snapping, &RedactOptions::default())
}

/// Redact user-drawn boxes with custom overlap policies.
pub fn manual_redact_with_options(
    data: &[u8],
    boxes: &[ManualBox],
    color_hex: &str,
    snapping: bool,
    options: &RedactOptions,
) -> Result<Vec<u8>> {
    manual_redact_with_report(data, boxes, color_hex, snapping, options).map(|(bytes, _)| bytes)
}

/// Redact user-drawn boxes and report applied and skipped boxes.
pub fn manual_redact_with_report(
    data: &[u8],
    boxes: &[ManualBox],
    color_hex: &str,
    snapping: bool,
    options: &RedactOptions,
) -> Result<(Vec<u8>, RedactionReport)> {
    let mut provider = open(data, options)?;
    let report = ManualRedactor::new(color_hex, snapping).run(&mut provider, boxes)?;
    Ok((provider.to_bytes()?, report))
}

/// Auto-redact `input` and write the result to `output`.
pub fn auto_redact_file<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<RedactionReport> {
    let data = std::fs::read(input)?;
    let (bytes, report) = auto_redact_with_report(&data, &RedactOptions::default())?;
    std::fs::write(output, bytes)?;
    Ok(report)
}

/// Apply manual boxes to `input` and write the result to `output`.
pub fn manual_redact_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    boxes: &[ManualBox],
    color_hex: &str,
    snapping: bool,
) -> Result<RedactionReport> {
    let data = std::fs::read(input)?;
    let (bytes, report) =
        manual_redact_with_report(&data, boxes, color_hex, snapping, &RedactOptions::default())?;
    std::fs::write(output, bytes)?;
    Ok(report)
}

/// Builder for redaction runs.
///
/// # Example
///
/// ```no_run
/// use cvmask::Redactor;
///
/// let data = std::fs::read("resume.pdf")?;
/// let result = Redactor::new()
///     .all_pages()
///     .with_keywords(["linkedin.com", "gitlab.com"])
///     .auto(&data)?;
/// println!("{} masks", result.report().mask_count());
/// result.save("resume.redacted.pdf")?;
/// # Ok::<(), cvmask::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Redactor {
    options: RedactOptions,
    detector: PiiDetector,
    fill: FillColor,
    snapping: bool,
}

impl Redactor {
    /// Create a new Redactor builder.
    pub fn new() -> Self {
        Self {
            options: RedactOptions::default(),
            detector: PiiDetector::new(),
            fill: FillColor::WHITE,
            snapping: true,
        }
    }

    /// Replace all options.
    pub fn with_options(mut self, options: RedactOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the mask configuration.
    pub fn with_mask(mut self, mask: MaskConfig) -> Self {
        self.options = self.options.with_mask(mask);
        self
    }

    /// Scan every page in automatic mode.
    pub fn all_pages(mut self) -> Self {
        self.options = self.options.all_pages();
        self
    }

    /// Disable parallel color sampling.
    pub fn sequential(mut self) -> Self {
        self.options = self.options.sequential();
        self
    }

    /// Set the overlap policies for vector paths and images.
    pub fn with_overlap_policies(mut self, graphics: OverlapPolicy, images: OverlapPolicy) -> Self {
        self.options = self
            .options
            .with_graphics_policy(graphics)
            .with_images_policy(images);
        self
    }

    /// Replace the profile-link keyword set.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.detector = PiiDetector::with_keywords(keywords);
        self
    }

    /// Set the manual-mode fill from a hex string; unparsable means white.
    pub fn with_fill_hex(mut self, hex: &str) -> Self {
        self.fill = FillColor::from_hex_or_white(hex);
        self
    }

    /// Set the manual-mode fill.
    pub fn with_fill(mut self, color: FillColor) -> Self {
        self.fill = color;
        self
    }

    /// Enable or disable snapping of manual boxes to words.
    pub fn with_snapping(mut self, snapping: bool) -> Self {
        self.snapping = snapping;
        self
    }

    /// Run automatic redaction.
    pub fn auto(&self, data: &[u8]) -> Result<RedactedDocument> {
        let mut provider = open(data, &self.options)?;
        let report = AutoRedactor::new(self.options.clone())
            .with_detector(self.detector.clone())
            .run(&mut provider)?;
        Ok(RedactedDocument {
            bytes: provider.to_bytes()?,
            report,
        })
    }

    /// Run manual redaction.
    pub fn manual(&self, data: &[u8], boxes: &[ManualBox]) -> Result<RedactedDocument> {
        let mut provider = open(data, &self.options)?;
        let report = ManualRedactor::with_color(self.fill, self.snapping).run(&mut provider, boxes)?;
        Ok(RedactedDocument {
            bytes: provider.to_bytes()?,
            report,
        })
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

/// A redacted document and what was done to it.
#[derive(Debug, Clone)]
pub struct RedactedDocument {
    bytes: Vec<u8>,
    report: RedactionReport,
}

impl RedactedDocument {
    /// Serialized PDF.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the serialized PDF.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// What was masked or skipped.
    pub fn report(&self) -> &RedactionReport {
        &self.report
    }

    /// Write the PDF to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}
