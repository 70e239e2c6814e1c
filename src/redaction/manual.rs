//! Redaction of user-drawn boxes.
//!
//! Boxes arrive in the pixel space of a page preview shown in the browser.
//! Since the preview keeps the page's aspect ratio, the ratio of page width
//! to preview width maps both axes into page space.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::{DocumentProvider, RedactionAnnotation, Word};
use crate::color::FillColor;
use crate::error::Result;
use crate::geometry::Rect;

use super::{RedactionQueue, RedactionReport};

// Vertical cover added above and below a snapped word union.
const SNAP_VERTICAL_PAD: f32 = 2.0;

/// A box drawn over a page preview.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualBox {
    /// Zero-based page index
    #[serde(default)]
    pub page_index: i64,
    /// Left edge in preview pixels
    pub x: f32,
    /// Top edge in preview pixels
    pub y: f32,
    /// Width in preview pixels
    #[serde(rename = "w")]
    pub width: f32,
    /// Height in preview pixels
    #[serde(rename = "h")]
    pub height: f32,
    /// Width of the preview image the box was drawn on
    pub image_width: f32,
}

impl ManualBox {
    /// Create a box on `page_index`.
    pub fn new(page_index: usize, x: f32, y: f32, width: f32, height: f32, image_width: f32) -> Self {
        Self {
            page_index: page_index as i64,
            x,
            y,
            width,
            height,
            image_width,
        }
    }

    /// Check the box against a document of `page_count` pages and return
    /// the page it targets.
    pub fn validate(&self, page_count: usize) -> std::result::Result<usize, SkipReason> {
        let coords = [self.x, self.y, self.width, self.height, self.image_width];
        if coords.iter().any(|v| !v.is_finite()) || self.image_width <= 0.0 {
            return Err(SkipReason::InvalidGeometry);
        }
        if self.width == 0.0 || self.height == 0.0 {
            return Err(SkipReason::Empty);
        }
        usize::try_from(self.page_index)
            .ok()
            .filter(|&page| page < page_count)
            .ok_or(SkipReason::PageOutOfRange)
    }

    /// The box in page space for a page `page_width` units wide.
    ///
    /// Boxes drawn right-to-left or bottom-to-top are normalized.
    pub fn to_page_space(&self, page_width: f32) -> Rect {
        let scale = page_width / self.image_width;
        Rect::from_xywh(
            self.x * scale,
            self.y * scale,
            self.width * scale,
            self.height * scale,
        )
        .normalize()
    }
}

/// Why a manual box was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The page index does not exist in the document.
    PageOutOfRange,
    /// A coordinate is not finite or the preview width is not positive.
    InvalidGeometry,
    /// The box has no area.
    Empty,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::PageOutOfRange => write!(f, "page out of range"),
            SkipReason::InvalidGeometry => write!(f, "invalid geometry"),
            SkipReason::Empty => write!(f, "empty box"),
        }
    }
}

/// A manual box left out of the redaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkippedBox {
    /// Position of the box in the request
    pub index: usize,
    /// The page index the box asked for
    pub page_index: i64,
    /// Why it was skipped
    pub reason: SkipReason,
}

/// Applies user-drawn boxes with one shared fill color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualRedactor {
    color: FillColor,
    snapping: bool,
}

impl ManualRedactor {
    /// Create a redactor from a hex color; an unusable color means white.
    pub fn new(color_hex: &str, snapping: bool) -> Self {
        Self::with_color(FillColor::from_hex_or_white(color_hex), snapping)
    }

    /// Create a redactor with an already parsed color.
    pub fn with_color(color: FillColor, snapping: bool) -> Self {
        Self { color, snapping }
    }

    /// The fill used for every box.
    pub fn color(&self) -> FillColor {
        self.color
    }

    /// Whether boxes snap to the words they touch.
    pub fn snapping(&self) -> bool {
        self.snapping
    }

    /// Map, snap, queue and commit `boxes`.
    pub fn run<P>(&self, provider: &mut P, boxes: &[ManualBox]) -> Result<RedactionReport>
    where
        P: DocumentProvider + ?Sized,
    {
        let mut report = RedactionReport::default();
        let queue = self.plan(provider, boxes, &mut report)?;
        report.pages = queue.commit(provider)?;

        log::info!(
            "Manual redaction: {} of {} boxes applied on {} pages",
            report.mask_count(),
            boxes.len(),
            report.pages.len()
        );
        Ok(report)
    }

    /// Plan one annotation per usable box. Unusable boxes are recorded in
    /// `report.skipped_boxes`.
    pub fn plan<P>(
        &self,
        provider: &P,
        boxes: &[ManualBox],
        report: &mut RedactionReport,
    ) -> Result<RedactionQueue>
    where
        P: DocumentProvider + ?Sized,
    {
        let mut queue = RedactionQueue::new();
        let mut words: HashMap<usize, Vec<Word>> = HashMap::new();
        let page_count = provider.page_count();

        for (index, manual) in boxes.iter().enumerate() {
            let page = match manual.validate(page_count) {
                Ok(page) => page,
                Err(reason) => {
                    log::warn!(
                        "Skipping box {} for page {}: {}",
                        index,
                        manual.page_index,
                        reason
                    );
                    report.skipped_boxes.push(SkippedBox {
                        index,
                        page_index: manual.page_index,
                        reason,
                    });
                    continue;
                }
            };

            let page_width = provider.page_geometry(page)?.width;
            let user_rect = manual.to_page_space(page_width);

            let rect = if self.snapping {
                let page_words = match words.entry(page) {
                    std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                    std::collections::hash_map::Entry::Vacant(e) => e.insert(provider.words(page)?),
                };
                snap_to_words(&user_rect, page_words).unwrap_or(user_rect)
            } else {
                user_rect
            };

            log::debug!("Box {} on page {}: {} -> {}", index, page, user_rect, rect);
            queue.push(page, RedactionAnnotation::new(rect, self.color));
        }

        Ok(queue)
    }
}

/// Union of the words `rect` touches, padded vertically.
pub fn snap_to_words(rect: &Rect, words: &[Word]) -> Option<Rect> {
    words
        .iter()
        .map(|w| w.rect)
        .filter(|w| rect.intersects(w))
        .reduce(|acc, w| acc.union(&w))
        .map(|union| union.expand(0.0, SNAP_VERTICAL_PAD, 0.0, SNAP_VERTICAL_PAD))
}
