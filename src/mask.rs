//! Icon-aware mask regions.
//!
//! Resumes often put a small pictogram (phone, envelope, link glyph) just
//! left of a contact line. Masking only the text would leave that icon as a
//! cue to what was removed, so the builder scans a narrow band left of the
//! line for small vector or raster shapes and merges them into the mask.
//! Size and distance limits keep section rules, photos and page decoration
//! out of the search.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Tuning constants for mask construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskConfig {
    /// How far left of the line to look for an icon.
    pub max_icon_distance: f32,
    /// Shapes wider or taller than this are never icons.
    pub max_icon_size: f32,
    /// Extra cover beyond the right edge of the line.
    pub padding_right: f32,
    /// Left padding when no icon was found.
    pub padding_left_no_icon: f32,
    /// Vertical padding when no icon was found.
    pub padding_vertical_no_icon: f32,
    /// Margin added left, top and bottom of a merged line + icon box.
    pub icon_margin: f32,
    /// Vertical slack of the scan area above and below the line.
    pub scan_slack: f32,
    /// Left padding of a page-search keyword hit.
    pub keyword_padding_left: f32,
    /// Vertical padding of a page-search keyword hit.
    pub keyword_padding_vertical: f32,
}

impl MaskConfig {
    /// Preset tuned for single-column resumes with contact icons.
    pub const fn resume() -> Self {
        Self {
            max_icon_distance: 60.0,
            max_icon_size: 45.0,
            padding_right: 10.0,
            padding_left_no_icon: 2.0,
            padding_vertical_no_icon: 1.0,
            icon_margin: 2.0,
            scan_slack: 5.0,
            keyword_padding_left: 2.0,
            keyword_padding_vertical: 1.0,
        }
    }

    /// Preset for dense two-column layouts where neighbouring columns sit
    /// close to the contact block.
    pub const fn compact() -> Self {
        Self {
            max_icon_distance: 30.0,
            max_icon_size: 24.0,
            padding_right: 4.0,
            padding_left_no_icon: 1.0,
            padding_vertical_no_icon: 0.5,
            icon_margin: 1.0,
            scan_slack: 3.0,
            keyword_padding_left: 1.0,
            keyword_padding_vertical: 0.5,
        }
    }

    /// Set the icon search distance.
    pub fn with_max_icon_distance(mut self, distance: f32) -> Self {
        self.max_icon_distance = distance;
        self
    }

    /// Set the largest shape size still considered an icon.
    pub fn with_max_icon_size(mut self, size: f32) -> Self {
        self.max_icon_size = size;
        self
    }

    /// Set the right padding.
    pub fn with_padding_right(mut self, padding: f32) -> Self {
        self.padding_right = padding;
        self
    }

    /// Set the left padding used when no icon is found.
    pub fn with_padding_left_no_icon(mut self, padding: f32) -> Self {
        self.padding_left_no_icon = padding;
        self
    }
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self::resume()
    }
}

/// Where an icon candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconKind {
    /// A painted vector path.
    Vector,
    /// A placed raster image.
    Raster,
}

/// A shape on the page that may be an icon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IconRegion {
    /// Bounding box in page space
    pub rect: Rect,
    /// Origin of the shape
    pub kind: IconKind,
}

impl IconRegion {
    /// A vector path region.
    pub fn vector(rect: Rect) -> Self {
        Self {
            rect,
            kind: IconKind::Vector,
        }
    }

    /// A raster image region.
    pub fn raster(rect: Rect) -> Self {
        Self {
            rect,
            kind: IconKind::Raster,
        }
    }
}

/// Area left of `line` searched for an icon.
pub fn scan_area(line: &Rect, config: &MaskConfig) -> Rect {
    Rect::new(
        line.x0 - config.max_icon_distance,
        line.y0 - config.scan_slack,
        line.x0,
        line.y1 + config.scan_slack,
    )
}

/// Union of every small shape that intersects the scan area of `line`.
pub fn find_icon_bbox(line: &Rect, regions: &[IconRegion], config: &MaskConfig) -> Option<Rect> {
    let area = scan_area(line, config);

    regions
        .iter()
        .map(|region| region.rect)
        .filter(|rect| rect.width() <= config.max_icon_size && rect.height() <= config.max_icon_size)
        .filter(|rect| area.intersects(rect))
        .fold(None, |acc: Option<Rect>, rect| match acc {
            None => Some(rect),
            Some(bbox) => Some(bbox.union(&rect)),
        })
}

/// Rectangle to destroy for a sensitive `line`.
///
/// With an icon nearby the result covers line and icon with a small margin;
/// otherwise it is the line box padded by the no-icon constants. The right
/// edge is always `line.x1 + padding_right`.
pub fn build_mask_region(line: &Rect, regions: &[IconRegion], config: &MaskConfig) -> Rect {
    match find_icon_bbox(line, regions, config) {
        Some(icon) => {
            let combined = line.union(&icon);
            Rect::new(
                combined.x0 - config.icon_margin,
                combined.y0 - config.icon_margin,
                (line.x1 + config.padding_right).max(combined.x1),
                combined.y1 + config.icon_margin,
            )
        }
        None => Rect::new(
            line.x0 - config.padding_left_no_icon,
            line.y0 - config.padding_vertical_no_icon,
            line.x1 + config.padding_right,
            line.y1 + config.padding_vertical_no_icon,
        ),
    }
}

/// Tight mask around a page-search keyword hit.
pub fn keyword_mask_region(hit: &Rect, config: &MaskConfig) -> Rect {
    Rect::new(
        hit.x0 - config.keyword_padding_left,
        hit.y0 - config.keyword_padding_vertical,
        hit.x1 + config.padding_right,
        hit.y1 + config.keyword_padding_vertical,
    )
}
