//! Page count and page previews.

use serde::{Deserialize, Serialize};

use crate::backend::{DocumentProvider, LopdfProvider};
use crate::error::Result;

/// Scale used for previews unless configured otherwise.
pub const DEFAULT_PREVIEW_SCALE: f32 = 2.0;

/// Basic facts about a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Number of pages
    pub total_pages: usize,
}

impl DocumentInfo {
    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.total_pages
    }
}

/// Describe an opened document.
pub fn info_of<P: DocumentProvider + ?Sized>(provider: &P) -> DocumentInfo {
    DocumentInfo {
        total_pages: provider.page_count(),
    }
}

/// Render `page` as PNG, or `None` when the page does not exist.
pub fn render_preview<P>(provider: &P, page: usize, scale: f32) -> Result<Option<Vec<u8>>>
where
    P: DocumentProvider + ?Sized,
{
    if page >= provider.page_count() {
        log::debug!("Preview of page {} requested, document has {}", page, provider.page_count());
        return Ok(None);
    }
    let pixels = provider.render_page(page, scale)?;
    Ok(Some(pixels.to_png()?))
}

/// Page count of a PDF in memory.
pub fn get_info(data: &[u8]) -> Result<DocumentInfo> {
    let provider = LopdfProvider::from_bytes(data)?;
    Ok(info_of(&provider))
}

/// PNG of one page at the default preview scale, or `None` when the page
/// does not exist.
pub fn preview(data: &[u8], page: usize) -> Result<Option<Vec<u8>>> {
    preview_with_scale(data, page, DEFAULT_PREVIEW_SCALE)
}

/// PNG of one page at `scale` pixels per unit.
pub fn preview_with_scale(data: &[u8], page: usize, scale: f32) -> Result<Option<Vec<u8>>> {
    let provider = LopdfProvider::from_bytes(data)?;
    render_preview(&provider, page, scale)
}
