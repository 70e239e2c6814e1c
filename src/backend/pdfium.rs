//! Page rendering through PDFium.
//!
//! PDFium is bound dynamically at runtime. The library is looked up in the
//! directory named by `CVMASK_PDFIUM_DIR`, then `./`, then
//! `./vendor/pdfium/lib/`, then the system library paths. When none of
//! them has it, [`render_page`] returns `None` and the caller falls back
//! to the built-in rasterizer.

use std::sync::{Mutex, OnceLock};

use image::{imageops, Rgb, RgbImage};
use pdfium_render::prelude::*;

use crate::error::{Error, Result};

/// Environment variable naming a directory that holds the PDFium library.
pub(crate) const LIBRARY_DIR_ENV: &str = "CVMASK_PDFIUM_DIR";

// PDFium keeps global state; one document at a time.
static PDFIUM_LOCK: Mutex<()> = Mutex::new(());
static AVAILABLE: OnceLock<bool> = OnceLock::new();

fn create_pdfium() -> Option<Pdfium> {
    let from_env = std::env::var(LIBRARY_DIR_ENV).ok().map(|dir| {
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
    });

    let bindings = match from_env {
        Some(Ok(bindings)) => Ok(bindings),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")),
    }
    .or_else(|_| {
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
            "./vendor/pdfium/lib/",
        ))
    })
    .or_else(|_| Pdfium::bind_to_system_library());

    match bindings {
        Ok(bindings) => {
            if AVAILABLE.set(true).is_ok() {
                log::debug!("Rendering with PDFium");
            }
            Some(Pdfium::new(bindings))
        }
        Err(e) => {
            if AVAILABLE.set(false).is_ok() {
                log::warn!(
                    "PDFium library not found ({:?}); set {} or install libpdfium. \
                     Falling back to the built-in rasterizer",
                    e,
                    LIBRARY_DIR_ENV
                );
            }
            None
        }
    }
}

/// Render page `page` of `data` to exactly `width` x `height` pixels.
///
/// Returns `Ok(None)` when no PDFium library is available.
pub(crate) fn render_page(data: &[u8], page: usize, width: u32, height: u32) -> Result<Option<RgbImage>> {
    if AVAILABLE.get() == Some(&false) {
        return Ok(None);
    }

    let _guard = PDFIUM_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let Some(pdfium) = create_pdfium() else {
        return Ok(None);
    };

    let document = pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(|e| Error::Render(format!("PDFium could not load the document: {}", e)))?;
    let pages = document.pages();
    let pdf_page = pages
        .get(page as u16)
        .map_err(|e| Error::Render(format!("PDFium could not load page {}: {}", page, e)))?;

    let config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_target_height(height as i32)
        .render_form_data(true)
        .render_annotations(true);
    let bitmap = pdf_page
        .render_with_config(&config)
        .map_err(|e| Error::Render(format!("PDFium could not render page {}: {}", page, e)))?;

    // Copy through raw samples so the buffer is ours whatever `image`
    // version PDFium was built against.
    let rendered = bitmap.as_image().to_rgb8();
    let (w, h) = rendered.dimensions();
    let rendered = RgbImage::from_raw(w, h, rendered.into_raw())
        .ok_or_else(|| Error::Render("PDFium bitmap size mismatch".to_string()))?;

    if (w, h) == (width, height) {
        return Ok(Some(rendered));
    }
    // Aspect-ratio rounding can leave PDFium a pixel short.
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    imageops::replace(&mut canvas, &rendered, 0, 0);
    Ok(Some(canvas))
}
