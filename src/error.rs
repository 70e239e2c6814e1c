//! Error types for cvmask.

use std::io;
use thiserror::Error;

/// Result type alias for cvmask operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while opening, inspecting or redacting a PDF.
///
/// Only document-level failures surface through the public entry points.
/// Sampling, color parsing and out-of-range references degrade to documented
/// defaults and never reach the caller as an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not recognized as PDF.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// Error parsing PDF structure.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// The PDF document is encrypted.
    #[error("Document is encrypted")]
    Encrypted,

    /// Page number is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(u32, u32),

    /// Error while rasterizing page content.
    #[error("Rendering error: {0}")]
    Render(String),

    /// Error encoding output (PNG, content streams, serialized PDF).
    #[error("Encoding error: {0}")]
    Encode(String),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::PdfParse(err.to_string()),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Encode(err.to_string())
    }
}
