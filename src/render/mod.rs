//! Output rendering for generated study content.

pub mod pdf;

use thiserror::Error;

pub use pdf::PdfWriter;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("PDF rendering failed: {0}")]
    Pdf(String),
}
