//! PDF text extraction via lopdf.

use lopdf::Document;
use tracing::{debug, warn};

use crate::extract::ExtractionError;

/// Pulls plain text out of PDF bytes, page by page.
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    /// Extract the text of every page, joined with newlines. Pages that
    /// fail to decode are skipped; the call only fails when the
    /// document cannot be parsed at all or no page yields text.
    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let doc = Document::load_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))?;

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Ok(String::new());
        }

        let mut texts: Vec<String> = Vec::with_capacity(pages.len());
        let mut failed = 0usize;
        for page_number in pages.keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(text) => texts.push(text.trim_end().to_string()),
                Err(e) => {
                    failed += 1;
                    warn!(page = page_number, "failed to extract page text: {}", e);
                }
            }
        }

        if texts.is_empty() {
            return Err(ExtractionError::Pdf(format!(
                "no readable text in {} pages",
                failed
            )));
        }

        debug!(
            pages = pages.len(),
            failed, "extracted text from PDF document"
        );
        Ok(texts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_rejected() {
        let extractor = PdfTextExtractor;
        let err = extractor.extract_bytes(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(_)));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let extractor = PdfTextExtractor;
        let err = extractor.extract_bytes(b"%PDF-1.5\n").unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(_)));
    }
}
