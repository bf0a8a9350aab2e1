//! Pluggable text extraction for downloaded images.
//!
//! OCR engines are an external concern; the pipeline only needs a narrow
//! seam it can call after an image asset lands. Extraction failures are
//! per-asset and never abort the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("extraction failed: {0}")]
    Engine(String),
}

/// Extracts visible text from image bytes.
///
/// Implementations must be cheap to call with garbage input: the pipeline
/// feeds every image asset through without pre-validating formats.
pub trait TextExtractor: Send + Sync {
    /// # Errors
    ///
    /// Returns [`OcrError`] when the bytes cannot be decoded or the engine
    /// fails. The caller records the failure and moves on.
    fn extract_text(&self, image: &[u8]) -> Result<String, OcrError>;
}

/// Extractor that finds no text in anything. The default when OCR is
/// disabled, and a convenient stand-in for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExtractor;

impl TextExtractor for NoopExtractor {
    fn extract_text(&self, _image: &[u8]) -> Result<String, OcrError> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_extractor_returns_empty_text() {
        let text = NoopExtractor.extract_text(b"\xff\xd8\xff").unwrap();
        assert!(text.is_empty());
    }
}
