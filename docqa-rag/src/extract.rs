//! Text extraction from ingest sources.
//!
//! [`PlainTextExtractor`] reads UTF-8 text. With the `pdf` feature,
//! [`PdfExtractor`] pulls page text out of PDF files via `lopdf`, and
//! [`SniffingExtractor`] picks between the two by looking for the `%PDF-`
//! magic bytes.

use std::borrow::Cow;

use crate::document::IngestSource;
use crate::error::{IngestionError, Result};

/// Turns raw source bytes or a file into plain text.
pub trait TextExtractor: Send + Sync {
    /// Extract the text of `source`.
    ///
    /// # Errors
    ///
    /// [`IngestionError::UnreadableSource`] when the source cannot be read
    /// or is not in a format this extractor understands.
    fn extract(&self, source: &IngestSource) -> Result<String>;
}

/// Load the raw bytes of a source.
pub(crate) fn source_bytes(source: &IngestSource) -> Result<Cow<'_, [u8]>> {
    match source {
        IngestSource::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
        IngestSource::Path(path) => std::fs::read(path).map(Cow::Owned).map_err(|e| {
            IngestionError::UnreadableSource(format!("{}: {e}", path.display())).into()
        }),
    }
}

/// Extracts UTF-8 text. Invalid UTF-8 is rejected rather than replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, source: &IngestSource) -> Result<String> {
        let bytes = source_bytes(source)?;
        String::from_utf8(bytes.into_owned()).map_err(|e| {
            IngestionError::UnreadableSource(format!("not valid UTF-8 text: {e}")).into()
        })
    }
}

#[cfg(feature = "pdf")]
pub use pdf::{PdfExtractor, SniffingExtractor};

#[cfg(feature = "pdf")]
mod pdf {
    use lopdf::Document;
    use tracing::debug;

    use super::{PlainTextExtractor, TextExtractor, source_bytes};
    use crate::document::IngestSource;
    use crate::error::{IngestionError, Result};

    const PDF_MAGIC: &[u8] = b"%PDF-";

    /// Extracts page text from PDF documents, pages joined by blank lines.
    ///
    /// Pages whose text cannot be decoded are skipped. A PDF with no
    /// extractable text (e.g. a scan) yields an empty string, which the
    /// engine rejects as empty.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PdfExtractor;

    impl PdfExtractor {
        fn extract_bytes(&self, bytes: &[u8]) -> Result<String> {
            let doc = Document::load_mem(bytes).map_err(|e| {
                IngestionError::UnreadableSource(format!("failed to load PDF: {e}"))
            })?;

            let mut page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
            page_numbers.sort_unstable();

            let pages: Vec<String> = page_numbers
                .iter()
                .filter_map(|page| doc.extract_text(&[*page]).ok())
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .collect();

            debug!(pages = page_numbers.len(), text_pages = pages.len(), "extracted PDF text");
            Ok(pages.join("\n\n"))
        }
    }

    impl TextExtractor for PdfExtractor {
        fn extract(&self, source: &IngestSource) -> Result<String> {
            let bytes = source_bytes(source)?;
            self.extract_bytes(&bytes)
        }
    }

    /// Routes PDF sources to [`PdfExtractor`] and everything else to
    /// [`PlainTextExtractor`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SniffingExtractor;

    impl TextExtractor for SniffingExtractor {
        fn extract(&self, source: &IngestSource) -> Result<String> {
            let bytes = source_bytes(source)?;
            if bytes.starts_with(PDF_MAGIC) {
                PdfExtractor.extract_bytes(&bytes)
            } else {
                PlainTextExtractor.extract(&IngestSource::Bytes(bytes.into_owned()))
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_round_trips_utf8() {
        let text =
            PlainTextExtractor.extract(&IngestSource::bytes("çay ve simit".as_bytes())).unwrap();
        assert_eq!(text, "çay ve simit");
    }

    #[test]
    fn invalid_utf8_is_unreadable() {
        let err =
            PlainTextExtractor.extract(&IngestSource::bytes(vec![0xff, 0xfe, 0x00])).unwrap_err();
        assert_eq!(err.kind(), "unreadable_source");
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = PlainTextExtractor
            .extract(&IngestSource::path("/definitely/not/here.txt"))
            .unwrap_err();
        assert_eq!(err.kind(), "unreadable_source");
    }
}
