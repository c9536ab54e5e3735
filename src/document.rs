//! Values that flow between the first pipeline stages.
//!
//! ```text
//! DocumentReference ──fetch──▶ RawDocument ──extract──▶ ExtractedText
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the uploaded document and the person it belongs to.
///
/// Supplied by the triggering event; the pipeline never creates or mutates one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    pub document_id: i64,
    pub subject_id: String,
}

impl DocumentReference {
    pub fn new(document_id: i64, subject_id: impl Into<String>) -> Self {
        Self {
            document_id,
            subject_id: subject_id.into(),
        }
    }
}

/// Owned bytes of a downloaded document.
///
/// Produced by [`crate::pipeline::fetch::ContentFetcher`], which never returns
/// an empty buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct RawDocument {
    bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDocument")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Container format recognised by the text extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    /// Office Open XML word-processing document (`.docx`).
    Docx,
    PlainText,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Docx => "DOCX",
            DocumentFormat::PlainText => "plain-text",
        }
    }
}

/// Full, untruncated text of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    text: String,
    format: DocumentFormat,
}

impl ExtractedText {
    pub fn new(text: String, format: DocumentFormat) -> Self {
        Self { text, format }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in characters, not bytes.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_reference_uses_camel_case() {
        let r: DocumentReference =
            serde_json::from_str(r#"{"documentId": 12, "subjectId": "cand-7"}"#).unwrap();
        assert_eq!(r, DocumentReference::new(12, "cand-7"));
    }

    #[test]
    fn raw_document_debug_hides_bytes() {
        let d = RawDocument::new(vec![1, 2, 3]);
        assert_eq!(format!("{d:?}"), "RawDocument { len: 3 }");
    }

    #[test]
    fn char_len_counts_characters() {
        let t = ExtractedText::new("Société".into(), DocumentFormat::PlainText);
        assert_eq!(t.char_len(), 7);
        assert!(t.as_str().len() > 7);
    }
}
