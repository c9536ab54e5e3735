//! Text extraction: document bytes → plain text.
//!
//! ## Format detection
//!
//! Uploads arrive without a trustworthy content type, so the format is
//! sniffed from the first bytes:
//!
//! | Signature           | Parser                                    |
//! |---------------------|-------------------------------------------|
//! | `%PDF`              | `lopdf`, all pages in page order          |
//! | `PK\x03\x04` (ZIP)  | `docx-rs`, paragraphs and table rows      |
//! | UTF-16 BOM          | UTF-16 decode                             |
//! | anything else       | UTF-8 decode (optional BOM stripped)      |
//!
//! Signatures only count at the start of the buffer, after optional
//! whitespace or a UTF-8 BOM.
//!
//! A buffer that is none of these fails with
//! [`ExtractionError::ParseFailure`] carrying the decoder error.
//!
//! ## Why the worker pool?
//!
//! `lopdf` decompresses every content stream synchronously and `docx-rs`
//! inflates and walks the whole XML tree. The whole parse
//! runs inside [`WorkerPool::run`] so a 200-page portfolio PDF cannot block
//! the async scheduler.

use crate::document::{DocumentFormat, ExtractedText, RawDocument};
use crate::error::ExtractionError;
use crate::pipeline::workers::WorkerPool;
use docx_rs::{DocumentChild, ParagraphChild, RunChild, TableCellContent, TableChild, TableRowChild};
use tracing::{debug, info, warn};

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Parses downloaded documents into text.
#[derive(Debug, Clone)]
pub struct TextExtractor {
    pool: WorkerPool,
}

impl TextExtractor {
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    /// Extract all text from `document`.
    pub async fn extract(&self, document: RawDocument) -> Result<ExtractedText, ExtractionError> {
        if document.is_empty() {
            return Err(ExtractionError::EmptyInput);
        }
        let format = sniff_format(document.as_bytes());
        let size = document.len();

        let text = self
            .pool
            .run(move || extract_blocking(document.as_bytes(), format))
            .await
            .map_err(|e| ExtractionError::ParseFailure {
                format: format.as_str(),
                source: Box::new(e),
            })??;

        if text.is_blank() {
            warn!("{} document of {} bytes contains no text", format.as_str(), size);
        } else {
            info!(
                "Extracted {} chars from {} document ({} bytes)",
                text.char_len(),
                format.as_str(),
                size
            );
        }
        Ok(text)
    }
}

/// Guess the container format from the leading bytes.
pub fn sniff_format(bytes: &[u8]) -> DocumentFormat {
    // Some generators emit whitespace or a BOM before the header.
    let head = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    let head = &head[start..];

    if head.starts_with(PDF_MAGIC) {
        DocumentFormat::Pdf
    } else if head.starts_with(ZIP_MAGIC) {
        DocumentFormat::Docx
    } else {
        DocumentFormat::PlainText
    }
}

/// Blocking implementation of text extraction.
fn extract_blocking(
    bytes: &[u8],
    format: DocumentFormat,
) -> Result<ExtractedText, ExtractionError> {
    let text = match format {
        DocumentFormat::Pdf => extract_pdf(bytes)?,
        DocumentFormat::Docx => extract_docx(bytes)?,
        DocumentFormat::PlainText => decode_text(bytes)?,
    };
    Ok(ExtractedText::new(text, format))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    let parse_failure = |e: lopdf::Error| ExtractionError::ParseFailure {
        format: DocumentFormat::Pdf.as_str(),
        source: Box::new(e),
    };

    let doc = lopdf::Document::load_mem(bytes).map_err(parse_failure)?;

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    debug!("PDF loaded: {} pages", pages.len());

    let mut text = String::new();
    for page in pages {
        let page_text = doc.extract_text(&[page]).map_err(parse_failure)?;
        text.push_str(&page_text);
        if !page_text.is_empty() && !page_text.ends_with('\n') {
            text.push('\n');
        }
    }
    Ok(text)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| ExtractionError::ParseFailure {
        format: DocumentFormat::Docx.as_str(),
        source: e.to_string().into(),
    })?;

    let mut parts: Vec<String> = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => {
                let text = paragraph_text(p);
                if !text.trim().is_empty() {
                    parts.push(text);
                }
            }
            DocumentChild::Table(t) => {
                // Résumés often lay out dates and roles in tables: one line per row.
                for row in &t.rows {
                    let TableChild::TableRow(r) = row;
                    let cells: Vec<String> = r
                        .cells
                        .iter()
                        .map(|cell| {
                            let TableRowChild::TableCell(c) = cell;
                            c.children
                                .iter()
                                .filter_map(|content| match content {
                                    TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                                    _ => None,
                                })
                                .filter(|t| !t.trim().is_empty())
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect();
                    if cells.iter().any(|c| !c.trim().is_empty()) {
                        parts.push(cells.join(" | "));
                    }
                }
            }
            _ => {}
        }
    }
    debug!("DOCX loaded: {} text blocks", parts.len());

    let mut text = parts.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    Ok(text)
}

fn paragraph_text(p: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        match child {
            ParagraphChild::Run(r) => push_run_text(&mut text, r),
            ParagraphChild::Hyperlink(h) => {
                for inner in &h.children {
                    if let ParagraphChild::Run(r) = inner {
                        push_run_text(&mut text, r);
                    }
                }
            }
            _ => {}
        }
    }
    text
}

fn push_run_text(out: &mut String, run: &docx_rs::Run) {
    for child in &run.children {
        match child {
            RunChild::Text(t) => out.push_str(&t.text),
            RunChild::Tab(_) => out.push('\t'),
            RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}

fn decode_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let failure = |source: crate::error::BoxError| ExtractionError::ParseFailure {
        format: DocumentFormat::PlainText.as_str(),
        source,
    };

    if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        return decode_utf16(rest, u16::from_le_bytes).map_err(failure);
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        return decode_utf16(rest, u16::from_be_bytes).map_err(failure);
    }
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    std::str::from_utf8(body)
        .map(normalise_line_endings)
        .map_err(|e| failure(Box::new(e)))
}

fn decode_utf16(
    bytes: &[u8],
    to_unit: fn([u8; 2]) -> u16,
) -> Result<String, crate::error::BoxError> {
    if bytes.len() % 2 != 0 {
        return Err("UTF-16 text has an odd number of bytes".into());
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    let text = String::from_utf16(&units)?;
    Ok(normalise_line_endings(&text))
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF with one page per entry of `page_texts`.
    pub(crate) fn pdf_with_pages(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut page_ids = Vec::new();
        for text in page_texts {
            let content = format!(
                "BT /F1 12 Tf 72 720 Td ({}) Tj ET",
                text.replace('\\', "\\\\")
                    .replace('(', "\\(")
                    .replace(')', "\\)")
            );
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            page_ids.push(doc.add_object(dictionary! {
                "Type" => "Page",
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            }));
        }

        let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_texts.len() as i64),
        });
        for page_id in &page_ids {
            if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(*page_id) {
                dict.set("Parent", pages_id);
            }
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    /// Build a DOCX with one paragraph per entry of `paragraphs` and a
    /// table with one row per entry of `rows`.
    pub(crate) fn docx_with(paragraphs: &[&str], rows: &[&[&str]]) -> Vec<u8> {
        use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};

        let mut docx = Docx::new();
        for text in paragraphs {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)));
        }
        if !rows.is_empty() {
            let rows = rows
                .iter()
                .map(|cells| {
                    TableRow::new(
                        cells
                            .iter()
                            .map(|c| {
                                TableCell::new()
                                    .add_paragraph(Paragraph::new().add_run(Run::new().add_text(*c)))
                            })
                            .collect(),
                    )
                })
                .collect();
            docx = docx.add_table(Table::new(rows));
        }

        let mut buffer = std::io::Cursor::new(Vec::new());
        docx.build().pack(&mut buffer).unwrap();
        buffer.into_inner()
    }

    fn extractor() -> TextExtractor {
        TextExtractor::new(WorkerPool::new(2))
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let err = extractor().extract(RawDocument::new(Vec::new())).await.unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyInput));
    }

    #[tokio::test]
    async fn extracts_pdf_text_from_every_page() {
        let bytes = pdf_with_pages(&["Senior Rust Engineer", "Kubernetes and PostgreSQL"]);
        let text = extractor().extract(RawDocument::new(bytes)).await.unwrap();

        assert_eq!(text.format(), DocumentFormat::Pdf);
        assert!(text.as_str().contains("Senior Rust Engineer"), "got: {:?}", text.as_str());
        assert!(text.as_str().contains("Kubernetes and PostgreSQL"));
        let first = text.as_str().find("Senior").unwrap();
        let second = text.as_str().find("Kubernetes").unwrap();
        assert!(first < second, "pages must stay in order");
    }

    #[tokio::test]
    async fn corrupt_pdf_is_parse_failure() {
        let bytes = b"%PDF-1.7\nthis is not really a pdf".to_vec();
        let err = extractor().extract(RawDocument::new(bytes)).await.unwrap_err();
        assert!(
            matches!(err, ExtractionError::ParseFailure { format: "PDF", .. }),
            "got: {err:?}"
        );
        assert!(std::error::Error::source(&err).is_some(), "cause must be attached");
    }

    #[tokio::test]
    async fn plain_text_passes_through() {
        let bytes = "Jane Doe\r\nData Engineer\r\n".as_bytes().to_vec();
        let text = extractor().extract(RawDocument::new(bytes)).await.unwrap();
        assert_eq!(text.format(), DocumentFormat::PlainText);
        assert_eq!(text.as_str(), "Jane Doe\nData Engineer\n");
    }

    #[tokio::test]
    async fn utf8_bom_is_stripped() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("Ingénieure".as_bytes());
        let text = extractor().extract(RawDocument::new(bytes)).await.unwrap();
        assert_eq!(text.as_str(), "Ingénieure");
    }

    #[tokio::test]
    async fn utf16_le_is_decoded() {
        let mut bytes = UTF16_LE_BOM.to_vec();
        for unit in "Résumé".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let text = extractor().extract(RawDocument::new(bytes)).await.unwrap();
        assert_eq!(text.as_str(), "Résumé");
    }

    #[tokio::test]
    async fn binary_garbage_is_parse_failure() {
        let bytes = vec![0x00, 0xC3, 0x28, 0xFF, 0x10];
        let err = extractor().extract(RawDocument::new(bytes)).await.unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::ParseFailure { format: "plain-text", .. }
        ));
    }

    #[tokio::test]
    async fn extracts_docx_paragraphs_and_tables() {
        let bytes = docx_with(
            &["Camille Martin", "Ingenieure logicielle"],
            &[&["2018 - present", "Lead developer, Distrib SA"]],
        );
        assert_eq!(sniff_format(&bytes), DocumentFormat::Docx);

        let text = extractor().extract(RawDocument::new(bytes)).await.unwrap();
        assert_eq!(text.format(), DocumentFormat::Docx);
        let body = text.as_str();
        assert!(body.contains("Camille Martin\nIngenieure logicielle"), "got: {body:?}");
        assert!(body.contains("2018 - present | Lead developer, Distrib SA"));
        assert!(body.find("Ingenieure").unwrap() < body.find("2018").unwrap());
    }

    #[tokio::test]
    async fn zip_that_is_not_docx_is_parse_failure() {
        let bytes = b"PK\x03\x04not really a zip archive".to_vec();
        let err = extractor().extract(RawDocument::new(bytes)).await.unwrap_err();
        assert!(
            matches!(err, ExtractionError::ParseFailure { format: "DOCX", .. }),
            "got: {err:?}"
        );
    }

    #[test]
    fn sniff_detects_pdf_after_leading_whitespace() {
        assert_eq!(sniff_format(b"\n\n%PDF-1.4 ..."), DocumentFormat::Pdf);
        let mut bom = UTF8_BOM.to_vec();
        bom.extend_from_slice(b"%PDF-1.7");
        assert_eq!(sniff_format(&bom), DocumentFormat::Pdf);
        assert_eq!(sniff_format(b"hello"), DocumentFormat::PlainText);
    }

    #[tokio::test]
    async fn text_mentioning_pdf_magic_stays_plain_text() {
        let bytes = b"Jane Doe\nExported reports as %PDF-1.7 archives\n".to_vec();
        assert_eq!(sniff_format(&bytes), DocumentFormat::PlainText);
        let text = extractor().extract(RawDocument::new(bytes)).await.unwrap();
        assert!(text.as_str().contains("%PDF-1.7 archives"));
    }
}
