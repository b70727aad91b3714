//! Source extraction: turns a file on disk into one flat text plus the
//! paragraph spans that locate every piece of it.
//!
//! The format is picked from the file extension:
//!
//! | Extension               | Format      | Paragraphs                     | Pages            |
//! |-------------------------|-------------|--------------------------------|------------------|
//! | `txt`, `md`, `markdown` | [`Plain`]   | split on blank lines           | always 1         |
//! | `docx`                  | [`Docx`]    | `w:p` in `word/document.xml`   | always 1         |
//! | `pdf`                   | [`Pdf`]     | split on blank lines per page  | physical, 1-based |
//!
//! Paragraphs that are empty after trimming are dropped and do not consume a
//! paragraph index. Kept paragraphs are joined with `"\n\n"`, and each
//! [`SourceSpan`] slices exactly its paragraph out of the joined text.
//!
//! [`Plain`]: DocumentFormat::Plain
//! [`Docx`]: DocumentFormat::Docx
//! [`Pdf`]: DocumentFormat::Pdf

use std::io::Read;
use std::path::Path;

use docgraph_core::models::SourceSpan;
use quick_xml::events::Event;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Plain,
    Docx,
    Pdf,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" | "markdown" => Some(Self::Plain),
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "text",
            Self::Docx => "docx",
            Self::Pdf => "pdf",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Full text of a document plus the location of each kept paragraph.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub spans: Vec<SourceSpan>,
    pub format: DocumentFormat,
}

impl ExtractedDocument {
    pub fn page_count(&self) -> u32 {
        self.spans.iter().map(|s| s.page).max().unwrap_or(0)
    }
}

/// Read and extract `path`, choosing the format from its extension.
pub fn extract_document(path: &Path) -> Result<ExtractedDocument, ExtractError> {
    let format = DocumentFormat::from_path(path)
        .ok_or_else(|| ExtractError::UnsupportedFormat(path.display().to_string()))?;
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_bytes(&bytes, format)
}

/// Extract already-loaded bytes in the given format.
pub fn extract_bytes(
    bytes: &[u8],
    format: DocumentFormat,
) -> Result<ExtractedDocument, ExtractError> {
    let mut builder = SpanBuilder::default();
    match format {
        DocumentFormat::Plain => {
            let text = String::from_utf8_lossy(bytes);
            for para in text.split(PARAGRAPH_SEPARATOR) {
                builder.push(para, 1);
            }
        }
        DocumentFormat::Docx => {
            for para in docx_paragraphs(bytes)? {
                builder.push(&para, 1);
            }
        }
        DocumentFormat::Pdf => {
            let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
                .map_err(|e| ExtractError::Pdf(e.to_string()))?;
            for (i, page) in pages.iter().enumerate() {
                for para in page.split(PARAGRAPH_SEPARATOR) {
                    builder.push(para, i as u32 + 1);
                }
            }
        }
    }
    Ok(builder.finish(format))
}

#[derive(Default)]
struct SpanBuilder {
    text: String,
    spans: Vec<SourceSpan>,
}

impl SpanBuilder {
    fn push(&mut self, para: &str, page: u32) {
        if para.trim().is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push_str(PARAGRAPH_SEPARATOR);
        }
        let start = self.text.len();
        self.text.push_str(para);
        self.spans.push(SourceSpan {
            start,
            end: self.text.len(),
            page,
            paragraph_index: self.spans.len(),
        });
    }

    fn finish(self, format: DocumentFormat) -> ExtractedDocument {
        ExtractedDocument {
            text: self.text,
            spans: self.spans,
            format,
        }
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Docx(format!("{name}: {e}")))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn docx_paragraphs(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    paragraphs_from_document_xml(&xml)
}

/// Collect the text runs of each `w:p` element, in document order.
fn paragraphs_from_document_xml(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    // Outer paragraphs suspended by a nested one (text boxes).
    let mut outer: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => {
                    if depth > 0 {
                        outer.push(std::mem::take(&mut current));
                    }
                    depth += 1;
                }
                b"t" => in_text = true,
                b"tab" => current.push('\t'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    paragraphs.push(std::mem::take(&mut current));
                    depth = depth.saturating_sub(1);
                    if let Some(resumed) = outer.pop() {
                        current = resumed;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut out);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        out.into_inner()
    }

    fn assert_spans_slice_text(doc: &ExtractedDocument, expected: &[&str]) {
        let slices: Vec<&str> = doc.spans.iter().map(|s| &doc.text[s.start..s.end]).collect();
        assert_eq!(slices, expected);
    }

    #[test]
    fn plain_text_skips_blank_paragraphs() {
        let doc =
            extract_bytes(b"First para.\n\n   \n\nSecond para.", DocumentFormat::Plain).unwrap();
        assert_eq!(doc.text, "First para.\n\nSecond para.");
        assert_spans_slice_text(&doc, &["First para.", "Second para."]);
        assert_eq!(doc.spans[1].paragraph_index, 1);
        assert!(doc.spans.iter().all(|s| s.page == 1));
    }

    #[test]
    fn plain_text_offsets_survive_multibyte_characters() {
        let text = "Café au lait.\n\nNaïve résumé.";
        let doc = extract_bytes(text.as_bytes(), DocumentFormat::Plain).unwrap();
        assert_spans_slice_text(&doc, &["Café au lait.", "Naïve résumé."]);
    }

    #[test]
    fn docx_collects_runs_per_paragraph() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world &amp; more</w:t></w:r></w:p>
    <w:p></w:p>
    <w:p/>
    <w:p><w:r><w:t>Second</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let doc = extract_bytes(&docx_bytes(xml), DocumentFormat::Docx).unwrap();
        assert_spans_slice_text(&doc, &["Hello world & more", "Second"]);
        assert_eq!(doc.spans[1].paragraph_index, 1);
        assert_eq!(doc.format, DocumentFormat::Docx);
    }

    #[test]
    fn docx_text_box_keeps_surrounding_paragraph_text() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p>
      <w:r><w:t xml:space="preserve">Before box </w:t></w:r>
      <w:r><w:txbxContent><w:p><w:r><w:t>Boxed</w:t></w:r></w:p></w:txbxContent></w:r>
      <w:r><w:t>after box</w:t></w:r>
    </w:p>
    <w:p><w:r><w:t>Next</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let doc = extract_bytes(&docx_bytes(xml), DocumentFormat::Docx).unwrap();
        assert_spans_slice_text(&doc, &["Boxed", "Before box after box", "Next"]);
    }

    #[test]
    fn docx_without_document_xml_is_an_error() {
        let mut out = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut out);
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_bytes(&out.into_inner(), DocumentFormat::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_bytes(b"not a pdf", DocumentFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_bytes(b"not a zip", DocumentFormat::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"xx").unwrap();
        let err = extract_document(&path).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_path(Path::new("a/B.PDF")), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_path(Path::new("notes.md")), Some(DocumentFormat::Plain));
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
    }
}
