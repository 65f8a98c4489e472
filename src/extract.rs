//! Text extraction for supported upload formats and scraped HTML pages.

use std::io::{Cursor, Read};

use scraper::{ElementRef, Html};
use thiserror::Error;

/// Errors raised while extracting text from a document payload.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The filename extension maps to no supported extractor.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
    /// The payload could not be parsed by the extractor for its format.
    #[error("Failed to parse {format} content: {reason}")]
    Parse {
        /// Format the extractor attempted.
        format: &'static str,
        /// Underlying parser failure.
        reason: String,
    },
}

/// Extract plain text from raw bytes, dispatching on the filename extension.
///
/// Supported extensions: `txt`, `md`, `pdf`, `docx`, `html`, `htm`. Extension
/// matching is case-insensitive. The extracted text is returned as-is apart
/// from format-specific whitespace normalization.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<String, ExtractionError> {
    let extension = filename
        .rsplit('.')
        .next()
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "md" => String::from_utf8(bytes.to_vec()).map_err(|error| {
            ExtractionError::Parse {
                format: "text",
                reason: error.to_string(),
            }
        }),
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "html" | "htm" => {
            let raw = String::from_utf8_lossy(bytes);
            Ok(extract_html(&raw))
        }
        other => Err(ExtractionError::UnsupportedFormat(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|error| ExtractionError::Parse {
        format: "pdf",
        reason: error.to_string(),
    })
}

/// Pulls `w:t` text runs out of the `word/document.xml` entry, inserting a
/// newline at each paragraph boundary.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let parse = |reason: String| ExtractionError::Parse {
        format: "docx",
        reason,
    };

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|error| parse(error.to_string()))?;
    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|error| parse(error.to_string()))?
        .read_to_string(&mut document_xml)
        .map_err(|error| parse(error.to_string()))?;

    let mut reader = quick_xml::Reader::from_str(&document_xml);
    let mut text = String::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(ref element)) => {
                match element.local_name().as_ref() {
                    b"t" => in_text_run = true,
                    b"p" => {
                        if !text.is_empty() && !text.ends_with('\n') {
                            text.push('\n');
                        }
                    }
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::End(ref element)) => {
                if element.local_name().as_ref() == b"t" {
                    in_text_run = false;
                }
            }
            Ok(quick_xml::events::Event::Text(content)) if in_text_run => {
                text.push_str(&content.unescape().map_err(|error| parse(error.to_string()))?);
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(error) => return Err(parse(error.to_string())),
            _ => {}
        }
    }
    Ok(text.trim().to_string())
}

/// Extract visible text from an HTML document.
///
/// Script, style and noscript subtrees are skipped. Lines are individually
/// trimmed and blank lines dropped, so boilerplate-heavy pages collapse to
/// their readable content.
pub fn extract_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();
    collect_visible_text(document.root_element(), &mut text);

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_visible_text(element: ElementRef, out: &mut String) {
    if matches!(element.value().name(), "script" | "style" | "noscript") {
        return;
    }
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            collect_visible_text(child_element, out);
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text("hello civic world".as_bytes(), "notes.txt").unwrap();
        assert_eq!(text, "hello civic world");
    }

    #[test]
    fn extension_matching_is_case_insensitive() {
        let text = extract_text(b"markdown body", "README.MD").unwrap();
        assert_eq!(text, "markdown body");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let error = extract_text(b"...", "archive.tar.gz").unwrap_err();
        assert!(matches!(error, ExtractionError::UnsupportedFormat(ref ext) if ext == "gz"));
    }

    #[test]
    fn invalid_utf8_text_is_a_parse_error() {
        let error = extract_text(&[0xff, 0xfe, 0x00], "broken.txt").unwrap_err();
        assert!(matches!(error, ExtractionError::Parse { format: "text", .. }));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let document_xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
    <w:p><w:r><w:t>Second </w:t></w:r><w:r><w:t>paragraph.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }

        let text = extract_text(&buffer.into_inner(), "minutes.docx").unwrap();
        assert_eq!(text, "First paragraph.\nSecond paragraph.");
    }

    #[test]
    fn corrupt_docx_is_a_parse_error() {
        let error = extract_text(b"not a zip archive", "minutes.docx").unwrap_err();
        assert!(matches!(error, ExtractionError::Parse { format: "docx", .. }));
    }

    #[test]
    fn html_scripts_and_styles_are_skipped() {
        let html = r#"<html><head><style>body { color: red; }</style></head>
<body><h1>City Budget</h1><script>alert("hi")</script><p>Approved in session.</p></body></html>"#;
        let text = extract_html(html);
        assert!(text.contains("City Budget"));
        assert!(text.contains("Approved in session."));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn html_blank_lines_are_collapsed() {
        let text = extract_html("<div>  <p>  one  </p>\n\n<p>two</p>  </div>");
        assert_eq!(text, "one\ntwo");
    }
}
