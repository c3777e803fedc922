//! Export renderers. All four consume the same flat block sequence built by
//! the markup parser and emit a downloadable artifact; chapters without any
//! content are skipped, and a book where nothing remains is reported as
//! not exportable instead of producing an empty file.

mod docx;
mod epub;
mod html;
mod pdf;
mod txt;

use serde::Deserialize;

use crate::models::{Block, BookPayload, ChapterPayload};
use crate::services::markup;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no chapter has any content to export")]
    NothingToExport,
    #[error("failed to render {format} output: {source}")]
    Render {
        format: &'static str,
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Docx,
    Html,
    Epub,
    Txt,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Some(ExportFormat::Pdf),
            "docx" => Some(ExportFormat::Docx),
            "html" => Some(ExportFormat::Html),
            "epub" => Some(ExportFormat::Epub),
            "txt" => Some(ExportFormat::Txt),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
            ExportFormat::Html => "html",
            ExportFormat::Epub => "epub",
            ExportFormat::Txt => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::Epub => "application/epub+zip",
            ExportFormat::Txt => "text/plain; charset=utf-8",
        }
    }
}

/// A finished artifact ready to be sent as a download.
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn render(format: ExportFormat, book: &BookPayload) -> Result<ExportFile, ExportError> {
    let chapters = printable_chapters(book)?;

    let bytes = match format {
        ExportFormat::Pdf => pdf::render(book, &chapters),
        ExportFormat::Docx => docx::render(book, &chapters),
        ExportFormat::Html => html::render(book, &chapters),
        ExportFormat::Epub => epub::render(book, &chapters),
        ExportFormat::Txt => txt::render(book, &chapters),
    }
    .map_err(|source| ExportError::Render {
        format: format.name(),
        source,
    })?;

    Ok(ExportFile {
        filename: format!("{}.{}", safe_file_stem(&book.title), format.name()),
        content_type: format.content_type(),
        bytes,
    })
}

/// Chapters worth exporting, sorted by their order field.
fn printable_chapters(book: &BookPayload) -> Result<Vec<&ChapterPayload>, ExportError> {
    let mut chapters: Vec<&ChapterPayload> = book
        .chapters
        .iter()
        .filter(|c| !c.content.trim().is_empty())
        .collect();
    if chapters.is_empty() {
        return Err(ExportError::NothingToExport);
    }
    chapters.sort_by_key(|c| c.order);
    Ok(chapters)
}

/// Blocks for one chapter. The parser already falls back to a tag-stripped
/// paragraph for malformed markup, so this only adds the type plumbing.
fn chapter_blocks(chapter: &ChapterPayload) -> Vec<Block> {
    markup::parse_blocks(&chapter.content)
}

/// Keeps filenames portable: alphanumerics and dashes, everything else
/// collapsed into single underscores, capped at 50 chars.
fn safe_file_stem(title: &str) -> String {
    let mut stem = String::new();
    let mut last_was_sep = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            stem.push(c);
            last_was_sep = false;
        } else if !last_was_sep && !stem.is_empty() {
            stem.push('_');
            last_was_sep = true;
        }
    }
    let stem = stem.trim_end_matches('_').chars().take(50).collect::<String>();
    if stem.is_empty() { "book".to_string() } else { stem }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(title: &str, content: &str, order: u32) -> ChapterPayload {
        ChapterPayload {
            title: title.to_string(),
            content: content.to_string(),
            order,
        }
    }

    fn sample_book() -> BookPayload {
        BookPayload {
            title: "The Winter Road".to_string(),
            description: Some("A journey north".to_string()),
            chapters: vec![
                chapter("Arrival", "<p>Second <strong>chapter</strong>.</p>", 2),
                chapter("Departure", "<h1>Start</h1><p>First chapter text.</p>", 1),
                chapter("Empty", "   ", 3),
            ],
        }
    }

    #[test]
    fn all_formats_reject_books_with_no_content() {
        let empty = BookPayload {
            title: "Empty".to_string(),
            description: None,
            chapters: vec![chapter("One", "", 1), chapter("Two", "  \n ", 2)],
        };
        for format in [
            ExportFormat::Pdf,
            ExportFormat::Docx,
            ExportFormat::Html,
            ExportFormat::Epub,
            ExportFormat::Txt,
        ] {
            assert!(matches!(
                render(format, &empty),
                Err(ExportError::NothingToExport)
            ));
        }
    }

    #[test]
    fn empty_chapters_are_skipped_and_order_is_respected() {
        let book = sample_book();
        let chapters = printable_chapters(&book).unwrap();
        let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Departure", "Arrival"]);
    }

    #[test]
    fn pdf_renders_a_pdf_header() {
        let file = render(ExportFormat::Pdf, &sample_book()).unwrap();
        assert!(file.bytes.starts_with(b"%PDF"));
        assert_eq!(file.filename, "The_Winter_Road.pdf");
        assert_eq!(file.content_type, "application/pdf");
    }

    #[test]
    fn docx_and_epub_render_zip_containers() {
        for format in [ExportFormat::Docx, ExportFormat::Epub] {
            let file = render(format, &sample_book()).unwrap();
            assert!(file.bytes.starts_with(b"PK"), "{format:?} should be a zip");
        }
    }

    #[test]
    fn txt_renders_marker_free_plain_text() {
        let file = render(ExportFormat::Txt, &sample_book()).unwrap();
        assert_eq!(file.content_type, "text/plain; charset=utf-8");
        assert_eq!(file.filename, "The_Winter_Road.txt");

        let text = String::from_utf8(file.bytes).unwrap();
        assert!(text.contains("Second chapter."));
        assert!(!text.contains("**"));
    }

    #[test]
    fn html_embeds_content_and_escapes_the_title() {
        let mut book = sample_book();
        book.title = "Fish & Chips".to_string();
        let file = render(ExportFormat::Html, &book).unwrap();
        let rendered = String::from_utf8(file.bytes).unwrap();

        assert!(rendered.contains("Fish &amp; Chips"));
        assert!(rendered.contains("<strong>chapter</strong>"));
        // Chapter order: "Departure" content precedes "Arrival" content.
        let first = rendered.find("First chapter text").unwrap();
        let second = rendered.find("Second").unwrap();
        assert!(first < second);
        assert_eq!(file.filename, "Fish_Chips.html");
    }

    #[test]
    fn file_stems_are_sanitized() {
        assert_eq!(safe_file_stem("My Book: A Story!"), "My_Book_A_Story");
        assert_eq!(safe_file_stem("***"), "book");
    }
}
