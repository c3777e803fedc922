//! Plain-text export: emphasis markers stripped, one blank line between
//! blocks, chapters separated by numbered headings.

use anyhow::Result;

use crate::models::{BookPayload, ChapterPayload};
use crate::services::markup;

pub fn render(book: &BookPayload, chapters: &[&ChapterPayload]) -> Result<Vec<u8>> {
    let mut out = String::new();

    out.push_str(&book.title);
    out.push('\n');
    if let Some(description) = &book.description {
        out.push_str(description);
        out.push('\n');
    }

    for (index, chapter) in chapters.iter().enumerate() {
        out.push_str(&format!("\n\nChapter {}: {}\n", index + 1, chapter.title));
        for block in super::chapter_blocks(chapter) {
            out.push('\n');
            out.push_str(&markup::plain_text(&block.text));
            out.push('\n');
        }
    }

    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_marker_free_and_ordered() {
        let book = BookPayload {
            title: "Notes".to_string(),
            description: None,
            chapters: Vec::new(),
        };
        let chapters = vec![
            ChapterPayload {
                title: "First".to_string(),
                content: "<p>Plain <strong>bold</strong> text.</p>".to_string(),
                order: 1,
            },
            ChapterPayload {
                title: "Second".to_string(),
                content: "<ul><li>item one</li></ul>".to_string(),
                order: 2,
            },
        ];
        let refs: Vec<&ChapterPayload> = chapters.iter().collect();

        let text = String::from_utf8(render(&book, &refs).unwrap()).unwrap();
        assert!(text.starts_with("Notes\n"));
        assert!(text.contains("Chapter 1: First"));
        assert!(text.contains("Plain bold text."));
        assert!(!text.contains("**"));
        let first = text.find("Chapter 1").unwrap();
        let second = text.find("Chapter 2").unwrap();
        assert!(first < second);
    }
}
