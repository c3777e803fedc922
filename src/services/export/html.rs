//! Self-contained single-file HTML export: styles are embedded so the file
//! reads well when opened directly from disk.

use std::fmt::Write;

use anyhow::Result;
use html_escape::encode_text;

use crate::models::{Block, BlockKind, BookPayload, ChapterPayload};
use crate::services::markup;

const STYLESHEET: &str = r#"
body { font-family: Georgia, 'Times New Roman', serif; max-width: 42em; margin: 0 auto; padding: 2em 1.5em; color: #1a1a1a; line-height: 1.7; }
.cover { text-align: center; margin: 4em 0 6em; }
.cover h1 { font-size: 2.6em; margin-bottom: 0.3em; }
.cover .description { font-style: italic; color: #555; }
.chapter { margin-top: 5em; page-break-before: always; }
.chapter-number { text-align: center; font-style: italic; color: #777; margin-bottom: 0.2em; }
.chapter-title { text-align: center; font-size: 2em; margin-top: 0; }
h1 { font-size: 1.6em; } h2 { font-size: 1.35em; } h3 { font-size: 1.15em; }
p { text-align: justify; text-indent: 1.5em; margin: 0 0 0.4em; }
blockquote { font-style: italic; border-left: 3px solid #ccc; margin: 1em 0; padding-left: 1em; color: #444; }
ul, ol { padding-left: 2em; }
"#;

fn block_html(block: &Block) -> String {
    let inner = markup::markers_to_html(&block.text);
    match block.kind {
        BlockKind::Heading1 => format!("<h1>{inner}</h1>"),
        BlockKind::Heading2 => format!("<h2>{inner}</h2>"),
        BlockKind::Heading3 => format!("<h3>{inner}</h3>"),
        BlockKind::Quote => format!("<blockquote>{inner}</blockquote>"),
        BlockKind::UnorderedList | BlockKind::OrderedList => {
            let items: String = block
                .text
                .lines()
                .map(|line| line.trim_start_matches("• "))
                .map(|item| format!("<li>{}</li>", markup::markers_to_html(item)))
                .collect();
            if block.kind == BlockKind::OrderedList {
                format!("<ol>{items}</ol>")
            } else {
                format!("<ul>{items}</ul>")
            }
        }
        BlockKind::Paragraph => format!("<p>{inner}</p>"),
    }
}

pub fn render(book: &BookPayload, chapters: &[&ChapterPayload]) -> Result<Vec<u8>> {
    let title = encode_text(&book.title);
    let mut page = String::new();

    write!(
        page,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLESHEET}</style>\n</head>\n<body>\n"
    )?;

    write!(page, "<div class=\"cover\">\n<h1>{title}</h1>\n")?;
    if let Some(description) = &book.description {
        write!(
            page,
            "<p class=\"description\">{}</p>\n",
            encode_text(description)
        )?;
    }
    page.push_str("</div>\n");

    for (index, chapter) in chapters.iter().enumerate() {
        write!(
            page,
            "<div class=\"chapter\">\n<p class=\"chapter-number\">Chapter {}</p>\n\
             <h1 class=\"chapter-title\">{}</h1>\n",
            index + 1,
            encode_text(&chapter.title)
        )?;
        for block in super::chapter_blocks(chapter) {
            page.push_str(&block_html(&block));
            page.push('\n');
        }
        page.push_str("</div>\n");
    }

    page.push_str("</body>\n</html>\n");
    Ok(page.into_bytes())
}
