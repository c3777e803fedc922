//! EPUB packaging via epub-builder: a title page plus one XHTML document
//! per chapter, all referencing a shared stylesheet.

use anyhow::{Result, anyhow};
use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};
use html_escape::encode_text;

use crate::models::{Block, BlockKind, BookPayload, ChapterPayload};
use crate::services::markup;

const STYLESHEET: &str = r#"
body { font-family: Georgia, serif; line-height: 1.6; }
h1.chapter-title { text-align: center; }
p.chapter-number { text-align: center; font-style: italic; }
p { text-align: justify; text-indent: 1.5em; }
blockquote { font-style: italic; margin-left: 1.5em; }
.cover { text-align: center; margin-top: 30%; }
.cover .description { font-style: italic; }
"#;

fn xhtml_document(title: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\n<head>\n<title>{}</title>\n\
         <link rel=\"stylesheet\" type=\"text/css\" href=\"stylesheet.css\"/>\n\
         </head>\n<body>\n{}</body>\n</html>\n",
        encode_text(title),
        body
    )
}

fn block_xhtml(block: &Block) -> String {
    let inner = markup::markers_to_html(&block.text);
    match block.kind {
        BlockKind::Heading1 => format!("<h1>{inner}</h1>\n"),
        BlockKind::Heading2 => format!("<h2>{inner}</h2>\n"),
        BlockKind::Heading3 => format!("<h3>{inner}</h3>\n"),
        BlockKind::Quote => format!("<blockquote>{inner}</blockquote>\n"),
        BlockKind::UnorderedList | BlockKind::OrderedList => {
            let items: String = block
                .text
                .lines()
                .map(|line| line.trim_start_matches("• "))
                .map(|item| format!("<li>{}</li>", markup::markers_to_html(item)))
                .collect();
            if block.kind == BlockKind::OrderedList {
                format!("<ol>{items}</ol>\n")
            } else {
                format!("<ul>{items}</ul>\n")
            }
        }
        BlockKind::Paragraph => format!("<p>{inner}</p>\n"),
    }
}

fn title_page(book: &BookPayload) -> String {
    let mut body = format!("<div class=\"cover\">\n<h1>{}</h1>\n", encode_text(&book.title));
    if let Some(description) = &book.description {
        body.push_str(&format!(
            "<p class=\"description\">{}</p>\n",
            encode_text(description)
        ));
    }
    body.push_str("</div>\n");
    xhtml_document(&book.title, &body)
}

fn chapter_page(chapter: &ChapterPayload, number: usize) -> String {
    let mut body = format!(
        "<p class=\"chapter-number\">Chapter {}</p>\n<h1 class=\"chapter-title\">{}</h1>\n",
        number,
        encode_text(&chapter.title)
    );
    for block in super::chapter_blocks(chapter) {
        body.push_str(&block_xhtml(&block));
    }
    xhtml_document(&chapter.title, &body)
}

pub fn render(book: &BookPayload, chapters: &[&ChapterPayload]) -> Result<Vec<u8>> {
    // epub-builder's error type does not convert with `?`, hence the maps.
    let zip = ZipLibrary::new().map_err(|e| anyhow!("{e}"))?;
    let mut builder = EpubBuilder::new(zip).map_err(|e| anyhow!("{e}"))?;

    builder
        .metadata("title", book.title.as_str())
        .map_err(|e| anyhow!("{e}"))?;
    builder
        .metadata("lang", "en")
        .map_err(|e| anyhow!("{e}"))?;
    if let Some(description) = &book.description {
        builder
            .metadata("description", description.as_str())
            .map_err(|e| anyhow!("{e}"))?;
    }
    builder
        .stylesheet(STYLESHEET.as_bytes())
        .map_err(|e| anyhow!("{e}"))?;

    builder
        .add_content(
            EpubContent::new("title.xhtml", title_page(book).as_bytes())
                .title(book.title.as_str())
                .reftype(ReferenceType::TitlePage),
        )
        .map_err(|e| anyhow!("{e}"))?;

    for (index, chapter) in chapters.iter().enumerate() {
        let number = index + 1;
        builder
            .add_content(
                EpubContent::new(
                    format!("chapter_{number}.xhtml"),
                    chapter_page(chapter, number).as_bytes(),
                )
                .title(chapter.title.as_str())
                .reftype(ReferenceType::Text),
            )
            .map_err(|e| anyhow!("{e}"))?;
    }

    let mut bytes = Vec::new();
    builder.generate(&mut bytes).map_err(|e| anyhow!("{e}"))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_pages_are_wellformed_xhtml_shells() {
        let chapter = ChapterPayload {
            title: "Dust & Ash".to_string(),
            content: "<p>It <em>begins</em>.</p>".to_string(),
            order: 1,
        };
        let page = chapter_page(&chapter, 1);
        assert!(page.starts_with("<?xml"));
        assert!(page.contains("Dust &amp; Ash"));
        assert!(page.contains("<p>It <em>begins</em>.</p>"));
    }
}
