//! PDF rendering on the builtin Times faces. A5 portrait, manual top-down
//! cursor with page-break-on-overflow, estimated greedy wrapping and footer
//! page numbers that skip the cover.

use anyhow::Result;
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerIndex,
    PdfPageIndex,
};

use crate::models::{BlockKind, BookPayload, ChapterPayload};
use crate::services::markup;

const PAGE_WIDTH_MM: f32 = 148.0;
const PAGE_HEIGHT_MM: f32 = 210.0;
const MARGIN_MM: f32 = 20.0;
const BOTTOM_RESERVE_MM: f32 = 25.0;
const TEXT_WIDTH_MM: f32 = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
const PT_TO_MM: f32 = 0.3528;
const FOOTER_SIZE_PT: f32 = 9.0;

/// A word with its inline style, the unit the wrapper works on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StyledWord {
    text: String,
    bold: bool,
    italic: bool,
}

impl StyledWord {
    fn width_chars(&self) -> usize {
        self.text.chars().count()
    }
}

fn styled_words(text: &str, base_bold: bool, base_italic: bool) -> Vec<StyledWord> {
    markup::emphasis_spans(text)
        .into_iter()
        .flat_map(|span| {
            let bold = span.bold || base_bold;
            let italic = span.italic || base_italic;
            span.text
                .split_whitespace()
                .map(|w| StyledWord {
                    text: w.to_string(),
                    bold,
                    italic,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Greedy wrap against an estimated average glyph width. Times is
/// proportional, so this errs on the narrow side to avoid overrunning the
/// right margin.
fn wrap(words: &[StyledWord], size_pt: f32, width_mm: f32) -> Vec<Vec<StyledWord>> {
    let glyph_mm = size_pt * 0.5 * PT_TO_MM;
    let max_chars = ((width_mm / glyph_mm) as usize).max(8);

    let mut lines: Vec<Vec<StyledWord>> = Vec::new();
    let mut current: Vec<StyledWord> = Vec::new();
    let mut current_chars = 0usize;
    for word in words {
        let needed = if current.is_empty() {
            word.width_chars()
        } else {
            current_chars + 1 + word.width_chars()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if !current.is_empty() {
            current_chars += 1;
        }
        current_chars += word.width_chars();
        current.push(word.clone());
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

struct PdfWriter {
    doc: PdfDocumentReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    bold_italic: IndirectFontRef,
    page: PdfPageIndex,
    layer: PdfLayerIndex,
    // Distance from the top edge to the next baseline, in mm.
    cursor: f32,
    // 0 on the cover; chapter pages count from 1 and carry a footer.
    page_number: usize,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "text");
        let regular = doc.add_builtin_font(BuiltinFont::TimesRoman)?;
        let bold = doc.add_builtin_font(BuiltinFont::TimesBold)?;
        let italic = doc.add_builtin_font(BuiltinFont::TimesItalic)?;
        let bold_italic = doc.add_builtin_font(BuiltinFont::TimesBoldItalic)?;
        Ok(PdfWriter {
            doc,
            regular,
            bold,
            italic,
            bold_italic,
            page,
            layer,
            cursor: MARGIN_MM,
            page_number: 0,
        })
    }

    fn font_ref(&self, bold: bool, italic: bool) -> &IndirectFontRef {
        match (bold, italic) {
            (true, true) => &self.bold_italic,
            (true, false) => &self.bold,
            (false, true) => &self.italic,
            (false, false) => &self.regular,
        }
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "text");
        self.page = page;
        self.layer = layer;
        self.cursor = MARGIN_MM;
        self.page_number += 1;
        self.draw_footer();
    }

    fn draw_footer(&self) {
        let label = self.page_number.to_string();
        let width_mm = label.chars().count() as f32 * FOOTER_SIZE_PT * 0.5 * PT_TO_MM;
        let layer = self.doc.get_page(self.page).get_layer(self.layer);
        layer.use_text(
            label,
            FOOTER_SIZE_PT,
            Mm((PAGE_WIDTH_MM - width_mm) / 2.0),
            Mm(12.0),
            &self.regular,
        );
    }

    fn ensure_room(&mut self, height_mm: f32) {
        if self.cursor + height_mm > PAGE_HEIGHT_MM - BOTTOM_RESERVE_MM {
            self.new_page();
        }
    }

    fn advance(&mut self, height_mm: f32) {
        self.cursor += height_mm;
    }

    fn line(&mut self, words: &[StyledWord], size_pt: f32, indent_mm: f32) {
        let line_height = size_pt * 1.4 * PT_TO_MM;
        self.ensure_room(line_height);
        self.advance(line_height);

        let glyph_mm = size_pt * 0.5 * PT_TO_MM;
        let y = Mm(PAGE_HEIGHT_MM - self.cursor);
        let mut x = MARGIN_MM + indent_mm;
        let layer = self.doc.get_page(self.page).get_layer(self.layer);

        // Draw consecutive same-style words as one run.
        let mut i = 0;
        while i < words.len() {
            let (bold, italic) = (words[i].bold, words[i].italic);
            let mut run = String::new();
            while i < words.len() && words[i].bold == bold && words[i].italic == italic {
                if !run.is_empty() {
                    run.push(' ');
                }
                run.push_str(&words[i].text);
                i += 1;
            }
            let run_chars = run.chars().count();
            layer.use_text(run, size_pt, Mm(x), y, self.font_ref(bold, italic));
            x += (run_chars + 1) as f32 * glyph_mm;
        }
    }

    fn text(&mut self, text: &str, size_pt: f32, bold: bool, italic: bool, indent_mm: f32) {
        for paragraph_line in text.lines() {
            if paragraph_line.trim().is_empty() {
                continue;
            }
            let words = styled_words(paragraph_line, bold, italic);
            for line in wrap(&words, size_pt, TEXT_WIDTH_MM - indent_mm) {
                self.line(&line, size_pt, indent_mm);
            }
        }
    }

    fn finish(self) -> Result<Vec<u8>> {
        Ok(self.doc.save_to_bytes()?)
    }
}

pub fn render(book: &BookPayload, chapters: &[&ChapterPayload]) -> Result<Vec<u8>> {
    let mut writer = PdfWriter::new(&book.title)?;

    // Cover page; no footer here.
    writer.advance(60.0);
    writer.text(&book.title, 28.0, true, false, 0.0);
    if let Some(description) = &book.description {
        writer.advance(10.0);
        writer.text(description, 13.0, false, true, 0.0);
    }

    for (index, chapter) in chapters.iter().enumerate() {
        writer.new_page();
        writer.advance(15.0);
        writer.text(&format!("Chapter {}", index + 1), 11.0, false, true, 0.0);
        writer.advance(3.0);
        writer.text(&chapter.title, 20.0, true, false, 0.0);
        writer.advance(8.0);

        for block in super::chapter_blocks(chapter) {
            let (size, bold, italic, indent, gap_before) = match block.kind {
                BlockKind::Heading1 => (16.0, true, false, 0.0, 6.0),
                BlockKind::Heading2 => (14.0, true, false, 0.0, 5.0),
                BlockKind::Heading3 => (12.0, true, false, 0.0, 4.0),
                BlockKind::Quote => (10.0, false, true, 8.0, 3.0),
                BlockKind::UnorderedList | BlockKind::OrderedList => {
                    (11.0, false, false, 5.0, 3.0)
                }
                BlockKind::Paragraph => (11.0, false, false, 0.0, 3.0),
            };
            writer.advance(gap_before);
            writer.text(&block.text, size, bold, italic, indent);
        }
    }

    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_words(text: &str) -> Vec<StyledWord> {
        styled_words(text, false, false)
    }

    #[test]
    fn wrap_splits_long_lines_and_keeps_words_intact() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let lines = wrap(&plain_words(text), 11.0, 60.0);
        assert!(lines.len() > 1);
        let rejoined: Vec<String> = lines
            .iter()
            .flat_map(|l| l.iter().map(|w| w.text.clone()))
            .collect();
        assert_eq!(rejoined.join(" "), text);
    }

    #[test]
    fn wrap_keeps_short_text_on_one_line() {
        let lines = wrap(&plain_words("short text"), 11.0, 108.0);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn markers_set_word_styles() {
        let words = styled_words("plain **bold words** *soft*", false, false);
        assert!(!words[0].bold && !words[0].italic);
        assert!(words[1].bold && words[2].bold);
        assert!(words[3].italic && !words[3].bold);
    }

    #[test]
    fn base_style_combines_with_markers() {
        let words = styled_words("a **b**", false, true);
        assert!(words[0].italic && !words[0].bold);
        assert!(words[1].italic && words[1].bold);
    }
}
