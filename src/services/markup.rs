//! Parses the constrained rich-text subset the editor produces (h1-h3, p,
//! blockquote, ul/ol, strong/b, em/i, br) into a flat sequence of typed
//! blocks. Inline emphasis survives as `**`/`*` markers so each renderer
//! can re-expand it in its own way.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Block, BlockKind};

static OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(h1|h2|h3|p|blockquote|ul|ol)\b[^>]*>").expect("block tag pattern")
});
static BR_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("br pattern"));
static BOLD_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:strong|b)\b[^>]*>(.*?)</(?:strong|b)\s*>").expect("bold pattern")
});
static ITALIC_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:em|i)\b[^>]*>(.*?)</(?:em|i)\s*>").expect("italic pattern")
});
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<li\b[^>]*>(.*?)</li\s*>").expect("li pattern"));
static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("blank line pattern"));

/// Converts a markup string into an ordered block sequence. Empty or
/// whitespace-only input yields no blocks; input without recognized block
/// tags is split on blank lines into paragraphs; markup that parses to
/// nothing but still contains text falls back to one tag-stripped
/// paragraph.
pub fn parse_blocks(markup: &str) -> Vec<Block> {
    if markup.trim().is_empty() {
        return Vec::new();
    }

    if !OPEN_TAG.is_match(markup) {
        return BLANK_LINE
            .split(&inline_text(markup))
            .filter(|p| !p.trim().is_empty())
            .map(|p| Block::new(BlockKind::Paragraph, p.trim()))
            .collect();
    }

    let lower = markup.to_ascii_lowercase();
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(caps) = OPEN_TAG.captures_at(markup, pos) {
        let Some(open) = caps.get(0) else { break };
        let tag = caps[1].to_ascii_lowercase();
        let close = format!("</{tag}>");

        let Some(rel) = lower[open.end()..].find(&close) else {
            // Unclosed block tag: skip past it and keep scanning.
            pos = open.end();
            continue;
        };
        let inner = &markup[open.end()..open.end() + rel];
        pos = open.end() + rel + close.len();

        match tag.as_str() {
            "ul" | "ol" => {
                let items: Vec<String> = LIST_ITEM
                    .captures_iter(inner)
                    .filter_map(|c| c.get(1))
                    .map(|m| inline_text(m.as_str()))
                    .filter(|t| !t.is_empty())
                    .map(|t| format!("• {t}"))
                    .collect();
                if !items.is_empty() {
                    let kind = if tag == "ul" {
                        BlockKind::UnorderedList
                    } else {
                        BlockKind::OrderedList
                    };
                    blocks.push(Block::new(kind, items.join("\n")));
                }
            }
            _ => {
                let text = inline_text(inner);
                if !text.is_empty() {
                    let kind = match tag.as_str() {
                        "h1" => BlockKind::Heading1,
                        "h2" => BlockKind::Heading2,
                        "h3" => BlockKind::Heading3,
                        "blockquote" => BlockKind::Quote,
                        _ => BlockKind::Paragraph,
                    };
                    blocks.push(Block::new(kind, text));
                }
            }
        }
    }

    if blocks.is_empty() {
        let text = inline_text(markup);
        if !text.is_empty() {
            blocks.push(Block::new(BlockKind::Paragraph, text));
        }
    }

    blocks
}

/// Flattens inline markup: emphasis becomes `**`/`*` markers, `<br>`
/// becomes a newline, every other tag is dropped and entities are decoded.
fn inline_text(html: &str) -> String {
    let text = BR_TAG.replace_all(html, "\n");
    let text = BOLD_TAG.replace_all(&text, "**$1**");
    let text = ITALIC_TAG.replace_all(&text, "*$1*");
    let text = ANY_TAG.replace_all(&text, "");
    html_escape::decode_html_entities(text.as_ref())
        .trim()
        .to_string()
}

/// Removes the emphasis markers, leaving plain text.
pub fn plain_text(text: &str) -> String {
    static BOLD_MARK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold marker pattern"));
    static ITALIC_MARK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("italic marker pattern"));
    let text = BOLD_MARK.replace_all(text, "$1");
    ITALIC_MARK.replace_all(&text, "$1").into_owned()
}

/// A run of text with uniform styling, produced from marker-encoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

/// Splits marker-encoded text into styled spans by walking the `**`/`*`
/// markers as toggles.
pub fn emphasis_spans(text: &str) -> Vec<TextSpan> {
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    let mut current = String::new();
    let mut bold = false;
    let mut italic = false;
    let mut i = 0;

    let mut flush = |buf: &mut String, bold: bool, italic: bool, spans: &mut Vec<TextSpan>| {
        if !buf.is_empty() {
            spans.push(TextSpan {
                text: std::mem::take(buf),
                bold,
                italic,
            });
        }
    };

    while i < chars.len() {
        if chars[i] == '*' {
            let double = i + 1 < chars.len() && chars[i + 1] == '*';
            flush(&mut current, bold, italic, &mut spans);
            if double {
                bold = !bold;
                i += 2;
            } else {
                italic = !italic;
                i += 1;
            }
        } else {
            current.push(chars[i]);
            i += 1;
        }
    }
    flush(&mut current, bold, italic, &mut spans);

    spans
}

/// Escapes text for HTML output and re-expands the emphasis markers into
/// `<strong>`/`<em>` elements.
pub fn markers_to_html(text: &str) -> String {
    static BOLD_MARK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold marker pattern"));
    static ITALIC_MARK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("italic marker pattern"));

    let escaped = html_escape::encode_text(text).into_owned();
    let with_bold = BOLD_MARK.replace_all(&escaped, "<strong>$1</strong>");
    ITALIC_MARK
        .replace_all(&with_bold, "<em>$1</em>")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_with_bold_round_trips_to_markers() {
        let blocks = parse_blocks("<p>Hello <strong>world</strong></p>");
        assert_eq!(
            blocks,
            vec![Block::new(BlockKind::Paragraph, "Hello **world**")]
        );
    }

    #[test]
    fn headings_quotes_and_paragraphs_keep_document_order() {
        let blocks = parse_blocks(
            "<h1>Title</h1><p>First paragraph.</p><blockquote>A quote</blockquote><h2>Sub</h2>",
        );
        let kinds: Vec<BlockKind> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading1,
                BlockKind::Paragraph,
                BlockKind::Quote,
                BlockKind::Heading2
            ]
        );
    }

    #[test]
    fn lists_flatten_to_bulleted_lines() {
        let blocks = parse_blocks("<ul><li>First <em>soft</em> item</li><li>Second</li></ul>");
        assert_eq!(
            blocks,
            vec![Block::new(
                BlockKind::UnorderedList,
                "• First *soft* item\n• Second"
            )]
        );
    }

    #[test]
    fn plain_text_splits_on_blank_lines() {
        let blocks = parse_blocks("First paragraph.\n\nSecond paragraph.");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "First paragraph.");
        assert_eq!(blocks[1].text, "Second paragraph.");
    }

    #[test]
    fn empty_input_yields_no_blocks() {
        assert!(parse_blocks("").is_empty());
        assert!(parse_blocks("   \n\t ").is_empty());
    }

    #[test]
    fn malformed_markup_falls_back_to_stripped_paragraph() {
        let blocks = parse_blocks("<p>never closed <span>text inside");
        assert_eq!(
            blocks,
            vec![Block::new(BlockKind::Paragraph, "never closed text inside")]
        );
    }

    #[test]
    fn entities_are_decoded() {
        let blocks = parse_blocks("<p>Fish &amp; chips</p>");
        assert_eq!(blocks[0].text, "Fish & chips");
    }

    #[test]
    fn plain_text_strips_markers() {
        assert_eq!(plain_text("a **bold** and *soft* word"), "a bold and soft word");
    }

    #[test]
    fn emphasis_spans_split_styles() {
        let spans = emphasis_spans("plain **bold** *italic* tail");
        assert_eq!(
            spans,
            vec![
                TextSpan { text: "plain ".into(), bold: false, italic: false },
                TextSpan { text: "bold".into(), bold: true, italic: false },
                TextSpan { text: " ".into(), bold: false, italic: false },
                TextSpan { text: "italic".into(), bold: false, italic: true },
                TextSpan { text: " tail".into(), bold: false, italic: false },
            ]
        );
    }

    #[test]
    fn markers_become_html_elements() {
        assert_eq!(
            markers_to_html("a **bold** & *soft* word"),
            "a <strong>bold</strong> &amp; <em>soft</em> word"
        );
    }
}
