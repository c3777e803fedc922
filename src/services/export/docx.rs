//! DOCX rendering with docx-rs. Manuscript conventions: Georgia, justified
//! body text with a first-line indent, each chapter starting on its own
//! page. Run sizes are in half-points.

use std::io::Cursor;

use anyhow::Result;
use docx_rs::{AlignmentType, Docx, Paragraph, Run, RunFonts, SpecialIndentType};

use crate::models::{BlockKind, BookPayload, ChapterPayload};
use crate::services::markup;

const BODY_SIZE: usize = 22;
const FIRST_LINE_INDENT: i32 = 720;

fn run(text: &str, size: usize) -> Run {
    Run::new()
        .add_text(text)
        .size(size)
        .fonts(RunFonts::new().ascii("Georgia"))
}

/// Expands the emphasis markers into styled runs.
fn styled_runs(text: &str, size: usize) -> Vec<Run> {
    markup::emphasis_spans(text)
        .into_iter()
        .map(|span| {
            let mut r = run(&span.text, size);
            if span.bold {
                r = r.bold();
            }
            if span.italic {
                r = r.italic();
            }
            r
        })
        .collect()
}

fn body_paragraph(text: &str) -> Paragraph {
    let mut p = Paragraph::new()
        .align(AlignmentType::Both)
        .indent(None, Some(SpecialIndentType::FirstLine(FIRST_LINE_INDENT)), None, None);
    for r in styled_runs(text, BODY_SIZE) {
        p = p.add_run(r);
    }
    p
}

fn heading_paragraph(text: &str, size: usize) -> Paragraph {
    Paragraph::new().add_run(run(&markup::plain_text(text), size).bold())
}

fn block_paragraphs(kind: BlockKind, text: &str) -> Vec<Paragraph> {
    match kind {
        BlockKind::Heading1 => vec![heading_paragraph(text, 32)],
        BlockKind::Heading2 => vec![heading_paragraph(text, 28)],
        BlockKind::Heading3 => vec![heading_paragraph(text, 24)],
        BlockKind::Quote => {
            let mut p = Paragraph::new().indent(Some(FIRST_LINE_INDENT), None, None, None);
            for span in markup::emphasis_spans(text) {
                p = p.add_run(run(&span.text, 20).italic());
            }
            vec![p]
        }
        BlockKind::UnorderedList | BlockKind::OrderedList => text
            .lines()
            .map(|line| {
                Paragraph::new().indent(Some(FIRST_LINE_INDENT), None, None, None).add_run(run(
                    &markup::plain_text(line),
                    BODY_SIZE,
                ))
            })
            .collect(),
        BlockKind::Paragraph => vec![body_paragraph(text)],
    }
}

pub fn render(book: &BookPayload, chapters: &[&ChapterPayload]) -> Result<Vec<u8>> {
    // A5 portrait, in twentieths of a point.
    let mut doc = Docx::new().page_size(8391, 11906);

    // Cover.
    doc = doc.add_paragraph(
        Paragraph::new()
            .align(AlignmentType::Center)
            .add_run(run(&book.title, 48).bold()),
    );
    if let Some(description) = &book.description {
        doc = doc.add_paragraph(
            Paragraph::new()
                .align(AlignmentType::Center)
                .add_run(run(description, 28).italic()),
        );
    }

    for (index, chapter) in chapters.iter().enumerate() {
        doc = doc.add_paragraph(
            Paragraph::new()
                .page_break_before(true)
                .align(AlignmentType::Center)
                .add_run(run(&format!("Chapter {}", index + 1), 24).italic()),
        );
        doc = doc.add_paragraph(
            Paragraph::new()
                .align(AlignmentType::Center)
                .add_run(run(&chapter.title, 40).bold()),
        );

        for block in super::chapter_blocks(chapter) {
            for p in block_paragraphs(block.kind, &block.text) {
                doc = doc.add_paragraph(p);
            }
        }
    }

    let mut buffer = Cursor::new(Vec::new());
    doc.build().pack(&mut buffer)?;
    Ok(buffer.into_inner())
}
