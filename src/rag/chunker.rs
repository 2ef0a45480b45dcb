// src/rag/chunker.rs — File-type-aware document chunking
//
// Markdown goes through pulldown-cmark, docx through the zip container's
// document.xml, everything else is treated as plain text. The split
// prefers paragraph and sentence boundaries near the size budget.

use pulldown_cmark::{Event, Parser, TagEnd};
use std::io::Read;
use std::path::Path;

use crate::infra::errors::SkiffError;

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// Byte offset of the chunk in the extracted text.
    pub offset: usize,
}

/// Extract text from a file and split it into chunks of at most
/// `budget` characters.
pub fn chunk_file(path: &Path, budget: usize) -> Result<Vec<Chunk>, SkiffError> {
    let text = extract_text(path)?;
    Ok(split_text(&text, budget))
}

pub fn extract_text(path: &Path) -> Result<String, SkiffError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "md" | "markdown" => {
            let raw = std::fs::read_to_string(path)?;
            Ok(markdown_text(&raw))
        }
        "docx" => docx_text(path),
        _ => Ok(std::fs::read_to_string(path)?),
    }
}

/// Flatten markdown into plain text, keeping paragraph structure so the
/// splitter can break at blank lines.
fn markdown_text(md: &str) -> String {
    let mut out = String::new();
    for event in Parser::new(md) {
        match event {
            Event::Text(t) => out.push_str(&t),
            Event::Code(c) => out.push_str(&c),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock) => out.push_str("\n\n"),
            _ => {}
        }
    }
    out
}

/// Pull the body text out of a docx container (word/document.xml),
/// mapping paragraph ends to newlines and dropping all other markup.
fn docx_text(path: &Path) -> Result<String, SkiffError> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| SkiffError::InvalidRequest(format!("not a docx container: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| SkiffError::InvalidRequest(format!("docx missing document.xml: {e}")))?
        .read_to_string(&mut xml)?;

    let mut out = String::new();
    let mut rest = xml.as_str();
    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        let Some(gt_rel) = rest[lt..].find('>') else {
            break;
        };
        let tag = &rest[lt + 1..lt + gt_rel];
        if tag == "/w:p" {
            out.push('\n');
        }
        rest = &rest[lt + gt_rel + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Split text into chunks of at most `budget` bytes, snapped to UTF-8
/// character boundaries, breaking at the best natural boundary found
/// near the limit.
pub fn split_text(text: &str, budget: usize) -> Vec<Chunk> {
    let budget = budget.max(1);
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= budget {
        return vec![Chunk {
            text: text.to_string(),
            offset: 0,
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let raw_end = (start + budget).min(text.len());
        let end = snap_to_char_boundary(text, raw_end);
        let actual_end = if end < text.len() {
            find_break_point(text, start, end)
        } else {
            end
        };

        let piece = text[start..actual_end].trim();
        if !piece.is_empty() {
            chunks.push(Chunk {
                text: piece.to_string(),
                offset: start,
            });
        }

        if actual_end <= start {
            // No progress possible; hard-cut to avoid looping.
            start = end.max(start + 1).min(text.len());
        } else {
            start = actual_end;
        }
    }

    chunks
}

fn snap_to_char_boundary(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Search backwards from the budget limit for a natural boundary:
/// paragraph break, sentence end, line break, then word break.
fn find_break_point(text: &str, start: usize, preferred_end: usize) -> usize {
    let raw_search_start = preferred_end.saturating_sub(200).max(start);
    let search_start = snap_to_char_boundary(text, raw_search_start);
    let safe_end = snap_to_char_boundary(text, preferred_end);

    if search_start >= safe_end {
        return safe_end;
    }

    let region = &text[search_start..safe_end];

    if let Some(pos) = region.rfind("\n\n") {
        return search_start + pos + 2;
    }
    if let Some(pos) = region.rfind(". ") {
        return search_start + pos + 2;
    }
    if let Some(pos) = region.rfind(".\n") {
        return search_start + pos + 2;
    }
    if let Some(pos) = region.rfind('。') {
        return search_start + pos + '。'.len_utf8();
    }
    if let Some(pos) = region.rfind('\n') {
        return search_start + pos + 1;
    }
    if let Some(pos) = region.rfind(' ') {
        return search_start + pos + 1;
    }
    safe_end
}
