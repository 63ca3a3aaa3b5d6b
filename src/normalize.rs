//! Turns an [`OcrDocument`] into the two views the user can download.
//!
//! The plain-text view is deliberately lossy: heading markers and image lines
//! are removed, every other piece of markdown syntax is kept as-is.

use crate::ocr::{EmbeddedImage, OcrDocument, OcrPage};
use std::collections::HashMap;

/// Text and markdown derived from the latest OCR request of a chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedResult {
    pub plain_text: String,
    pub markdown: String,
}

pub fn normalize(document: &OcrDocument) -> NormalizedResult {
    NormalizedResult {
        plain_text: plain_text(document),
        markdown: combined_markdown(document),
    }
}

/// Flattened transcript; each page ends with a blank line.
pub fn plain_text(document: &OcrDocument) -> String {
    let mut text = String::new();
    for page in &document.pages {
        match page {
            OcrPage::Paragraphs(paragraphs) => {
                for paragraph in paragraphs {
                    text.push_str(paragraph);
                    text.push('\n');
                }
            }
            OcrPage::Markdown(markdown) | OcrPage::Illustrated { markdown, .. } => {
                text.push_str(&strip_markdown(markdown));
                text.push('\n');
            }
            OcrPage::Blank => {}
        }
        text.push('\n');
    }
    text
}

/// Drop heading markers and image lines.
fn strip_markdown(markdown: &str) -> String {
    markdown
        .split('\n')
        .map(strip_heading)
        .filter(|line| !line.starts_with("![") && !line.starts_with("<img"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_heading(line: &str) -> &str {
    ["### ", "## ", "# "]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .unwrap_or(line)
}

/// All pages as one markdown document with images inlined.
pub fn combined_markdown(document: &OcrDocument) -> String {
    document
        .pages
        .iter()
        .filter_map(|page| match page {
            OcrPage::Illustrated { markdown, images } => Some(inline_images(markdown, images)),
            OcrPage::Markdown(markdown) => Some(markdown.clone()),
            OcrPage::Paragraphs(paragraphs) => Some(paragraphs.join("\n\n")),
            OcrPage::Blank => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Replace `![id](id)` with `![id](<base64 payload>)` for every known image.
pub fn inline_images(markdown: &str, images: &[EmbeddedImage]) -> String {
    let payloads: HashMap<&str, &str> = images
        .iter()
        .map(|img| (img.id.as_str(), img.image_base64.as_str()))
        .collect();

    payloads.iter().fold(markdown.to_string(), |md, (id, payload)| {
        md.replace(&format!("![{id}]({id})"), &format!("![{id}]({payload})"))
    })
}
