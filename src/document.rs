//! Plain text to Atlassian Document Format (ADF) conversion.
//!
//! JIRA Cloud only accepts rich text fields such as the description as ADF.
//! The form collects plain text, so this module maps it onto the smallest
//! useful subset: paragraphs of literal text with hard line breaks.

use serde::{Deserialize, Serialize};

/// An ADF root document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Always "doc".
    #[serde(rename = "type")]
    pub doc_type: String,
    /// The ADF version, always 1.
    pub version: u32,
    /// Top-level blocks.
    pub content: Vec<Block>,
}

/// A top-level ADF block node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Block {
    /// A paragraph of inline nodes.
    Paragraph {
        /// The paragraph's inline content.
        content: Vec<Inline>,
    },
}

/// An inline ADF node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inline {
    /// A run of literal text.
    Text {
        /// The text.
        text: String,
    },
    /// An explicit line break inside a paragraph.
    HardBreak,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            doc_type: "doc".to_string(),
            version: 1,
            content: Vec::new(),
        }
    }
}

impl Document {
    /// The paragraph blocks of the document.
    pub fn paragraphs(&self) -> impl Iterator<Item = &[Inline]> {
        self.content.iter().map(|block| match block {
            Block::Paragraph { content } => content.as_slice(),
        })
    }

    /// Flatten the document back to plain text.
    ///
    /// Paragraphs are separated by a blank line and hard breaks become `\n`,
    /// so `to_document(text).to_plain_text()` gives back normalized `text`.
    pub fn to_plain_text(&self) -> String {
        self.paragraphs()
            .map(|inlines| {
                inlines
                    .iter()
                    .map(|node| match node {
                        Inline::Text { text } => text.as_str(),
                        Inline::HardBreak => "\n",
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Convert plain text into an ADF document.
///
/// Blank (empty or whitespace-only) lines separate paragraphs. Consecutive
/// non-blank lines stay in one paragraph joined by hard breaks. Empty input
/// yields a document without blocks.
pub fn to_document(plain_text: &str) -> Document {
    let normalized = plain_text.replace("\r\n", "\n");

    let mut content = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.split('\n') {
        if line.trim().is_empty() {
            if !current.is_empty() {
                content.push(paragraph(&current));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        content.push(paragraph(&current));
    }

    Document {
        content,
        ..Document::default()
    }
}

fn paragraph(lines: &[&str]) -> Block {
    let mut content = Vec::with_capacity(lines.len() * 2);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            content.push(Inline::HardBreak);
        }
        content.push(Inline::Text {
            text: (*line).to_string(),
        });
    }
    Block::Paragraph { content }
}
