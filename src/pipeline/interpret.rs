//! Response interpretation: turn the model's free text into display blocks.
//!
//! The model is instructed (see [`crate::prompts`]) to start every result
//! line with one of four tag markers and to put recommendation lists on the
//! lines that follow. Nothing guarantees it does, so this module never fails:
//! any input yields a possibly empty list of blocks.
//!
//! ## Stages
//!
//! ```text
//! raw text ──▶ invalid-doc check ──▶ sticky grouping ──▶ format ──▶ classify/filter
//!                    │
//!                    └─▶ Rejected { random friendly message }
//! ```
//!
//! Grouping is "sticky": an untagged line belongs to the most recently
//! started block. Untagged lines before the first tag have no block to join
//! and are dropped.

use crate::output::{Channel, DisplayDirective, Outcome};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Emitted by the model, alone, when the image is not a medical lab report.
pub const INVALID_DOC_MARKER: &str = "[INVALID_DOC]";

/// Separator between the explanation and the recommendation section.
pub const SECTION_SEPARATOR: &str = "||";

/// Heading of the suggestion list inside `BAD`/`WARN` results.
pub const SUGGESTION_MARKER: &str = "\u{26a0}\u{fe0f} SUGGESTION:";

/// Substrings marking an `INFO` line whose value the model could not read.
const PLACEHOLDER_HINTS: [&str; 3] = ["not found", "n/a", "unknown"];

/// Continuation lines are joined with a newline plus this indent.
const CONTINUATION_INDENT: &str = "\n  ";

const REJECTION_MESSAGES: [&str; 3] = [
    "🤖 I tried my best, but this doesn't look like a lab report.",
    "🤔 This seems unrelated to medical tests. Try uploading a real report.",
    "📉 I'm trained for lab results, not this. Please upload a proper medical report.",
];

/// Category of a response block, read from its tag marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Good,
    Bad,
    Warn,
    Info,
    /// Fallback for text without a recognised tag. Sticky grouping never
    /// produces it; it exists so hand-built blocks still route somewhere.
    Untagged,
}

impl Category {
    /// The four categories that have a tag marker.
    pub const TAGGED: [Category; 4] = [
        Category::Good,
        Category::Bad,
        Category::Warn,
        Category::Info,
    ];

    /// Literal marker text, e.g. `"[GOOD]"`.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Category::Good => Some("[GOOD]"),
            Category::Bad => Some("[BAD]"),
            Category::Warn => Some("[WARN]"),
            Category::Info => Some("[INFO]"),
            Category::Untagged => None,
        }
    }

    /// Category of a line that *starts* with a tag marker.
    pub fn from_line(line: &str) -> Option<Category> {
        Category::TAGGED
            .into_iter()
            .find(|c| c.tag().is_some_and(|tag| line.starts_with(tag)))
    }

    pub fn channel(self) -> Channel {
        match self {
            Category::Good => Channel::Success,
            Category::Bad => Channel::Error,
            Category::Warn => Channel::Warning,
            Category::Info => Channel::Info,
            Category::Untagged => Channel::Plain,
        }
    }
}

/// One tagged line plus the continuation lines that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBlock {
    pub category: Category,
    /// Trimmed, non-empty lines; the first one carries the tag.
    pub body: Vec<String>,
}

impl ResponseBlock {
    /// Start a block from its first line.
    pub fn new(first_line: impl Into<String>) -> Self {
        let first_line = first_line.into();
        let category = Category::from_line(&first_line).unwrap_or(Category::Untagged);
        Self {
            category,
            body: vec![first_line],
        }
    }

    pub fn push_continuation(&mut self, line: impl Into<String>) {
        self.body.push(line.into());
    }

    /// The block as one string: lines joined by a newline and two spaces.
    pub fn text(&self) -> String {
        self.body.join(CONTINUATION_INDENT)
    }

    /// `INFO` block whose text says the value is missing.
    ///
    /// Matches anywhere in the block, tag and continuation lines included.
    pub fn is_placeholder(&self) -> bool {
        if self.category != Category::Info {
            return false;
        }
        let lowered = self.text().to_lowercase();
        PLACEHOLDER_HINTS.iter().any(|hint| lowered.contains(hint))
    }

    /// Route the block to a channel, or `None` when the placeholder filter
    /// suppresses it.
    pub fn to_directive(&self) -> Option<DisplayDirective> {
        if self.is_placeholder() {
            debug!("Suppressing placeholder INFO block");
            return None;
        }

        let display = format_block(&self.text());
        let text = match self.category.tag() {
            Some(tag) => display
                .strip_prefix(tag)
                .unwrap_or(&display)
                .trim()
                .to_string(),
            None => display,
        };

        Some(DisplayDirective::new(self.category.channel(), text))
    }
}

/// Sticky grouping of a raw response into blocks.
pub fn group_blocks(raw: &str) -> Vec<ResponseBlock> {
    let mut blocks: Vec<ResponseBlock> = Vec::new();
    let mut dropped = 0usize;

    for line in raw.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
        if Category::from_line(line).is_some() {
            blocks.push(ResponseBlock::new(line));
        } else if let Some(last) = blocks.last_mut() {
            last.push_continuation(line);
        } else {
            dropped += 1;
        }
    }

    if dropped > 0 {
        debug!("Dropped {} untagged line(s) before the first tag", dropped);
    }
    blocks
}

/// Paragraph breaks at the section separator and before the suggestion list.
///
/// A no-op on text with neither marker.
pub fn format_block(text: &str) -> String {
    text.replace(SECTION_SEPARATOR, "\n\n")
        .replace(SUGGESTION_MARKER, &format!("\n\n{SUGGESTION_MARKER}"))
}

/// Filter and route every block, preserving order.
pub fn classify(blocks: &[ResponseBlock]) -> Vec<DisplayDirective> {
    blocks.iter().filter_map(ResponseBlock::to_directive).collect()
}

/// Whether the model flagged the upload as not being a lab report.
pub fn is_invalid_document(raw: &str) -> bool {
    raw.contains(INVALID_DOC_MARKER)
}

/// One of the fixed rejection phrasings. Purely cosmetic.
pub fn rejection_message<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    REJECTION_MESSAGES
        .choose(rng)
        .copied()
        .unwrap_or(REJECTION_MESSAGES[0])
}

/// Interpret a raw model response.
///
/// The invalid-document marker wins over everything else: when present no
/// grouping happens even if tagged lines are also present.
pub fn interpret<R: Rng + ?Sized>(raw: &str, rng: &mut R) -> Outcome {
    if is_invalid_document(raw) {
        return Outcome::Rejected {
            message: rejection_message(rng).to_string(),
        };
    }

    let blocks = group_blocks(raw);
    let directives = classify(&blocks);
    debug!(
        "Grouped {} block(s), {} shown after filtering",
        blocks.len(),
        directives.len()
    );
    Outcome::Findings { blocks: directives }
}
