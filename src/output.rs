//! Output types produced by an analyze action.

use serde::{Deserialize, Serialize};

/// Presentation channel a block is routed to.
///
/// The renderer picks a colour and glyph per channel; the channel itself is
/// a pure function of the block's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Success,
    Error,
    Warning,
    Info,
    Plain,
}

/// A display-ready block: the text to show and where to show it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayDirective {
    pub channel: Channel,
    pub text: String,
}

impl DisplayDirective {
    pub fn new(channel: Channel, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: text.into(),
        }
    }
}

/// What the model's response means for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The upload is not a lab report. Nothing was parsed.
    Rejected { message: String },
    /// Classified blocks in response order. May be empty.
    Findings { blocks: Vec<DisplayDirective> },
}

impl Outcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected { .. })
    }

    /// The classified blocks, or an empty slice for a rejection.
    pub fn blocks(&self) -> &[DisplayDirective] {
        match self {
            Outcome::Rejected { .. } => &[],
            Outcome::Findings { blocks } => blocks,
        }
    }
}

/// Timing and usage numbers for one analyze action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Prompt tokens as reported by the backend (0 when unreported).
    pub input_tokens: usize,
    /// Completion tokens as reported by the backend (0 when unreported).
    pub output_tokens: usize,
    /// Time spent reading the upload and producing the raster image.
    pub acquire_duration_ms: u64,
    /// Time spent waiting on the model.
    pub model_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Success payload of [`crate::analyze`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// File name of the upload (last URL segment for downloads).
    pub source: String,
    pub outcome: Outcome,
    /// The model's unmodified text, kept for `--raw` and debugging.
    pub raw_response: String,
    pub stats: AnalysisStats,
}
