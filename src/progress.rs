//! Progress-callback trait for analyze-action events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to learn which
//! stage the action is in. The CLI uses it to drive a spinner; a GUI could
//! forward the same events to a status bar.
//!
//! # Example
//!
//! ```rust
//! use lab_report_decoder::{AnalysisConfig, AnalysisProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl AnalysisProgressCallback for Printer {
//!     fn on_stage(&self, stage: Stage) {
//!         eprintln!("{}…", stage.label());
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .api_key("gsk_test")
//!     .progress_callback(Arc::new(Printer) as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

/// Stages of one analyze action, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the local file or downloading the URL.
    Reading,
    /// Rendering page 1 of a PDF. Skipped for image uploads.
    ConvertingPdf,
    /// Colour normalisation and JPEG/base64 encoding.
    Encoding,
    /// Waiting on the model.
    Analyzing,
    /// Grouping and classifying the response.
    Interpreting,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Reading => "Reading upload",
            Stage::ConvertingPdf => "Converting PDF",
            Stage::Encoding => "Preparing image",
            Stage::Analyzing => "Analyzing report",
            Stage::Interpreting => "Interpreting results",
        }
    }
}

/// Called by [`crate::analyze`] as the action progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once when the action produced an outcome.
    ///
    /// # Arguments
    /// * `shown_blocks`: blocks left after filtering (0 for a rejection)
    /// * `rejected`: the model did not recognise a lab report
    fn on_complete(&self, shown_blocks: usize, rejected: bool) {
        let _ = (shown_blocks, rejected);
    }

    /// Called once when the action failed.
    fn on_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

const LOADING_MESSAGES: [&str; 7] = [
    "Sterilizing the AI instruments... 🧼",
    "Deciphering doctor handwriting... ✍️",
    "Paging Dr. Llama... 📟",
    "Running the centrifuge... 🌀",
    "Checking vital signs... 💓",
    "Consulting the medical journals... 📚",
    "Analyzing simpler terms... 🧠",
];

/// A light-hearted "please wait" line for spinners. Purely cosmetic.
pub fn loading_message<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    LOADING_MESSAGES
        .choose(rng)
        .copied()
        .unwrap_or(LOADING_MESSAGES[0])
}
