//! # lab-report-decoder
//!
//! Explain medical lab reports in plain language using a vision model.
//!
//! ## Why this crate?
//!
//! Lab reports arrive as phone photos, scans and PDFs with every lab's own
//! layout. Rather than parsing each layout, this crate hands one image of the
//! report to a multimodal model with a strict tagging instruction, then turns
//! the tagged answer into colour-coded blocks: normal, abnormal, borderline
//! and informational.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (jpg / png / pdf, path or URL)
//!  │
//!  ├─ 1. Input      check extension + magic bytes, read or download
//!  ├─ 2. Render     PDF page 1 via pdfium (spawn_blocking) or decode image
//!  ├─ 3. Encode     RGB → JPEG → base64 data URL
//!  ├─ 4. Model      one call to Groq (llama-4-scout) or an edgequake-llm provider
//!  └─ 5. Interpret  [INVALID_DOC] check, sticky grouping, placeholder filter
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lab_report_decoder::{analyze, display, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalysisConfig::builder()
//!         .api_key(std::env::var("GROQ_API_KEY")?)
//!         .build()?;
//!     let analysis = analyze("cbc.pdf", &config).await?;
//!     println!("{}", display::render_outcome(&analysis.outcome, true));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `lab-decoder` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! ## Not medical advice
//!
//! Output is for information only. The default instruction asks the model to
//! flag values against the reference ranges printed on the report; it does
//! not replace a clinician.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod display;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze, analyze_bytes, analyze_sync, analyze_upload, resolve_client};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, Backend};
pub use error::{ErrorKind, LabDecoderError};
pub use output::{Analysis, AnalysisStats, Channel, DisplayDirective, Outcome};
pub use pipeline::input::Upload;
pub use pipeline::llm::{AnalysisClient, GroqClient, ModelReply, ProviderClient};
pub use progress::{
    loading_message, AnalysisProgressCallback, NoopProgressCallback, ProgressCallback, Stage,
};
