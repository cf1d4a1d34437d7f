//! Analyze-action entry points.
//!
//! One action is one upload, one image, one model call:
//!
//! ```text
//! credential ─▶ read ─▶ acquire (pdfium / decode) ─▶ encode ─▶ model ─▶ interpret
//! ```
//!
//! The client is resolved first so a missing API key is reported before the
//! upload is even read.

use crate::config::{AnalysisConfig, Backend};
use crate::error::LabDecoderError;
use crate::output::{Analysis, AnalysisStats, Outcome};
use crate::pipeline::input::{self, Upload};
use crate::pipeline::llm::{AnalysisClient, GroqClient, ProviderClient};
use crate::pipeline::{encode, interpret, render};
use crate::progress::Stage;
use crate::prompts::DEFAULT_INSTRUCTION;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Analyze a lab report given as a local path or an HTTP(S) URL.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(Analysis)` when the model answered. A document the model did not
/// recognise as a lab report is still `Ok`, with [`Outcome::Rejected`].
///
/// # Errors
/// - `MissingCredential` when the Groq backend has no API key (checked first)
/// - unsupported or unreadable uploads, corrupt PDFs
/// - transport, HTTP status and timeout failures of the model call
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<Analysis, LabDecoderError> {
    let result = analyze_input(input_str.as_ref(), config).await;
    report(config, result)
}

/// Analyze an upload already held in memory, e.g. from a web form.
///
/// `name` must carry the file extension; it decides how `bytes` are read.
pub async fn analyze_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    config: &AnalysisConfig,
) -> Result<Analysis, LabDecoderError> {
    let result = analyze_buffer(name.into(), bytes, config).await;
    report(config, result)
}

/// Analyze a validated [`Upload`].
pub async fn analyze_upload(
    upload: &Upload,
    config: &AnalysisConfig,
) -> Result<Analysis, LabDecoderError> {
    let total_start = Instant::now();
    let result = match resolve_client(config) {
        Ok(client) => run(upload, client.as_ref(), config, total_start).await,
        Err(e) => Err(e),
    };
    report(config, result)
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<Analysis, LabDecoderError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| LabDecoderError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input_str, config))
}

/// Pick the client that will answer, from most to least specific.
///
/// 1. A pre-built `config.client` is used as-is (tests, custom middleware).
/// 2. [`Backend::Groq`] builds a [`GroqClient`] from `config.api_key`.
/// 3. [`Backend::Provider`] goes through `edgequake_llm::ProviderFactory`.
pub fn resolve_client(config: &AnalysisConfig) -> Result<Arc<dyn AnalysisClient>, LabDecoderError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }
    match &config.backend {
        Backend::Groq => Ok(Arc::new(GroqClient::new(config)?)),
        Backend::Provider(name) => Ok(Arc::new(ProviderClient::from_factory(name, config)?)),
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn analyze_input(input_str: &str, config: &AnalysisConfig) -> Result<Analysis, LabDecoderError> {
    let total_start = Instant::now();
    info!("Starting analysis: {}", input_str);

    // ── Step 1: Credential ───────────────────────────────────────────────
    let client = resolve_client(config)?;

    // ── Step 2: Read ─────────────────────────────────────────────────────
    notify(config, Stage::Reading);
    let upload = input::resolve_input(input_str, config.download_timeout_secs).await?;

    run(&upload, client.as_ref(), config, total_start).await
}

async fn analyze_buffer(
    name: String,
    bytes: Vec<u8>,
    config: &AnalysisConfig,
) -> Result<Analysis, LabDecoderError> {
    let total_start = Instant::now();
    let client = resolve_client(config)?;
    notify(config, Stage::Reading);
    let upload = Upload::from_bytes(name, bytes)?;
    run(&upload, client.as_ref(), config, total_start).await
}

async fn run(
    upload: &Upload,
    client: &dyn AnalysisClient,
    config: &AnalysisConfig,
    total_start: Instant,
) -> Result<Analysis, LabDecoderError> {
    // ── Step 3: Acquire image ────────────────────────────────────────────
    if upload.is_pdf() {
        notify(config, Stage::ConvertingPdf);
    }
    let image = render::acquire_image(upload, config.max_rendered_pixels).await?;

    // ── Step 4: Encode ───────────────────────────────────────────────────
    notify(config, Stage::Encoding);
    let encoded = encode::encode_image(&image)
        .map_err(|e| LabDecoderError::EncodeFailed(e.to_string()))?;
    let acquire_duration_ms = elapsed_ms(total_start);
    debug!("Acquired '{}' in {}ms", upload.name, acquire_duration_ms);

    // ── Step 5: Model call ───────────────────────────────────────────────
    notify(config, Stage::Analyzing);
    let instruction = config.instruction.as_deref().unwrap_or(DEFAULT_INSTRUCTION);
    info!(
        "Sending '{}' to {} (model {})",
        upload.name,
        client.name(),
        config.resolved_model()
    );
    let model_start = Instant::now();
    let reply = client.analyze_image(instruction, &encoded).await?;
    let model_duration_ms = elapsed_ms(model_start);

    // ── Step 6: Interpret ────────────────────────────────────────────────
    notify(config, Stage::Interpreting);
    let outcome = interpret::interpret(&reply.content, &mut rand::thread_rng());
    match &outcome {
        Outcome::Rejected { .. } => info!("Model did not recognise '{}' as a lab report", upload.name),
        Outcome::Findings { blocks } if blocks.is_empty() => {
            warn!("Model response for '{}' produced no displayable blocks", upload.name)
        }
        Outcome::Findings { blocks } => info!("Analysis complete: {} blocks", blocks.len()),
    }

    let stats = AnalysisStats {
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
        acquire_duration_ms,
        model_duration_ms,
        total_duration_ms: elapsed_ms(total_start),
    };

    Ok(Analysis {
        source: upload.name.clone(),
        outcome,
        raw_response: reply.content,
        stats,
    })
}

fn notify(config: &AnalysisConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(stage);
    }
}

/// Fire the terminal progress event and hand the result back.
fn report(
    config: &AnalysisConfig,
    result: Result<Analysis, LabDecoderError>,
) -> Result<Analysis, LabDecoderError> {
    if let Some(ref cb) = config.progress_callback {
        match &result {
            Ok(analysis) => cb.on_complete(
                analysis.outcome.blocks().len(),
                analysis.outcome.is_rejected(),
            ),
            Err(e) => cb.on_error(&e.to_string()),
        }
    }
    result
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groq_without_key_is_missing_credential() {
        let config = AnalysisConfig::default();
        let err = resolve_client(&config).err().expect("should fail");
        assert!(matches!(err, LabDecoderError::MissingCredential { .. }));
    }

    #[test]
    fn groq_with_key_resolves() {
        let config = AnalysisConfig::builder().api_key("gsk_test").build().unwrap();
        let client = resolve_client(&config).unwrap();
        assert_eq!(client.name(), "groq");
    }

    #[tokio::test]
    async fn credential_checked_before_reading() {
        // The file does not exist; the credential error must win.
        let config = AnalysisConfig::default();
        let err = analyze("/no/such/dir/report.pdf", &config).await.unwrap_err();
        assert!(matches!(err, LabDecoderError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn unsupported_bytes_rejected_after_credential() {
        let config = AnalysisConfig::builder().api_key("gsk_test").build().unwrap();
        let err = analyze_bytes("notes.txt", b"hello".to_vec(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, LabDecoderError::UnsupportedFileType { .. }));
    }
}
