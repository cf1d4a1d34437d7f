//! Error type for the lab-report-decoder library.
//!
//! Every failure of an analyze action surfaces as a single
//! [`LabDecoderError`]. A document the model does not recognise as a lab
//! report is *not* an error: it is a successful
//! [`crate::output::Outcome::Rejected`].
//!
//! Variants fall into four groups, exposed through [`LabDecoderError::kind`]
//! so a caller can decide how to present them without matching every variant:
//!
//! * [`ErrorKind::Configuration`]: missing credential, bad settings. Nothing
//!   was sent anywhere.
//! * [`ErrorKind::Input`]: the upload could not be read, is the wrong type,
//!   or could not be turned into an image.
//! * [`ErrorKind::Transport`]: the model endpoint failed, timed out, or
//!   answered with something unparseable.
//! * [`ErrorKind::Internal`]: a bug or runtime failure on our side.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the lab-report-decoder library.
#[derive(Debug, Error)]
pub enum LabDecoderError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The analysis backend needs a secret that was not provided.
    #[error("API key missing!\nSet {var} or pass --api-key.")]
    MissingCredential { var: &'static str },

    /// A named edgequake-llm provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Report file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The upload's extension is not one of jpg, jpeg, png, pdf.
    #[error("Unsupported file type '{name}'\nUpload a PDF, JPG, JPEG or PNG lab report.")]
    UnsupportedFileType { name: String },

    /// The bytes do not match what the extension promises.
    #[error("'{name}' does not look like a valid {expected} file")]
    ContentMismatch { name: String, expected: &'static str },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF is password protected; there is no way to supply a password.
    #[error("PDF '{name}' is encrypted. Upload an unprotected copy of the report.")]
    EncryptedPdf { name: String },

    /// PDF parsed fine but has no pages to render.
    #[error("PDF '{name}' has no pages")]
    EmptyPdf { name: String },

    /// pdfium-render returned an error while drawing the first page.
    #[error("Rasterisation failed for '{name}': {detail}")]
    RasterisationFailed { name: String, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF uploads need the pdfium shared library.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium, or\n\
  • place libpdfium next to the binary, or\n\
  • upload a JPG/PNG of the report instead.\n"
    )]
    PdfiumBindingFailed(String),

    /// An image upload could not be decoded.
    #[error("Could not read image '{name}': {detail}")]
    ImageDecodeFailed { name: String, detail: String },

    /// The acquired image could not be serialised for transmission.
    #[error("Image encoding failed: {0}")]
    EncodeFailed(String),

    // ── Transport / remote errors ─────────────────────────────────────────
    /// The request never got a response (DNS, TLS, connection reset, …).
    #[error("Could not reach the analysis service: {0}")]
    Transport(String),

    /// The model API returned a non-retryable error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// Model API returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'{}", retry_hint(*retry_after_secs))]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Model API call exceeded `api_timeout_secs`.
    #[error("Analysis timed out after {secs}s\nIncrease --api-timeout or try again.")]
    ApiTimeout { secs: u64 },

    /// Model API returned an authentication error (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The API answered 2xx but the body had no usable text.
    #[error("Malformed response from the analysis service: {0}")]
    MalformedResponse(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_hint(secs: Option<u64>) -> String {
    match secs {
        Some(s) => format!(" (retry after {s}s)"),
        None => String::new(),
    }
}

/// Coarse classification of a [`LabDecoderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Input,
    Transport,
    Internal,
}

impl LabDecoderError {
    /// Which of the four error groups this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use LabDecoderError::*;
        match self {
            MissingCredential { .. } | ProviderNotConfigured { .. } | InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            FileNotFound { .. }
            | PermissionDenied { .. }
            | UnsupportedFileType { .. }
            | ContentMismatch { .. }
            | DownloadFailed { .. }
            | DownloadTimeout { .. }
            | CorruptPdf { .. }
            | EncryptedPdf { .. }
            | EmptyPdf { .. }
            | RasterisationFailed { .. }
            | PdfiumBindingFailed(_)
            | ImageDecodeFailed { .. }
            | EncodeFailed(_) => ErrorKind::Input,
            Transport(_)
            | LlmApiError { .. }
            | RateLimitExceeded { .. }
            | ApiTimeout { .. }
            | AuthError { .. }
            | MalformedResponse(_) => ErrorKind::Transport,
            Internal(_) => ErrorKind::Internal,
        }
    }
}
