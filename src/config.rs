//! Configuration types for an analyze action.
//!
//! All behaviour is controlled through [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. The credential lives in the config and is
//! handed to the analysis client at construction time; the library itself
//! never reads it from the environment. The CLI is where `GROQ_API_KEY` is
//! looked up.

use crate::error::LabDecoderError;
use crate::pipeline::llm::AnalysisClient;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Model used by the default Groq backend.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

/// Model used for an edgequake-llm provider with no explicit model.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// OpenAI-compatible base URL of the Groq API.
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Bounds on `max_rendered_pixels`.
pub const MIN_RENDERED_PIXELS: u32 = 100;
pub const MAX_RENDERED_PIXELS: u32 = 10_000;

/// Environment variable the CLI reads the Groq key from.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Which service answers the analysis request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Backend {
    /// Groq's OpenAI-compatible chat completions endpoint (default).
    #[default]
    Groq,
    /// Any provider name understood by `edgequake_llm::ProviderFactory`
    /// (`openai`, `anthropic`, `gemini`, `ollama`, …). Those providers read
    /// their own API keys.
    Provider(String),
}

impl Backend {
    /// Parse a CLI-style provider name. `groq` (any case) is the native backend.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("groq") {
            Backend::Groq
        } else {
            Backend::Provider(name.to_lowercase())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Backend::Groq => "groq",
            Backend::Provider(name) => name,
        }
    }

    /// Vision model to use when the caller names none.
    pub fn default_model(&self) -> &'static str {
        match self {
            Backend::Groq => DEFAULT_MODEL,
            Backend::Provider(name) => match name.as_str() {
                "anthropic" => "claude-sonnet-4-20250514",
                "gemini" => "gemini-2.0-flash",
                "ollama" => "llama3.2-vision",
                _ => DEFAULT_PROVIDER_MODEL,
            },
        }
    }
}

/// Configuration for one analyze action.
///
/// # Example
/// ```rust
/// use lab_report_decoder::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .api_key("gsk_...")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.resolved_model(), "meta-llama/llama-4-scout-17b-16e-instruct");
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Secret for the Groq backend. Required when `backend` is `Groq` and no
    /// pre-built `client` is set.
    pub api_key: Option<String>,

    /// Service to call. Default: [`Backend::Groq`].
    pub backend: Backend,

    /// Model identifier. If None, [`Backend::default_model`] decides.
    pub model: Option<String>,

    /// Base URL for the Groq backend. Default: [`DEFAULT_GROQ_BASE_URL`].
    pub base_url: String,

    /// Sampling temperature. `None` leaves the provider default in place.
    pub temperature: Option<f32>,

    /// Completion token cap. `None` leaves the provider default in place.
    pub max_tokens: Option<usize>,

    /// Longest edge, in pixels, of the image sent to the model. Default: 2000.
    ///
    /// PDFs are rendered at this size; larger photos are scaled down to it.
    pub max_rendered_pixels: u32,

    /// Custom instruction. If None, uses [`crate::prompts::DEFAULT_INSTRUCTION`].
    pub instruction: Option<String>,

    /// Bound on the model call, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Bound on URL downloads, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Pre-constructed client. Takes precedence over `backend`.
    pub client: Option<Arc<dyn AnalysisClient>>,

    /// Stage events for spinners and status bars.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            backend: Backend::default(),
            model: None,
            base_url: DEFAULT_GROQ_BASE_URL.to_string(),
            temperature: None,
            max_tokens: None,
            max_rendered_pixels: 2000,
            instruction: None,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            client: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("instruction", &self.instruction.as_ref().map(|s| s.len()))
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("client", &self.client.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request: the explicit one, else the backend's default.
    pub fn resolved_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.backend.default_model())
    }

    /// The trimmed API key, treating an empty string as absent.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Builder for [`AnalysisConfig`].
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl fmt::Debug for AnalysisConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AnalysisConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.clamp(MIN_RENDERED_PIXELS, MAX_RENDERED_PIXELS);
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.instruction = Some(instruction.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn client(mut self, client: Arc<dyn AnalysisClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// A missing API key is *not* a build error: it is reported when the
    /// analyze action starts, so a UI can show the form before a key exists.
    pub fn build(self) -> Result<AnalysisConfig, LabDecoderError> {
        let c = &self.config;
        if c.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(LabDecoderError::InvalidConfig(
                "Model name must not be empty".into(),
            ));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(LabDecoderError::InvalidConfig(format!(
                "Base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(LabDecoderError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(LabDecoderError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(instruction) = &c.instruction {
            if instruction.trim().is_empty() {
                return Err(LabDecoderError::InvalidConfig(
                    "Instruction must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_groq_setup() {
        let c = AnalysisConfig::default();
        assert_eq!(c.backend, Backend::Groq);
        assert_eq!(c.model, None);
        assert_eq!(c.resolved_model(), DEFAULT_MODEL);
        assert_eq!(c.base_url, DEFAULT_GROQ_BASE_URL);
        assert_eq!(c.api_timeout_secs, 60);
        assert_eq!(c.max_rendered_pixels, 2000);
        assert!(c.temperature.is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = AnalysisConfig::builder()
            .api_key("gsk_supersecret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("supersecret"), "got: {dbg}");
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn empty_key_counts_as_missing() {
        let c = AnalysisConfig::builder().api_key("   ").build().unwrap();
        assert_eq!(c.credential(), None);
        let c = AnalysisConfig::builder().api_key(" gsk_1 ").build().unwrap();
        assert_eq!(c.credential(), Some("gsk_1"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = AnalysisConfig::builder()
            .api_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, LabDecoderError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = AnalysisConfig::builder()
            .base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ftp://example.com"));
    }

    #[test]
    fn clamps_temperature_and_pixels() {
        let c = AnalysisConfig::builder()
            .temperature(9.0)
            .max_rendered_pixels(3)
            .build()
            .unwrap();
        assert_eq!(c.temperature, Some(2.0));
        assert_eq!(c.max_rendered_pixels, 100);
    }

    #[test]
    fn provider_backend_does_not_inherit_groq_model() {
        let c = AnalysisConfig::builder()
            .backend(Backend::from_name("openai"))
            .build()
            .unwrap();
        assert_eq!(c.resolved_model(), "gpt-4.1-nano");

        let c = AnalysisConfig::builder()
            .backend(Backend::from_name("gemini"))
            .build()
            .unwrap();
        assert_eq!(c.resolved_model(), "gemini-2.0-flash");
    }

    #[test]
    fn explicit_model_wins_for_every_backend() {
        let c = AnalysisConfig::builder()
            .backend(Backend::from_name("anthropic"))
            .model("claude-haiku-4-20250514")
            .build()
            .unwrap();
        assert_eq!(c.resolved_model(), "claude-haiku-4-20250514");
    }

    #[test]
    fn rejects_blank_model() {
        let err = AnalysisConfig::builder().model("  ").build().unwrap_err();
        assert!(matches!(err, LabDecoderError::InvalidConfig(_)));
    }

    #[test]
    fn max_pixels_clamped_to_upper_bound() {
        let c = AnalysisConfig::builder()
            .max_rendered_pixels(u32::MAX)
            .build()
            .unwrap();
        assert_eq!(c.max_rendered_pixels, MAX_RENDERED_PIXELS);
        assert!(i32::try_from(c.max_rendered_pixels).is_ok());
    }

    #[test]
    fn backend_from_name() {
        assert_eq!(Backend::from_name("GROQ"), Backend::Groq);
        assert_eq!(
            Backend::from_name(" OpenAI "),
            Backend::Provider("openai".into())
        );
        assert_eq!(Backend::from_name("anthropic").name(), "anthropic");
    }
}
