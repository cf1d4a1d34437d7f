//! Model interaction: send the report image and instruction, get text back.
//!
//! [`AnalysisClient`] is the seam between the pipeline and whatever serves
//! the model. Two implementations ship:
//!
//! * [`GroqClient`]: talks to Groq's OpenAI-compatible chat completions
//!   endpoint directly with `reqwest`. The API key comes from
//!   [`AnalysisConfig`] and nowhere else.
//! * [`ProviderClient`]: wraps any `edgequake_llm::LLMProvider`, which
//!   opens up OpenAI, Anthropic, Gemini, Ollama and friends.
//!
//! Both bound the call by `api_timeout_secs` and make exactly one attempt.

use crate::config::{AnalysisConfig, API_KEY_ENV};
use crate::error::LabDecoderError;
use crate::pipeline::encode::EncodedImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Text returned by the model plus the usage numbers the backend reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A service that can read a report image.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Short backend name for logs and error messages.
    fn name(&self) -> &str;

    /// Send one instruction and one image; return the model's text.
    async fn analyze_image(
        &self,
        instruction: &str,
        image: &EncodedImage,
    ) -> Result<ModelReply, LabDecoderError>;
}

// ── Groq ─────────────────────────────────────────────────────────────────

/// Client for Groq's OpenAI-compatible `/chat/completions` endpoint.
pub struct GroqClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
    timeout_secs: u64,
}

impl GroqClient {
    /// Build a client from the config.
    ///
    /// Fails with [`LabDecoderError::MissingCredential`] when no API key is
    /// set; nothing is sent in that case.
    pub fn new(config: &AnalysisConfig) -> Result<Self, LabDecoderError> {
        let api_key = config
            .credential()
            .ok_or(LabDecoderError::MissingCredential { var: API_KEY_ENV })?
            .to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| LabDecoderError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.resolved_model().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnalysisClient for GroqClient {
    fn name(&self) -> &str {
        "groq"
    }

    async fn analyze_image(
        &self,
        instruction: &str,
        image: &EncodedImage,
    ) -> Result<ModelReply, LabDecoderError> {
        let body = build_request_body(
            &self.model,
            instruction,
            image,
            self.temperature,
            self.max_tokens,
        );
        let start = Instant::now();

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !status.is_success() {
            warn!("Groq returned HTTP {}", status);
            return Err(status_error(self.name(), status, retry_after, &text));
        }

        let reply = parse_completion(&text)?;
        debug!(
            "Groq: {} input tokens, {} output tokens, {:?}",
            reply.input_tokens,
            reply.output_tokens,
            start.elapsed()
        );
        Ok(reply)
    }
}

/// JSON body for one vision chat completion.
///
/// A single user turn carries both the instruction and the image, which is
/// what Llama-4 vision models on Groq expect.
pub(crate) fn build_request_body(
    model: &str,
    instruction: &str,
    image: &EncodedImage,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": instruction },
                { "type": "image_url", "image_url": { "url": image.data_url() } }
            ]
        }]
    });
    if let Some(t) = temperature {
        body["temperature"] = serde_json::json!(t);
    }
    if let Some(n) = max_tokens {
        body["max_completion_tokens"] = serde_json::json!(n);
    }
    body
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// Pull `choices[0].message.content` and usage out of a 2xx body.
pub(crate) fn parse_completion(body: &str) -> Result<ModelReply, LabDecoderError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| LabDecoderError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| LabDecoderError::MalformedResponse("response has no message content".into()))?;

    let (input_tokens, output_tokens) = completion
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(ModelReply {
        content,
        input_tokens,
        output_tokens,
    })
}

/// Map a non-2xx response to an error.
pub(crate) fn status_error(
    provider: &str,
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> LabDecoderError {
    let detail = api_error_message(body).unwrap_or_else(|| body.trim().to_string());
    match status.as_u16() {
        401 | 403 => LabDecoderError::AuthError {
            provider: provider.to_string(),
            detail,
        },
        429 => LabDecoderError::RateLimitExceeded {
            provider: provider.to_string(),
            retry_after_secs,
        },
        _ => LabDecoderError::LlmApiError {
            message: format!("HTTP {status}: {detail}"),
        },
    }
}

/// `{"error": {"message": "..."}}` is the OpenAI-style error envelope.
fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(str::to_string)
}

fn transport_error(e: reqwest::Error, timeout_secs: u64) -> LabDecoderError {
    if e.is_timeout() {
        LabDecoderError::ApiTimeout { secs: timeout_secs }
    } else {
        LabDecoderError::Transport(e.to_string())
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Adapter from an `edgequake_llm::LLMProvider` to [`AnalysisClient`].
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    name: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl ProviderClient {
    /// Wrap a pre-built provider.
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn LLMProvider>,
        config: &AnalysisConfig,
    ) -> Self {
        Self {
            provider,
            name: name.into(),
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Create a provider by name through `ProviderFactory`.
    ///
    /// The provider reads its own API key variable (`OPENAI_API_KEY`, …).
    pub fn from_factory(name: &str, config: &AnalysisConfig) -> Result<Self, LabDecoderError> {
        let provider = ProviderFactory::create_llm_provider(name, config.resolved_model()).map_err(|e| {
            LabDecoderError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(name, provider, config))
    }
}

#[async_trait]
impl AnalysisClient for ProviderClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze_image(
        &self,
        instruction: &str,
        image: &EncodedImage,
    ) -> Result<ModelReply, LabDecoderError> {
        let messages = vec![ChatMessage::user_with_images(
            instruction,
            vec![image.to_image_data()],
        )];

        let call = self.provider.chat(&messages, Some(&self.options));
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| LabDecoderError::ApiTimeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| LabDecoderError::LlmApiError {
                message: format!("{e}"),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.name, response.prompt_tokens, response.completion_tokens
        );

        Ok(ModelReply {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the analysis config.
fn build_options(config: &AnalysisConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn image() -> EncodedImage {
        EncodedImage {
            mime_type: "image/jpeg".into(),
            data: "QUJD".into(),
        }
    }

    fn http_response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\n\
             content-type: application/json\r\n\
             content-length: {}\r\n\
             connection: close\r\n\
             {extra_headers}\r\n\
             {body}",
            body.len()
        )
    }

    /// Accept one connection on a local port, read the whole request, answer
    /// with `response`. The handle yields the request text.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                    let body_len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + body_len {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });

        (format!("http://{addr}/v1"), handle)
    }

    fn client_for(base_url: &str) -> GroqClient {
        let config = AnalysisConfig::builder()
            .api_key("gsk_test")
            .base_url(base_url)
            .api_timeout_secs(10)
            .build()
            .unwrap();
        GroqClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn groq_success_parses_body_and_sends_bearer() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"[GOOD] ok"}}],
                      "usage":{"prompt_tokens":900,"completion_tokens":12}}"#;
        let (base_url, server) = serve_once(http_response("200 OK", "", body)).await;

        let reply = client_for(&base_url)
            .analyze_image("Analyze this", &image())
            .await
            .unwrap();
        assert_eq!(reply.content, "[GOOD] ok");
        assert_eq!((reply.input_tokens, reply.output_tokens), (900, 12));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions "), "got: {request}");
        let lower = request.to_lowercase();
        assert!(lower.contains("authorization: bearer gsk_test"));
        assert!(request.contains("data:image/jpeg;base64,QUJD"));
        assert!(request.contains(crate::config::DEFAULT_MODEL));
    }

    #[tokio::test]
    async fn groq_401_is_auth_error() {
        let body = r#"{"error":{"message":"Invalid API Key"}}"#;
        let (base_url, _server) =
            serve_once(http_response("401 Unauthorized", "", body)).await;

        let err = client_for(&base_url)
            .analyze_image("i", &image())
            .await
            .unwrap_err();
        match err {
            LabDecoderError::AuthError { provider, detail } => {
                assert_eq!(provider, "groq");
                assert_eq!(detail, "Invalid API Key");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn groq_429_reads_retry_after_header() {
        let (base_url, _server) = serve_once(http_response(
            "429 Too Many Requests",
            "retry-after: 7\r\n",
            r#"{"error":{"message":"slow down"}}"#,
        ))
        .await;

        let err = client_for(&base_url)
            .analyze_image("i", &image())
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                LabDecoderError::RateLimitExceeded {
                    retry_after_secs: Some(7),
                    ..
                }
            ),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn groq_500_is_api_error_with_body() {
        let (base_url, _server) = serve_once(http_response(
            "500 Internal Server Error",
            "",
            "upstream exploded",
        ))
        .await;

        let err = client_for(&base_url)
            .analyze_image("i", &image())
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, LabDecoderError::LlmApiError { .. }), "got: {err:?}");
        assert!(msg.contains("500"), "got: {msg}");
        assert!(msg.contains("upstream exploded"), "got: {msg}");
    }

    #[tokio::test]
    async fn groq_2xx_without_content_is_malformed() {
        let (base_url, _server) =
            serve_once(http_response("200 OK", "", r#"{"choices":[]}"#)).await;

        let err = client_for(&base_url)
            .analyze_image("i", &image())
            .await
            .unwrap_err();
        assert!(matches!(err, LabDecoderError::MalformedResponse(_)));
    }

    #[test]
    fn request_body_carries_instruction_and_data_url() {
        let body = build_request_body("llama", "Analyze this", &image(), None, None);
        assert_eq!(body["model"], "llama");
        let content = &body["messages"][0]["content"];
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "Analyze this");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn request_body_sampling_options() {
        let body = build_request_body("m", "i", &image(), Some(0.5), Some(1024));
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_completion_tokens"], 1024);
    }

    #[test]
    fn parses_content_and_usage() {
        let body = r#"{
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "[GOOD] Iron: 90"}}],
            "usage": {"prompt_tokens": 1200, "completion_tokens": 80, "total_tokens": 1280}
        }"#;
        let reply = parse_completion(body).unwrap();
        assert_eq!(reply.content, "[GOOD] Iron: 90");
        assert_eq!(reply.input_tokens, 1200);
        assert_eq!(reply.output_tokens, 80);
    }

    #[test]
    fn missing_usage_is_zero() {
        let reply = parse_completion(r#"{"choices":[{"message":{"content":"x"}}]}"#).unwrap();
        assert_eq!((reply.input_tokens, reply.output_tokens), (0, 0));
    }

    #[test]
    fn empty_choices_is_malformed() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, LabDecoderError::MalformedResponse(_)));
        let err = parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap_err();
        assert!(matches!(err, LabDecoderError::MalformedResponse(_)));
        let err = parse_completion("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, LabDecoderError::MalformedResponse(_)));
    }

    #[test]
    fn unauthorized_maps_to_auth_error() {
        let body = r#"{"error":{"message":"Invalid API Key","type":"invalid_request_error"}}"#;
        match status_error("groq", StatusCode::UNAUTHORIZED, None, body) {
            LabDecoderError::AuthError { provider, detail } => {
                assert_eq!(provider, "groq");
                assert_eq!(detail, "Invalid API Key");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn too_many_requests_keeps_retry_after() {
        let err = status_error("groq", StatusCode::TOO_MANY_REQUESTS, Some(7), "");
        assert!(matches!(
            err,
            LabDecoderError::RateLimitExceeded {
                retry_after_secs: Some(7),
                ..
            }
        ));
    }

    #[test]
    fn server_error_keeps_raw_body() {
        let err = status_error("groq", StatusCode::BAD_GATEWAY, None, "upstream down\n");
        let msg = err.to_string();
        assert!(msg.contains("502"), "got: {msg}");
        assert!(msg.contains("upstream down"), "got: {msg}");
    }

    #[test]
    fn groq_client_requires_key() {
        let config = AnalysisConfig::default();
        let err = GroqClient::new(&config).err().expect("no key → error");
        assert!(matches!(
            err,
            LabDecoderError::MissingCredential { var: "GROQ_API_KEY" }
        ));
    }

    #[test]
    fn groq_client_endpoint_joins_base_url() {
        let config = AnalysisConfig::builder()
            .api_key("gsk_x")
            .base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();
        let client = GroqClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) is closed on test machines; the connect fails fast.
        let config = AnalysisConfig::builder()
            .api_key("gsk_x")
            .base_url("http://127.0.0.1:9/v1")
            .api_timeout_secs(5)
            .build()
            .unwrap();
        let client = GroqClient::new(&config).unwrap();
        let err = client.analyze_image("i", &image()).await.unwrap_err();
        assert!(
            matches!(
                err,
                LabDecoderError::Transport(_) | LabDecoderError::ApiTimeout { .. }
            ),
            "got: {err:?}"
        );
    }

    #[test]
    fn build_options_follows_config() {
        let config = AnalysisConfig::builder()
            .temperature(0.2)
            .max_tokens(2048)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(2048));
    }
}
