//! Classification oracles: the external services that read a paper and name it.
//!
//! The [`ClassificationOracle`] trait is the seam between the classifier and
//! the network. Two implementations ship:
//!
//! * [`AnthropicOracle`] — sends the PDF itself as a `document` block to the
//!   Anthropic Messages API. The default; needs `ANTHROPIC_API_KEY`.
//! * [`VisionOracle`] — rasterises page one and sends it as an image through
//!   any `edgequake-llm` provider (OpenAI, Gemini, Ollama, …).
//!
//! Oracles return raw reply text. Parsing and the fallback policy live in
//! [`crate::pipeline::classify`], so a new oracle only has to move bytes.

use crate::config::{OracleConfig, DEFAULT_ANTHROPIC_MODEL, DEFAULT_VISION_MODEL};
use crate::error::OracleError;
use crate::pipeline::reduce;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Something that answers the classification prompt for a PDF.
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Send `prompt` with `document` (PDF bytes) and return the reply text.
    async fn complete(&self, prompt: &str, document: &[u8]) -> Result<String, OracleError>;
}

/// Build the oracle selected by `config`.
///
/// A pre-built or named vision provider wins; otherwise the Anthropic
/// document oracle is used.
pub fn build_oracle(
    config: &OracleConfig,
    pdfium_lib: Option<PathBuf>,
) -> Result<Arc<dyn ClassificationOracle>, OracleError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(VisionOracle::new(
            Arc::clone(provider),
            config,
            pdfium_lib,
        )));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            OracleError::MissingCredentials {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        return Ok(Arc::new(VisionOracle::new(provider, config, pdfium_lib)));
    }

    Ok(Arc::new(AnthropicOracle::new(config)?))
}

// ── Anthropic document oracle ────────────────────────────────────────────

/// Oracle backed by the Anthropic Messages API with a PDF `document` block.
pub struct AnthropicOracle {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    max_tokens: usize,
    endpoint: String,
}

impl AnthropicOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            max_tokens: config.max_tokens,
            endpoint: format!("{}/v1/messages", config.api_base_url.trim_end_matches('/')),
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock<'a> {
    Text { text: &'a str },
    Document { source: DocumentSource },
}

#[derive(Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl ClassificationOracle for AnthropicOracle {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str, document: &[u8]) -> Result<String, OracleError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| OracleError::MissingCredentials {
                provider: "anthropic".to_string(),
                hint: "Set ANTHROPIC_API_KEY or pass --api-key.".to_string(),
            })?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentBlock::Text { text: prompt },
                    ContentBlock::Document {
                        source: DocumentSource {
                            kind: "base64",
                            media_type: "application/pdf",
                            data: STANDARD.encode(document),
                        },
                    },
                ],
            }],
        };

        debug!(
            "POST {} ({} document bytes, model {})",
            self.endpoint,
            document.len(),
            self.model
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|e| OracleError::Malformed {
                detail: format!("unexpected response body: {e}"),
            })?;

        parsed
            .content
            .into_iter()
            .find(|b| b.kind == "text")
            .and_then(|b| b.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)
    }
}

// ── Vision oracle (edgequake-llm) ────────────────────────────────────────

/// Oracle backed by any vision-capable `edgequake-llm` provider.
///
/// Vision APIs take images, not PDFs, so page one is rasterised first. A PDF
/// that pdfium cannot open is reported as [`OracleError::Malformed`].
pub struct VisionOracle {
    provider: Arc<dyn LLMProvider>,
    pdfium_lib: Option<PathBuf>,
    max_tokens: usize,
    max_pixels: u32,
}

impl VisionOracle {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        config: &OracleConfig,
        pdfium_lib: Option<PathBuf>,
    ) -> Self {
        Self {
            provider,
            pdfium_lib,
            max_tokens: config.max_tokens,
            max_pixels: config.max_rendered_pixels,
        }
    }
}

#[async_trait]
impl ClassificationOracle for VisionOracle {
    fn name(&self) -> &str {
        "vision"
    }

    async fn complete(&self, prompt: &str, document: &[u8]) -> Result<String, OracleError> {
        let image = reduce::render_first_page(document.to_vec(), self.pdfium_lib.clone(), self.max_pixels)
            .await
            .map_err(|e| OracleError::Malformed {
                detail: format!("cannot rasterise document for a vision model: {e}"),
            })?;

        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| OracleError::Transport(format!("{}", e)))?;

        debug!(
            "Vision oracle: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(response.content)
    }
}
