//! `OpenAI`-compatible image pipeline
//!
//! Two calls per job: a vision chat completion turns the garment photos and
//! the user's brief into an image prompt, then `images/generations` renders
//! it. Both run under one concurrency permit.

use super::{GenerationError, GenerationRequest, ImageService, Prompts};
use crate::config::OpenAiConfig;
use crate::state_machine::ImageRef;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// Portrait output for full-body looks
const IMAGE_SIZE: &str = "1024x1792";
const PROMPT_MAX_TOKENS: u32 = 1000;
const PROMPT_TEMPERATURE: f32 = 0.1;
const PORTRAIT_SUFFIX: &str =
    "IMPORTANT: Create vertical portrait (9:16) image with full-body model";

pub struct OpenAIImageService {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
    image_quality: String,
    image_style: String,
    prompts: Prompts,
    permits: Semaphore,
}

impl OpenAIImageService {
    pub fn new(
        config: &OpenAiConfig,
        prompts: Prompts,
        max_concurrent_requests: u32,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GenerationError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            image_quality: config.image_quality.clone(),
            image_style: config.image_style.clone(),
            prompts,
            permits: Semaphore::new(max_concurrent_requests.max(1) as usize),
        })
    }

    fn build_chat_request(&self, request: &GenerationRequest<'_>) -> ChatRequest {
        let (system, user) = self.prompts.for_kind(request.kind);

        let mut content: Vec<ContentPart> = request
            .images
            .iter()
            .map(|image| ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.as_str().to_string(),
                },
            })
            .collect();
        content.push(ContentPart::Text {
            text: user.to_string(),
        });
        content.push(ContentPart::Text {
            text: format!("Additional requirements: {}", request.brief),
        });

        ChatRequest {
            model: self.text_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(system.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(content),
                },
            ],
            max_tokens: PROMPT_MAX_TOKENS,
            temperature: PROMPT_TEMPERATURE,
        }
    }

    fn build_image_request(&self, prompt: &str) -> ImageRequest {
        ImageRequest {
            model: self.image_model.clone(),
            prompt: format!("{prompt}\n\n{PORTRAIT_SUFFIX}"),
            size: IMAGE_SIZE,
            quality: self.image_quality.clone(),
            style: self.image_style.clone(),
            response_format: "url",
            n: 1,
        }
    }

    async fn post<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, GenerationError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    GenerationError::network(format!("Connection failed: {e}"))
                } else {
                    GenerationError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map_or(text, |parsed| parsed.error.message);
            return Err(GenerationError::from_status(status.as_u16(), &message));
        }

        serde_json::from_str(&text).map_err(|e| {
            GenerationError::unknown(format!("Failed to parse response: {e} - body: {text}"))
        })
    }
}

#[async_trait]
impl ImageService for OpenAIImageService {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<ImageRef, GenerationError> {
        if request.images.is_empty() {
            return Err(GenerationError::invalid_request("At least one image is required"));
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| GenerationError::unknown(format!("Generation permits closed: {e}")))?;

        let chat: ChatResponse = self
            .post("chat/completions", &self.build_chat_request(request))
            .await?;
        let prompt = extract_prompt(chat)?;
        tracing::debug!(kind = %request.kind, prompt_len = prompt.len(), "Image prompt ready");

        let images: ImageResponse = self
            .post("images/generations", &self.build_image_request(&prompt))
            .await?;
        extract_image_url(images)
    }

    fn model_id(&self) -> &str {
        &self.image_model
    }
}

fn extract_prompt(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| GenerationError::empty_result("Chat completion returned no prompt"))
}

fn extract_image_url(response: ImageResponse) -> Result<ImageRef, GenerationError> {
    response
        .data
        .into_iter()
        .next()
        .and_then(|image| image.url)
        .filter(|url| !url.trim().is_empty())
        .map(ImageRef::new)
        .ok_or_else(|| GenerationError::empty_result("Image generation returned no URL"))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    size: &'static str,
    quality: String,
    style: String,
    response_format: &'static str,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
