//! Telegram Bot API transport
//!
//! Long-polls `getUpdates`, maps each message onto a conversation [`Event`]
//! and delivers outbound messages. The chat id doubles as the user id.

use crate::job::UserId;
use crate::runtime::{BotRuntime, JobStore, Notifier};
use crate::state_machine::{Command, Event, ImageRef, MenuOption};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const API_BASE: &str = "https://api.telegram.org";
/// Server-side wait for `getUpdates`
const LONG_POLL_SECS: u64 = 30;
/// Must outlive the long poll
const HTTP_TIMEOUT: Duration = Duration::from_secs(LONG_POLL_SECS + 10);
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Telegram request failed: {0}")]
    Http(String),
    #[error("Telegram API error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("Unexpected Telegram response: {0}")]
    Decode(String),
}

pub struct TelegramClient {
    client: Client,
    token: String,
    api_base: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| TelegramError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            token: token.into(),
            api_base: API_BASE.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{file_path}", self.api_base, self.token)
    }

    async fn call<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        method: &str,
        body: &Req,
    ) -> Result<Resp, TelegramError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            // reqwest errors embed the URL, which carries the token
            .map_err(|e| TelegramError::Http(e.without_url().to_string()))?;

        let text = response
            .text()
            .await
            .map_err(|e| TelegramError::Http(e.without_url().to_string()))?;

        parse_response(&text)
    }

    /// Fetch updates after `offset`, waiting up to the long-poll window
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &GetUpdates {
                offset,
                timeout: LONG_POLL_SECS,
                allowed_updates: &["message"],
            },
        )
        .await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<ReplyKeyboard>,
    ) -> Result<(), TelegramError> {
        let _: Message = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id,
                    text,
                    reply_markup,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
    ) -> Result<(), TelegramError> {
        let _: Message = self
            .call(
                "sendPhoto",
                &SendPhoto {
                    chat_id,
                    photo,
                    caption,
                },
            )
            .await?;
        Ok(())
    }

    /// Resolve a file id to a download URL
    pub async fn file_download_url(&self, file_id: &str) -> Result<String, TelegramError> {
        let file: File = self.call("getFile", &GetFile { file_id }).await?;
        let path = file
            .file_path
            .ok_or_else(|| TelegramError::Decode(format!("file {file_id} has no path")))?;
        Ok(self.file_url(&path))
    }

    /// Finish an inbound message by resolving its photo to a download URL
    async fn resolve(&self, incoming: Incoming) -> Result<Event, TelegramError> {
        match incoming {
            Incoming::Ready(event) => Ok(event),
            Incoming::Photo { file_id } => {
                let url = self.file_download_url(&file_id).await?;
                Ok(Event::Photos(vec![ImageRef::new(url)]))
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send_text(&self, user_id: UserId, text: &str) -> Result<(), String> {
        self.send_message(user_id, text, None)
            .await
            .map_err(|e| e.to_string())
    }

    async fn send_image(
        &self,
        user_id: UserId,
        image: &ImageRef,
        caption: &str,
    ) -> Result<(), String> {
        self.send_photo(user_id, image.as_str(), caption)
            .await
            .map_err(|e| e.to_string())
    }

    async fn show_menu(&self, user_id: UserId, text: &str) -> Result<(), String> {
        self.send_message(user_id, text, Some(ReplyKeyboard::main_menu()))
            .await
            .map_err(|e| e.to_string())
    }
}

/// Poll for updates until cancelled, feeding them to the runtime one at a
/// time so each user's events keep their order.
pub async fn poll<S, N>(
    client: Arc<TelegramClient>,
    runtime: Arc<BotRuntime<S, N>>,
    cancel: CancellationToken,
) where
    S: JobStore + 'static,
    N: Notifier + 'static,
{
    let mut offset = 0;
    tracing::info!("Telegram polling started");

    loop {
        let updates = tokio::select! {
            () = cancel.cancelled() => break,
            result = client.get_updates(offset) => result,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "getUpdates failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(POLL_ERROR_BACKOFF) => continue,
                }
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let user_id = message.chat.id;
            let Some(incoming) = classify(&message) else {
                tracing::debug!(user_id, "Ignoring message without text or photo");
                continue;
            };
            match client.resolve(incoming).await {
                Ok(event) => runtime.handle_event(user_id, event).await,
                Err(e) => tracing::warn!(user_id, error = %e, "Failed to resolve photo"),
            }
        }
    }

    tracing::info!("Telegram polling stopped");
}

/// What a message means before any network lookups
#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    Ready(Event),
    Photo { file_id: String },
}

fn classify(message: &Message) -> Option<Incoming> {
    if let Some(photo) = message.photo.as_deref().and_then(largest_photo) {
        return Some(Incoming::Photo {
            file_id: photo.file_id.clone(),
        });
    }

    let text = message.text.as_deref()?;
    let event = if text.starts_with('/') {
        let name = text.split_whitespace().next().unwrap_or(text);
        Event::Command(Command::parse(name))
    } else if let Some(option) = MenuOption::from_label(text.trim()) {
        Event::MenuChoice(option)
    } else {
        Event::Text(text.to_string())
    };
    Some(Incoming::Ready(event))
}

fn largest_photo(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    sizes
        .iter()
        .max_by_key(|size| u64::from(size.width) * u64::from(size.height))
}

fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T, TelegramError> {
    let envelope: ApiResponse<T> =
        serde_json::from_str(text).map_err(|e| TelegramError::Decode(e.to_string()))?;
    if !envelope.ok {
        return Err(TelegramError::Api {
            code: envelope.error_code.unwrap_or_default(),
            description: envelope.description.unwrap_or_default(),
        });
    }
    envelope
        .result
        .ok_or_else(|| TelegramError::Decode("ok response without result".to_string()))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyKeyboard>,
}

#[derive(Serialize)]
struct SendPhoto<'a> {
    chat_id: i64,
    photo: &'a str,
    caption: &'a str,
}

#[derive(Serialize)]
struct GetFile<'a> {
    file_id: &'a str,
}

/// Reply keyboard with one button per row
#[derive(Debug, Serialize)]
pub struct ReplyKeyboard {
    keyboard: Vec<Vec<KeyboardButton>>,
    resize_keyboard: bool,
}

#[derive(Debug, Serialize)]
struct KeyboardButton {
    text: &'static str,
}

impl ReplyKeyboard {
    pub fn main_menu() -> Self {
        Self {
            keyboard: MenuOption::ALL
                .iter()
                .map(|option| {
                    vec![KeyboardButton {
                        text: option.label(),
                    }]
                })
                .collect(),
            resize_keyboard: true,
        }
    }
}
