use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{MediaPayload, Transport, TransportError};
use crate::storage::MediaKind;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Uploads get a longer budget than plain JSON calls
const UPLOAD_TIMEOUT_FACTOR: u32 = 4;

const PARSE_MODE: &str = "MarkdownV2";

/// Telegram Bot API client.
///
/// Request URLs embed the bot token, so they are never logged and reqwest
/// errors are stripped of their URL before they leave this module.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
    timeout: Duration,
}

impl TelegramClient {
    pub fn new(client: reqwest::Client, token: SecretString) -> Self {
        Self {
            client,
            base_url: DEFAULT_API_BASE.to_string(),
            token,
            timeout: Duration::from_secs(20),
        }
    }

    /// Point the client at another API host (local Bot API server, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url,
            self.token.expose_secret(),
            method
        )
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &T,
    ) -> Result<(), TransportError> {
        let request = self.client.post(self.endpoint(method)).json(body);
        self.execute(method, request, self.timeout).await
    }

    async fn execute(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        // One budget covers connect, headers and body
        let exchange = async {
            let response = request.timeout(timeout).send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Network(e.without_url())
                }
            })?;

        let parsed: Option<ApiResponse> = serde_json::from_slice(&body).ok();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parsed
                .as_ref()
                .and_then(|r| r.parameters.as_ref())
                .and_then(|p| p.retry_after);
            tracing::warn!(method = method, retry_after = ?retry_after, "Bot API rate limited");
            return Err(TransportError::RateLimited { retry_after });
        }

        match parsed {
            Some(api) if api.ok && status.is_success() => {
                tracing::trace!(method = method, "Bot API call succeeded");
                Ok(())
            }
            Some(api) => Err(TransportError::Rejected {
                status: status.as_u16(),
                description: api
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
            None if !status.is_success() => Err(TransportError::HttpStatus(status.as_u16())),
            None => Err(TransportError::InvalidResponse(format!(
                "{method} returned a non-JSON body"
            ))),
        }
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_by_reference(
        &self,
        recipient: &str,
        caption: &str,
        url: &str,
        kind: MediaKind,
    ) -> Result<(), TransportError> {
        match kind {
            MediaKind::Image => {
                self.post_json(
                    "sendPhoto",
                    &MediaRequest {
                        chat_id: recipient,
                        photo: Some(url),
                        video: None,
                        caption,
                        parse_mode: PARSE_MODE,
                    },
                )
                .await
            }
            MediaKind::Video => {
                self.post_json(
                    "sendVideo",
                    &MediaRequest {
                        chat_id: recipient,
                        photo: None,
                        video: Some(url),
                        caption,
                        parse_mode: PARSE_MODE,
                    },
                )
                .await
            }
            MediaKind::Text => {
                // An empty message body is rejected, fall back to the bare link
                let text = if caption.trim().is_empty() {
                    crate::markup::render(url)
                } else {
                    caption.to_string()
                };
                self.post_json(
                    "sendMessage",
                    &MessageRequest {
                        chat_id: recipient,
                        text: &text,
                        parse_mode: PARSE_MODE,
                        link_preview_options: LinkPreviewOptions { url },
                    },
                )
                .await
            }
        }
    }

    async fn send_payload(
        &self,
        recipient: &str,
        caption: &str,
        payload: &MediaPayload,
    ) -> Result<(), TransportError> {
        let (method, field, mime) = match payload.kind {
            MediaKind::Video => ("sendVideo", "video", "video/mp4"),
            MediaKind::Image => ("sendPhoto", "photo", "image/jpeg"),
            MediaKind::Text => ("sendDocument", "document", "application/octet-stream"),
        };

        let part = Part::bytes(payload.bytes.clone())
            .file_name(payload.filename.clone())
            .mime_str(mime)
            .map_err(|e| TransportError::Network(e.without_url()))?;

        let form = Form::new()
            .text("chat_id", recipient.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", PARSE_MODE)
            .part(field, part);

        tracing::debug!(
            method = method,
            bytes = payload.bytes.len(),
            "Uploading media payload"
        );

        let request = self.client.post(self.endpoint(method)).multipart(form);
        self.execute(method, request, self.timeout * UPLOAD_TIMEOUT_FACTOR)
            .await
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct MediaRequest<'a> {
    chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<&'a str>,
    caption: &'a str,
    parse_mode: &'a str,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    link_preview_options: LinkPreviewOptions<'a>,
}

#[derive(Serialize)]
struct LinkPreviewOptions<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}
