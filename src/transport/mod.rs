//! Outbound message transport.
//!
//! The delivery engine only sees the [`Transport`] trait; [`TelegramClient`]
//! is the production implementation against the Telegram Bot API. Tests swap
//! in recording fakes.

mod telegram;

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::MediaKind;

pub use telegram::{TelegramClient, DEFAULT_API_BASE};

/// Media bytes downloaded for re-upload.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub kind: MediaKind,
}

/// Errors returned by a transport send.
///
/// Every variant is recoverable at the recipient level; `is_transient`
/// separates failures worth retrying later from ones that will keep failing.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Rejected by API ({status}): {description}")]
    Rejected { status: u16, description: String },
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Returns true if the same send could succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout
            | TransportError::Network(_)
            | TransportError::RateLimited { .. } => true,
            TransportError::HttpStatus(status) => *status >= 500,
            TransportError::Rejected { status, .. } => *status >= 500,
            TransportError::InvalidResponse(_) => false,
        }
    }
}

/// A destination that can receive captioned media.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send media the remote side can fetch by URL itself.
    ///
    /// For [`MediaKind::Text`] the caption is the message body and `url` is
    /// used as the link preview.
    async fn send_by_reference(
        &self,
        recipient: &str,
        caption: &str,
        url: &str,
        kind: MediaKind,
    ) -> Result<(), TransportError>;

    /// Upload media bytes alongside the caption.
    async fn send_payload(
        &self,
        recipient: &str,
        caption: &str,
        payload: &MediaPayload,
    ) -> Result<(), TransportError>;
}
