pub mod format;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::TelegramConfig;
use crate::github::Issue;
use crate::repos::RepoRef;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Telegram request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Telegram rejected the message (HTTP {status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("Notification undelivered; formatted: {formatted}; plain: {plain}")]
    Undelivered {
        formatted: Box<NotifyError>,
        plain: Box<NotifyError>,
    },
}

/// How a notification was eventually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Formatted,
    PlainFallback,
}

/// Destination for new-issue alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert. Ok means the chat received it in some form.
    async fn notify(&self, repo: &RepoRef, issue: &Issue) -> Result<Delivery, NotifyError>;
}

/// Notifier that posts to a chat through the Telegram Bot API.
pub struct TelegramNotifier {
    http: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(
        config: &TelegramConfig,
        bot_token: &str,
        chat_id: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let endpoint = format!(
            "{}/bot{}/sendMessage",
            config.api_url.trim_end_matches('/'),
            bot_token
        );
        Ok(Self {
            http,
            endpoint,
            chat_id: chat_id.into(),
        })
    }

    async fn send(&self, text: &str, parse_mode: Option<&str>) -> Result<(), NotifyError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode,
            disable_web_page_preview: true,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|err| NotifyError::Request(err.without_url()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ApiResponse>(&body).ok();

        match parsed {
            Some(api) if status.is_success() && api.ok => Ok(()),
            Some(api) => Err(NotifyError::Rejected {
                status: status.as_u16(),
                description: api.description.unwrap_or_else(|| "no description".to_string()),
            }),
            None => Err(NotifyError::Rejected {
                status: status.as_u16(),
                description: body,
            }),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip_all, fields(repo = %repo, issue = issue.number))]
    async fn notify(&self, repo: &RepoRef, issue: &Issue) -> Result<Delivery, NotifyError> {
        let html = format::render_html(repo, issue);
        let formatted = match self.send(&html, Some("HTML")).await {
            Ok(()) => {
                debug!("sent formatted notification");
                return Ok(Delivery::Formatted);
            }
            Err(err) => err,
        };

        warn!(error = %formatted, "formatted send failed, retrying as plain text");
        let plain = format::render_plain(repo, issue);
        match self.send(&plain, None).await {
            Ok(()) => {
                debug!("sent plain-text notification");
                Ok(Delivery::PlainFallback)
            }
            Err(plain) => Err(NotifyError::Undelivered {
                formatted: Box::new(formatted),
                plain: Box::new(plain),
            }),
        }
    }
}
