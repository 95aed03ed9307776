//! Telegram Bot API delivery sink.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DeliveryError, DeliverySink};

/// Bot token and destination chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub chat_id: String,
}

/// Sends messages through `sendMessage` on the Bot API.
pub struct TelegramSink {
    credentials: Option<Credentials>,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// The part of the Bot API envelope we care about.
#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramSink {
    /// Without credentials the sink stays constructible but every send fails
    /// fast with [`DeliveryError::NotConfigured`].
    pub fn new(client: reqwest::Client, api_base: &str, credentials: Option<Credentials>) -> Self {
        if credentials.is_some() {
            debug!("Telegram delivery enabled");
        } else {
            debug!("Telegram delivery disabled (TOKEN or CHAT_ID not set)");
        }

        Self {
            credentials,
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn enabled(&self) -> bool {
        self.credentials.is_some()
    }

    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        let Some(creds) = &self.credentials else {
            return Err(DeliveryError::NotConfigured("TOKEN or CHAT_ID not set"));
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, creds.token);
        let payload = SendMessage {
            chat_id: &creds.chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: false,
        };

        // Error statuses still carry the JSON envelope, so read it either way.
        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        let body: ApiResponse = response.json().await.map_err(|e| DeliveryError::Rejected {
            description: format!("unreadable response (status {status}): {e}"),
        })?;

        if body.ok {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                description: body
                    .description
                    .unwrap_or_else(|| format!("status {status}")),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
