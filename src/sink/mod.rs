//! Delivery sinks: where relayed posts end up.

mod telegram;

pub use telegram::{Credentials, TelegramSink};

use async_trait::async_trait;
use thiserror::Error;

/// Why a message was not delivered.  Every variant means "safe to retry":
/// the engine leaves the item undelivered and tries again next cycle.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Credentials are missing; no request was made.
    #[error("delivery not configured: {0}")]
    NotConfigured(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered but did not acknowledge the message.
    #[error("delivery rejected: {description}")]
    Rejected { description: String },
}

/// Trait for delivery targets.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Name of this sink, for logs.
    fn name(&self) -> &'static str;

    /// Whether this sink has what it needs to deliver anything at all.
    fn enabled(&self) -> bool;

    /// Make one delivery attempt.
    async fn send(&self, text: &str) -> Result<(), DeliveryError>;
}
