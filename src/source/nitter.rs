//! Nitter RSS feed source.
//!
//! Nitter publishes every account's timeline as RSS 2.0 at
//! `<instance>/rss/<username>`.  This module fetches that document over the
//! shared HTTP client and converts the entries into [`FeedItem`]s.
//!
//! ## For contributors
//!
//! Parsing is split from I/O: [`NitterSource::parse_channel`] is a pure
//! function, so most tests never touch the network.

use async_trait::async_trait;
use tracing::debug;

use super::{DataSource, FeedItem, FetchError};

/// Build the RSS URL for `username` on a Nitter `instance`.
///
/// Trailing slashes on the instance are ignored, so both
/// `https://nitter.net` and `https://nitter.net/` work.
pub fn feed_url(instance: &str, username: &str) -> String {
    format!("{}/rss/{username}", instance.trim_end_matches('/'))
}

/// The timeline of one account on one Nitter instance.
pub struct NitterSource {
    client: reqwest::Client,
    url: String,
    label: String,
}

impl NitterSource {
    /// Create a source for `username` on `instance`.
    ///
    /// The client is shared with the delivery sink; its timeout bounds every
    /// fetch.
    pub fn new(client: reqwest::Client, instance: &str, username: &str) -> Self {
        Self {
            client,
            url: feed_url(instance, username),
            label: format!("nitter:{username}"),
        }
    }

    /// Parse an already-fetched [`rss::Channel`] into [`FeedItem`]s, keeping
    /// feed order.
    pub fn parse_channel(channel: &rss::Channel) -> Vec<FeedItem> {
        channel
            .items()
            .iter()
            .map(|item| FeedItem {
                id: item.guid().map(|g| g.value().to_string()),
                link: item.link().map(String::from),
                title: item.title().map(String::from),
                published: item.pub_date().map(String::from),
                summary: item
                    .description()
                    .or_else(|| item.content())
                    .map(String::from),
            })
            .collect()
    }
}

#[async_trait]
impl DataSource for NitterSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let channel = rss::Channel::read_from(body.as_ref())?;
        let items = Self::parse_channel(&channel);
        debug!(url = %self.url, count = items.len(), "fetched feed");
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
