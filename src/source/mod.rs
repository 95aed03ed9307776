//! Feed source abstraction layer.
//!
//! This module defines the [`DataSource`] trait, the common [`FeedItem`] type
//! and the [`FetchError`] a source reports when it has nothing to offer this
//! cycle.  The concrete Nitter RSS source lives in [`nitter`].
//!
//! ## For contributors — adding a new source
//!
//! 1. Create a new file in this directory (e.g. `atom.rs`).
//! 2. Define a struct (e.g. `AtomSource`) and implement [`DataSource`] for it.
//! 3. Add `mod atom;` below and re-export your struct in the `pub use` block.
//! 4. Construct it in `main.rs` instead of [`NitterSource`].
//!
//! The poll engine only sees the trait, so nothing else needs to change.

mod feed_item;
mod nitter;

pub use feed_item::FeedItem;
pub use nitter::{feed_url as rss_feed_url, NitterSource};

use async_trait::async_trait;
use thiserror::Error;

/// Why a fetch produced no items.  Always transient from the engine's point
/// of view: the cycle is skipped and retried after the next sleep.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed endpoint answered with status {0}")]
    Status(u16),

    #[error("feed could not be parsed: {0}")]
    Parse(#[from] rss::Error),
}

/// Trait that every feed source must implement.
///
/// The poll engine calls [`fetch()`](DataSource::fetch) once per cycle from
/// its own task, so implementations must be [`Send`] + [`Sync`].
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Human-readable label used in log lines.
    fn name(&self) -> &str;

    /// Fetch the current feed window, in feed order (newest first for
    /// Nitter).
    async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError>;
}
