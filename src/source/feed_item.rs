//! The item type produced by every feed source.
//!
//! `FeedItem` keeps the raw fields a feed entry exposes and leaves the
//! decisions (which field identifies the item, how it is rendered) to small
//! methods, so the poll engine never has to know which source produced it.
//!
//! ## For contributors
//!
//! Items are built fresh every cycle and thrown away after delivery; nothing
//! here is persisted.  If a new source has no natural `id`, leave it `None`
//! and [`FeedItem::identifier`] will fall back to the link, then the title.

use std::sync::LazyLock;

use regex::Regex;

/// Inline markup as it appears in Nitter summaries.
static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<]+?>").expect("markup pattern is valid"));

/// A single feed entry.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct FeedItem {
    /// Source-provided unique id (RSS `<guid>`).
    pub id: Option<String>,

    /// Permalink to the post.
    pub link: Option<String>,

    /// Headline.  Nitter repeats the start of the post here.
    pub title: Option<String>,

    /// Publication timestamp exactly as the feed spelled it.  Only displayed,
    /// never parsed or compared.
    pub published: Option<String>,

    /// Post body, possibly containing inline HTML.
    pub summary: Option<String>,
}

impl FeedItem {
    /// The identifier used for de-duplication: the first non-empty of
    /// `id`, `link`, `title`.  `None` means the item cannot be tracked and
    /// must be skipped.
    ///
    /// The value is used verbatim, whitespace included, so it matches ids
    /// already recorded in existing state files.
    pub fn identifier(&self) -> Option<&str> {
        [&self.id, &self.link, &self.title]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|s| !s.is_empty())
    }

    /// The summary with inline markup removed.
    pub fn summary_text(&self) -> String {
        let summary = self.summary.as_deref().unwrap_or_default();
        MARKUP.replace_all(summary, "").into_owned()
    }

    /// Render the chat message for this item (Telegram Markdown).
    pub fn format_message(&self, username: &str) -> String {
        format!(
            "*{username}*\n{published}\n\n{summary}\n\n[Open on X]({link})",
            published = self.published.as_deref().unwrap_or_default(),
            summary = self.summary_text(),
            link = self.link.as_deref().unwrap_or_default(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
