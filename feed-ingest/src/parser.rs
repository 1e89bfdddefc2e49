use crate::types::{FetchError, RawItem};
use chrono::Utc;
use feed_rs::model::Link;
use feed_rs::parser;
use tracing::debug;

/// Normalizes RSS, Atom and JSON Feed documents into [`RawItem`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, body: &[u8]) -> Result<Vec<RawItem>, FetchError> {
        debug!("Parsing feed content ({} bytes)", body.len());

        let feed = parser::parse(body).map_err(|e| FetchError::MalformedFeed(e.to_string()))?;

        let items: Vec<RawItem> = feed.entries.into_iter().map(Self::parse_entry).collect();

        let linkless = items.iter().filter(|item| item.link.is_empty()).count();
        if linkless > 0 {
            debug!("{} entries have no link, keyed on title alone", linkless);
        }

        Ok(items)
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> RawItem {
        let link = Self::canonical_link(&entry.links).unwrap_or_default();
        let title = entry.title.map(|t| t.content).unwrap_or_default();

        let description = entry.summary.map(|s| s.content).unwrap_or_default();
        let content = if description.is_empty() {
            entry.content.and_then(|c| c.body).unwrap_or_default()
        } else {
            description
        };

        let published_at = entry.published.map(|dt| dt.with_timezone(&Utc));

        RawItem {
            link,
            title,
            content,
            published_at,
        }
    }

    /// The entry's alternate link. Atom entries often list enclosures or a
    /// `self` link first, so those are only used when nothing else exists.
    fn canonical_link(links: &[Link]) -> Option<String> {
        links
            .iter()
            .find(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
            .or_else(|| links.first())
            .map(|link| link.href.clone())
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
