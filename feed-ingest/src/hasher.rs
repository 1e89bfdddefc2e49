//! Content fingerprinting and the novelty decision.
//!
//! The dedup key is SHA-256 over `link ++ title`, taken exactly as the feed
//! delivered them (no trimming, no case folding). Body text is not part of
//! the key: an upstream edit to an article's body with link and title intact
//! is the same item.

use crate::store::ArticleStore;
use crate::types::{Article, IngestError, RawItem, Source, SourceType};
use crate::parser::word_count;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const DEFAULT_LANGUAGE: &str = "en";

/// Lowercase hex SHA-256 of the item's link followed by its title.
pub fn fingerprint(item: &RawItem) -> String {
    fingerprint_parts(&item.link, &item.title)
}

pub fn fingerprint_parts(link: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(link.as_bytes());
    hasher.update(title.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short form used in ids and log lines.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

/// `article_<sourceId>_<first 8 hex chars>`.
///
/// Two unrelated fingerprints can share a prefix within one source; the store
/// then rejects the second write as a conflict rather than overwriting.
pub fn article_id(source_id: &str, hash: &str) -> String {
    format!("article_{}_{}", source_id, short_hash(hash))
}

pub fn build_article(source: &Source, item: &RawItem, hash: String, scraped_at: DateTime<Utc>) -> Article {
    Article {
        id: article_id(&source.id, &hash),
        source_id: source.id.clone(),
        source_name: source.name.clone(),
        url: item.link.clone(),
        title: item.title.clone(),
        content: item.content.clone(),
        published_at: item.published_at,
        scraped_at,
        source_type: SourceType::Rss,
        content_hash: hash,
        word_count: i32::try_from(word_count(&item.content)).unwrap_or(i32::MAX),
        language: DEFAULT_LANGUAGE.to_string(),
        processed: false,
        classification: None,
        top_entities: Vec::new(),
    }
}

/// Decides novelty against the store.
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn ArticleStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    /// `Ok(true)` only when the store positively reports the hash absent.
    /// A failed lookup is surfaced so the caller can skip the item instead of
    /// guessing either way.
    pub async fn is_novel(&self, hash: &str) -> Result<bool, IngestError> {
        self.store
            .exists(hash)
            .await
            .map(|found| !found)
            .map_err(IngestError::DuplicateCheckUnavailable)
    }
}
