use crate::parser::FeedParser;
use crate::types::{FetchConfig, FetchError, IngestError, RawItem};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Instant;
use tracing::{debug, info};
use url::Url;

/// Retrieves a feed and returns its entries. Implementations never retry;
/// a retry is a separate sweep.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<RawItem>, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
    parser: FeedParser,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, IngestError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| IngestError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            parser: FeedParser::new(),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.config.timeout())
        } else {
            FetchError::Unreachable(e.to_string())
        }
    }

    fn size_limit(&self) -> u64 {
        (self.config.max_feed_size_mb as u64).saturating_mul(1024 * 1024)
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<RawItem>, FetchError> {
        let start_time = Instant::now();

        let parsed_url =
            Url::parse(url).map_err(|e| FetchError::Unreachable(format!("invalid feed URL {}: {}", url, e)))?;
        if !matches!(parsed_url.scheme(), "http" | "https") {
            return Err(FetchError::Unreachable(format!("unsupported scheme: {}", parsed_url.scheme())));
        }

        debug!("Fetching feed: {}", url);

        let mut response = self.client.get(parsed_url).send().await.map_err(|e| self.classify(e))?;
        let status = response.status();

        if !status.is_success() {
            return Err(FetchError::Unreachable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.size_limit() {
                return Err(FetchError::MalformedFeed(format!(
                    "feed too large: {} bytes exceeds {}MB",
                    content_length, self.config.max_feed_size_mb
                )));
            }
        }

        // Content-Length may be missing or wrong, so the cap is also
        // enforced while the body streams in.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            if (body.len() + chunk.len()) as u64 > self.size_limit() {
                return Err(FetchError::MalformedFeed(format!(
                    "feed too large: body exceeds {}MB",
                    self.config.max_feed_size_mb
                )));
            }
            body.extend_from_slice(&chunk);
        }

        let items = self.parser.parse(&body)?;

        info!(
            url = %url,
            items = items.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Fetched feed"
        );

        Ok(items)
    }
}
