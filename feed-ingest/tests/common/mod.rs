#![allow(dead_code)]

use async_trait::async_trait;
use feed_ingest::{CancelSignal, FeedFetcher, FetchError, RawItem, Source};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
pub enum Script {
    Items(Vec<RawItem>),
    Unreachable,
    Timeout,
    Malformed,
}

/// Feed stand-in answering from a fixed url → response table.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, Instant)>>,
    cancel_after_first: Option<CancelSignal>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
        self
    }

    pub fn cancelling(mut self, signal: CancelSignal) -> Self {
        self.cancel_after_first = Some(signal);
        self
    }

    pub fn set(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<RawItem>, FetchError> {
        self.calls.lock().unwrap().push((url.to_string(), Instant::now()));
        if let Some(signal) = &self.cancel_after_first {
            signal.cancel();
        }

        let script = self.scripts.lock().unwrap().get(url).cloned();
        match script {
            Some(Script::Items(items)) => Ok(items),
            Some(Script::Unreachable) | None => Err(FetchError::Unreachable(format!("connection refused: {}", url))),
            Some(Script::Timeout) => Err(FetchError::Timeout(Duration::from_secs(30))),
            Some(Script::Malformed) => Err(FetchError::MalformedFeed("unexpected EOF".to_string())),
        }
    }
}

pub fn item(link: &str, title: &str, content: &str) -> RawItem {
    RawItem {
        link: link.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        published_at: None,
    }
}

pub fn numbered_items(prefix: &str, n: usize) -> Vec<RawItem> {
    (0..n)
        .map(|i| item(&format!("https://{}.test/posts/{}", prefix, i), &format!("{} post {}", prefix, i), "body text"))
        .collect()
}

pub fn source(id: &str, url: &str) -> Source {
    Source::new(id, format!("Source {}", id), url)
}
