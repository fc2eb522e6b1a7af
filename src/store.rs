//! In-memory registry of feed URLs and their last known [`Feed`].
//!
//! Entries keep registration order so they can also be addressed by index.
//! Each stored feed sits behind an `Arc` and is only ever swapped as a whole,
//! so readers see either the previous feed or the new one.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use url::Url;

use crate::feed::Feed;

/// Failures of registration and accessor calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No feed is registered under this URL or index
    #[error("Feed not found: {0}")]
    NotFound(String),
    /// The URL is already registered
    #[error("Feed already registered: {0}")]
    AlreadyRegistered(String),
    /// The URL could not be parsed as an absolute URL
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
}

/// Address of a registered feed: its URL or its registration position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKey<'a> {
    Url(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for FeedKey<'a> {
    fn from(url: &'a str) -> Self {
        FeedKey::Url(url)
    }
}

impl<'a> From<&'a String> for FeedKey<'a> {
    fn from(url: &'a String) -> Self {
        FeedKey::Url(url)
    }
}

impl From<usize> for FeedKey<'_> {
    fn from(index: usize) -> Self {
        FeedKey::Index(index)
    }
}

impl std::fmt::Display for FeedKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedKey::Url(url) => f.write_str(url),
            FeedKey::Index(index) => write!(f, "#{}", index),
        }
    }
}

#[derive(Debug)]
struct Entry {
    url: String,
    parsed: Url,
    feed: Option<Arc<Feed>>,
}

/// Shared handle to the feed registry. Clones point at the same entries.
#[derive(Debug, Clone, Default)]
pub struct FeedStore {
    entries: Arc<RwLock<Vec<Entry>>>,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn position(entries: &[Entry], key: FeedKey<'_>) -> Result<usize, StoreError> {
        let pos = match key {
            FeedKey::Url(url) => entries.iter().position(|e| e.url == url),
            FeedKey::Index(index) => (index < entries.len()).then_some(index),
        };
        pos.ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Registers a feed URL. The feed stays unfetched until the next cycle.
    pub fn add(&self, url: &str) -> Result<(), StoreError> {
        let parsed = Url::parse(url).map_err(|e| StoreError::InvalidUrl(format!("{url}: {e}")))?;

        let mut entries = self.write();
        if entries.iter().any(|e| e.url == url) {
            return Err(StoreError::AlreadyRegistered(url.to_owned()));
        }
        entries.push(Entry {
            url: url.to_owned(),
            parsed,
            feed: None,
        });
        tracing::debug!(feed = %url, "Feed registered");
        Ok(())
    }

    /// Unregisters a feed by URL or index and returns its URL.
    pub fn remove<'a>(&self, key: impl Into<FeedKey<'a>>) -> Result<String, StoreError> {
        let mut entries = self.write();
        let pos = Self::position(&entries, key.into())?;
        let removed = entries.remove(pos);
        tracing::debug!(feed = %removed.url, "Feed removed");
        Ok(removed.url)
    }

    /// Last stored feed for a URL or index.
    ///
    /// `Ok(None)` means registered but not fetched successfully yet.
    pub fn get<'a>(&self, key: impl Into<FeedKey<'a>>) -> Result<Option<Arc<Feed>>, StoreError> {
        let entries = self.read();
        let pos = Self::position(&entries, key.into())?;
        Ok(entries[pos].feed.clone())
    }

    /// Every registered URL with its stored feed, in registration order.
    pub fn get_all(&self) -> Vec<(String, Option<Arc<Feed>>)> {
        self.read()
            .iter()
            .map(|e| (e.url.clone(), e.feed.clone()))
            .collect()
    }

    /// Registered URLs in registration order.
    pub fn list(&self) -> Vec<String> {
        self.read().iter().map(|e| e.url.clone()).collect()
    }

    /// Registered URLs, parsed.
    pub fn list_parsed(&self) -> Vec<Url> {
        self.read().iter().map(|e| e.parsed.clone()).collect()
    }

    pub fn has(&self, url: &str) -> bool {
        self.read().iter().any(|e| e.url == url)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Entry state for the poller: `None` if the URL is not registered,
    /// `Some(None)` before the first successful fetch.
    pub(crate) fn snapshot(&self, url: &str) -> Option<Option<Arc<Feed>>> {
        self.read()
            .iter()
            .find(|e| e.url == url)
            .map(|e| e.feed.clone())
    }

    /// Swaps in a freshly fetched feed. Returns `false` when the URL was
    /// unregistered in the meantime, in which case nothing is stored.
    pub(crate) fn replace(&self, url: &str, feed: Arc<Feed>) -> bool {
        let mut entries = self.write();
        match entries.iter_mut().find(|e| e.url == url) {
            Some(entry) => {
                entry.feed = Some(feed);
                true
            }
            None => false,
        }
    }
}
