//! Poll cycle: fetch, normalize, enrich, diff, emit and store, per feed URL.
//!
//! Every registered URL runs its own pipeline. A failure ends that pipeline
//! with an [`FeedEvent::Error`] and leaves the other feeds alone.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

use crate::events::{EventBus, FeedEvent};
use crate::feed::{parse_feed, Feed, FetchError, Fetcher, ImageEnricher, Item, ParseError};
use crate::store::FeedStore;

/// Upper bound on pipelines running at once within one cycle.
const MAX_CONCURRENT_FETCHES: usize = 10;

/// Predicate deciding whether a new item is announced.
pub type ItemFilter = Arc<dyn Fn(&Item, &Feed) -> bool + Send + Sync>;

/// A failed pipeline for one feed URL.
#[derive(Debug, Error)]
#[error("{url}: {kind}")]
pub struct PollError {
    /// Feed URL whose pipeline failed
    pub url: String,
    #[source]
    pub kind: PollErrorKind,
}

#[derive(Debug, Error)]
pub enum PollErrorKind {
    /// The feed itself could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// The feed body is not a readable RSS/Atom document
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    /// The page of one item could not be fetched for its image
    #[error("image lookup for {link} failed: {error}")]
    Enrichment {
        link: String,
        #[source]
        error: FetchError,
    },
}

/// How one URL's pipeline ended.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// First poll of the URL; its items became the baseline.
    Baseline { items: usize },
    /// Diffed against the baseline; `new_items` notifications were emitted.
    Updated { new_items: usize },
    Failed(Arc<PollError>),
    /// The URL's previous pipeline was still running.
    Skipped,
    /// The URL was unregistered while its pipeline ran.
    Removed,
}

/// Outcome of one URL in a cycle.
#[derive(Debug, Clone)]
pub struct PollResult {
    pub url: String,
    pub outcome: PollOutcome,
}

/// Items of `current` whose link does not occur in `previous`, in order.
///
/// Only additions count; items that disappeared are not reported.
pub fn diff_new_items<'a>(previous: &Feed, current: &'a Feed) -> Vec<&'a Item> {
    let seen: HashSet<Option<&str>> = previous
        .items()
        .iter()
        .map(|item| item.link.as_deref())
        .collect();

    current
        .items()
        .iter()
        .filter(|item| !seen.contains(&item.link.as_deref()))
        .collect()
}

/// Marks a URL as busy until dropped.
struct InFlightGuard {
    busy: Arc<Mutex<HashSet<String>>>,
    url: String,
}

impl InFlightGuard {
    fn acquire(busy: &Arc<Mutex<HashSet<String>>>, url: &str) -> Option<Self> {
        let inserted = busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_owned());
        inserted.then(|| Self {
            busy: Arc::clone(busy),
            url: url.to_owned(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.url);
    }
}

/// Runs poll cycles over the URLs registered in a [`FeedStore`].
///
/// The poller is the only writer of stored feeds. Clones share the store,
/// the bus, the filter and the in-flight set.
#[derive(Clone)]
pub struct Poller {
    store: FeedStore,
    bus: EventBus,
    fetcher: Fetcher,
    enricher: Option<Arc<ImageEnricher>>,
    filter: Arc<RwLock<Option<ItemFilter>>>,
    item_limit: Option<usize>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("feeds", &self.store.len())
            .field("enrich_images", &self.enricher.is_some())
            .field("item_limit", &self.item_limit)
            .finish()
    }
}

impl Poller {
    pub fn new(store: FeedStore, bus: EventBus, fetcher: Fetcher) -> Self {
        Self {
            store,
            bus,
            fetcher,
            enricher: None,
            filter: Arc::new(RwLock::new(None)),
            item_limit: None,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Keeps only the first `limit` items of every feed.
    pub fn with_item_limit(mut self, limit: Option<usize>) -> Self {
        self.item_limit = limit;
        self
    }

    pub fn with_enricher(mut self, enricher: ImageEnricher) -> Self {
        self.enricher = Some(Arc::new(enricher));
        self
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Only items accepted by `filter` are announced. Stored feeds are not
    /// affected.
    pub fn set_filter<F>(&self, filter: F)
    where
        F: Fn(&Item, &Feed) -> bool + Send + Sync + 'static,
    {
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(filter));
    }

    pub fn clear_filter(&self) {
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn current_filter(&self) -> Option<ItemFilter> {
        self.filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one cycle over every registered URL.
    ///
    /// Pipelines run concurrently (up to 10 at a time) and results come back
    /// in completion order, not registration order.
    pub async fn run_cycle(&self) -> Vec<PollResult> {
        let urls = self.store.list();
        if urls.is_empty() {
            return Vec::new();
        }

        let total = urls.len();
        let results: Vec<PollResult> = stream::iter(urls)
            .map(|url| self.poll_one(url))
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;

        let failed = results
            .iter()
            .filter(|r| matches!(r.outcome, PollOutcome::Failed(_)))
            .count();
        let new_items: usize = results
            .iter()
            .map(|r| match r.outcome {
                PollOutcome::Updated { new_items } => new_items,
                _ => 0,
            })
            .sum();
        tracing::info!(
            feeds = total,
            failed = failed,
            new_items = new_items,
            "Poll cycle complete"
        );

        results
    }

    /// Runs the pipeline for a single URL, unless it is already running.
    pub async fn poll_one(&self, url: String) -> PollResult {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &url) else {
            tracing::debug!(feed = %url, "Previous poll still running, skipping");
            return PollResult {
                url,
                outcome: PollOutcome::Skipped,
            };
        };

        let outcome = match self.pipeline(&url).await {
            Ok(outcome) => outcome,
            Err(kind) => PollOutcome::Failed(self.report(&url, kind)),
        };

        PollResult { url, outcome }
    }

    async fn pipeline(&self, url: &str) -> Result<PollOutcome, PollErrorKind> {
        let page = self.fetcher.get(url).await?;
        let mut feed = parse_feed(&page.body, url, self.item_limit)?;
        tracing::debug!(feed = %url, items = feed.items().len(), "Feed normalized");

        if let Some(enricher) = &self.enricher {
            for failure in enricher.enrich(&mut feed).await {
                self.report(
                    url,
                    PollErrorKind::Enrichment {
                        link: failure.link,
                        error: failure.error,
                    },
                );
            }
        }

        let Some(previous) = self.store.snapshot(url) else {
            tracing::debug!(feed = %url, "Feed unregistered during poll, dropping result");
            return Ok(PollOutcome::Removed);
        };

        // An unreadable entry list keeps the last readable one as baseline.
        if feed.items.is_none() {
            if let Some(previous) = previous.as_deref() {
                tracing::debug!(feed = %url, "Entry list unreadable, keeping previous items");
                feed.items.clone_from(&previous.items);
            }
        }

        let feed = Arc::new(feed);
        let outcome = match previous.as_deref() {
            None => PollOutcome::Baseline {
                items: feed.items().len(),
            },
            Some(previous) => PollOutcome::Updated {
                new_items: self.emit_new_items(previous, &feed),
            },
        };

        if !self.store.replace(url, feed) {
            return Ok(PollOutcome::Removed);
        }
        Ok(outcome)
    }

    fn emit_new_items(&self, previous: &Feed, feed: &Arc<Feed>) -> usize {
        let filter = self.current_filter();
        let mut emitted = 0;

        for item in diff_new_items(previous, feed) {
            if filter.as_ref().is_some_and(|accept| !accept(item, feed)) {
                continue;
            }
            self.bus.publish(FeedEvent::NewItem {
                item: item.clone(),
                feed: Arc::clone(feed),
            });
            emitted += 1;
        }

        emitted
    }

    fn report(&self, url: &str, kind: PollErrorKind) -> Arc<PollError> {
        let err = Arc::new(PollError {
            url: url.to_owned(),
            kind,
        });
        tracing::warn!(feed = %url, error = %err.kind, "Feed poll failed");
        self.bus.publish(FeedEvent::Error(Arc::clone(&err)));
        err
    }
}
