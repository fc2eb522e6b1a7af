use crate::config::Config;
use crate::events::EventBus;
use crate::feed::{Feed, FetchError, Fetcher, ImageEnricher, Item};
use crate::poller::{PollResult, Poller};
use crate::scheduler::Scheduler;
use crate::store::FeedStore;

/// One self-contained feed watcher: registry, poller, timer and listeners.
///
/// Nothing runs until [`FeedWatcher::launch`] is awaited. Several watchers
/// can coexist; they share no state.
///
/// # Example
///
/// ```ignore
/// let watcher = FeedWatcher::new(&config)?;
/// watcher.events().on_new_item(|item, feed| {
///     println!("{:?}: {:?}", feed.title, item.title);
/// });
/// watcher.launch().await;
/// ```
#[derive(Debug)]
pub struct FeedWatcher {
    poller: Poller,
    scheduler: Scheduler,
    auto_update: bool,
}

impl FeedWatcher {
    /// Builds a watcher with its own HTTP client.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let fetcher = Fetcher::with_user_agent(&config.user_agent, config.request_timeout())?;
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Builds a watcher around an existing fetcher.
    ///
    /// Feed URLs from the config that are invalid or repeated are skipped
    /// with a warning.
    pub fn with_fetcher(config: &Config, fetcher: Fetcher) -> Self {
        let store = FeedStore::new();
        for url in &config.feeds {
            if let Err(e) = store.add(url) {
                tracing::warn!(feed = %url, error = %e, "Skipping configured feed");
            }
        }

        let mut poller = Poller::new(store, EventBus::new(), fetcher.clone())
            .with_item_limit(config.effective_item_limit());
        if config.extra_images {
            poller = poller.with_enricher(ImageEnricher::new(fetcher, config.cache_images));
        }

        let scheduler = Scheduler::new(poller.clone(), config.update_interval());

        Self {
            poller,
            scheduler,
            auto_update: config.auto_update,
        }
    }

    /// Runs the initial cycle, which records every feed's baseline, then
    /// starts the update timer if `auto_update` is set.
    ///
    /// Returns the results of the initial cycle.
    pub async fn launch(&self) -> Vec<PollResult> {
        let results = self.scheduler.update().await;
        if self.auto_update {
            self.scheduler.start();
        }
        results
    }

    pub fn feeds(&self) -> &FeedStore {
        self.poller.store()
    }

    pub fn events(&self) -> &EventBus {
        self.poller.events()
    }

    /// Timer control: `start`, `stop` and `update`.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn set_filter<F>(&self, filter: F)
    where
        F: Fn(&Item, &Feed) -> bool + Send + Sync + 'static,
    {
        self.poller.set_filter(filter);
    }

    pub fn clear_filter(&self) {
        self.poller.clear_filter();
    }
}
