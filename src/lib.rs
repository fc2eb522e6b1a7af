//! Polls RSS and Atom feeds, normalizes them into one [`Feed`]/[`Item`]
//! model and announces items that appeared since the previous poll.
//!
//! # Architecture
//!
//! - [`feed`] - fetching, XML tree, normalization and image enrichment
//! - [`store`] - registered URLs and their last known feed
//! - [`poller`] - one poll cycle: fetch → normalize → enrich → diff → emit → store
//! - [`scheduler`] - repeating timer around the poller
//! - [`events`] - named notifications for the host application
//! - [`config`] - TOML configuration
//!
//! The first successful poll of a URL only records a baseline. From then on,
//! an item is new when its link was not in the previous poll of that URL.
//! All state is in memory and lives as long as the [`FeedWatcher`].

pub mod config;
pub mod events;
pub mod feed;
pub mod poller;
pub mod scheduler;
pub mod store;
mod watcher;

pub use config::{Config, ConfigError};
pub use events::{EventBus, EventKind, FeedEvent};
pub use feed::{Feed, FetchError, Item, ParseError};
pub use poller::{diff_new_items, PollError, PollErrorKind, PollOutcome, PollResult, Poller};
pub use scheduler::Scheduler;
pub use store::{FeedKey, FeedStore, StoreError};
pub use watcher::FeedWatcher;
