//! Publish/subscribe surface for the host application.
//!
//! Listeners are either synchronous callbacks registered for one event kind
//! or channel subscribers receiving every event. Delivery order between
//! different feeds within one cycle is unspecified.

use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::feed::{Feed, Item};
use crate::poller::PollError;

/// Notifications raised by the watcher.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// An item whose link was not in the feed's previous poll.
    NewItem { item: Item, feed: Arc<Feed> },
    /// A feed's pipeline failed; other feeds are unaffected.
    Error(Arc<PollError>),
    /// A scheduled cycle is starting.
    Updating,
}

impl FeedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            FeedEvent::NewItem { .. } => EventKind::NewItem,
            FeedEvent::Error(_) => EventKind::Error,
            FeedEvent::Updating => EventKind::Updating,
        }
    }
}

/// Event names as exposed to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewItem,
    Error,
    Updating,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::NewItem => "newItem",
            EventKind::Error => "error",
            EventKind::Updating => "updating",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newItem" => Ok(EventKind::NewItem),
            "error" => Ok(EventKind::Error),
            "updating" => Ok(EventKind::Updating),
            other => Err(format!("unknown event name: {other}")),
        }
    }
}

type Callback = Arc<dyn Fn(&FeedEvent) + Send + Sync>;

enum Listener {
    Callback { kind: EventKind, callback: Callback },
    Channel(mpsc::UnboundedSender<FeedEvent>),
}

/// Shared listener list. Clones publish to the same listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for one kind of event.
    ///
    /// Callbacks run synchronously on the task that publishes the event and
    /// must not block.
    pub fn on<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        self.lock().push(Listener::Callback {
            kind,
            callback: Arc::new(callback),
        });
    }

    /// Registers a callback receiving each new item with its feed.
    pub fn on_new_item<F>(&self, callback: F)
    where
        F: Fn(&Item, &Feed) + Send + Sync + 'static,
    {
        self.on(EventKind::NewItem, move |event| {
            if let FeedEvent::NewItem { item, feed } = event {
                callback(item, feed);
            }
        });
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&PollError) + Send + Sync + 'static,
    {
        self.on(EventKind::Error, move |event| {
            if let FeedEvent::Error(err) = event {
                callback(err);
            }
        });
    }

    pub fn on_updating<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventKind::Updating, move |_| callback());
    }

    /// Returns a receiver for every event published from now on.
    ///
    /// Dropping the receiver unsubscribes it.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FeedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(Listener::Channel(tx));
        rx
    }

    pub fn publish(&self, event: FeedEvent) {
        let kind = event.kind();
        let callbacks: Vec<Callback> = {
            let mut listeners = self.lock();
            listeners.retain(|l| match l {
                Listener::Channel(tx) => tx.send(event.clone()).is_ok(),
                Listener::Callback { .. } => true,
            });
            listeners
                .iter()
                .filter_map(|l| match l {
                    Listener::Callback { kind: k, callback } if *k == kind => {
                        Some(Arc::clone(callback))
                    }
                    _ => None,
                })
                .collect()
        };

        // Outside the lock so callbacks may register further listeners.
        for callback in callbacks {
            callback(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
