use serde::{Deserialize, Serialize};

/// Canonical form of one syndication source, RSS or Atom alike.
///
/// A `Feed` is rebuilt from scratch on every successful poll and never
/// mutated once it has been stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub title: Option<String>,
    /// Human-facing page of the source.
    pub link: Option<String>,
    /// The feed's own canonical URL. Only Atom declares one.
    pub self_url: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    /// URL the feed was fetched from.
    pub source: String,
    /// `None` when the entry list could not be read as a collection.
    pub items: Option<Vec<Item>>,
}

impl Feed {
    /// Items as a slice; a feed without an entry list has none.
    pub fn items(&self) -> &[Item] {
        self.items.as_deref().unwrap_or_default()
    }
}

/// One entry of a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub title: Option<String>,
    /// Date text exactly as the source wrote it.
    pub published_at: Option<String>,
    /// Identity of the item for new-item detection.
    pub link: Option<String>,
    pub guid: Option<String>,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    /// Full HTML body, kept apart from `description`.
    pub content: Option<String>,
    pub categories: Vec<String>,
}
