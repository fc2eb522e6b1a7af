//! Feed ingestion: fetching, XML tree building, normalization and enrichment.
//!
//! - [`xml`] - generic element tree built with `quick-xml`
//! - [`normalize`] - RSS/Atom tree to canonical [`Feed`]
//! - [`fetcher`] - HTTP GET with timeout and size limit
//! - [`enrich`] - Open Graph thumbnail recovery
//!
//! # Example
//!
//! ```ignore
//! use feedwatch::feed::{parse_feed, Fetcher};
//!
//! let page = fetcher.get("https://example.com/feed.xml").await?;
//! let feed = parse_feed(&page.body, "https://example.com/feed.xml", Some(20))?;
//! ```

pub mod enrich;
pub mod fetcher;
mod model;
pub mod normalize;
pub mod xml;

pub use enrich::{extract_og_image, EnrichFailure, ImageEnricher};
pub use fetcher::{FetchError, FetchedBody, Fetcher};
pub use model::{Feed, Item};
pub use normalize::{normalize, parse_feed, ParseError};
