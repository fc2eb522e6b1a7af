//! Recovers missing thumbnails from the Open Graph tags of linked pages.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

use super::fetcher::{FetchError, Fetcher};
use super::model::Feed;

/// Thumbnails that already look like images are left alone.
static IMAGE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)png|jpg|jpeg").expect("valid image pattern"));

static OG_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)property=["']og:image["'][^<>]*?content=["']([^"'\s]+)["']"#)
        .expect("valid og:image pattern")
});

// Same tag with the attributes the other way round.
static OG_IMAGE_REV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)content=["']([^"'\s]+)["'][^<>]*?property=["']og:image["']"#)
        .expect("valid og:image pattern")
});

/// A failed secondary fetch for one item.
#[derive(Debug)]
pub struct EnrichFailure {
    pub link: String,
    pub error: FetchError,
}

/// Fills in item thumbnails by fetching each item's page.
///
/// With caching on, each link is fetched at most once for the lifetime of
/// the enricher, and "no image found" is remembered as well.
#[derive(Debug)]
pub struct ImageEnricher {
    fetcher: Fetcher,
    cache: Option<Mutex<HashMap<String, Option<String>>>>,
}

impl ImageEnricher {
    pub fn new(fetcher: Fetcher, cache_images: bool) -> Self {
        Self {
            fetcher,
            cache: cache_images.then(|| Mutex::new(HashMap::new())),
        }
    }

    /// Whether a thumbnail needs to be looked up again.
    pub fn needs_image(thumbnail: Option<&str>) -> bool {
        !thumbnail.is_some_and(|t| IMAGE_URL.is_match(t))
    }

    /// Enriches the feed's items one after another.
    ///
    /// Items without a link are skipped. A failed fetch clears that item's
    /// thumbnail and is returned to the caller; the other items still run.
    pub async fn enrich(&self, feed: &mut Feed) -> Vec<EnrichFailure> {
        let mut failures = Vec::new();
        let Some(items) = feed.items.as_mut() else {
            return failures;
        };

        for item in items.iter_mut() {
            if !Self::needs_image(item.thumbnail.as_deref()) {
                continue;
            }
            let Some(link) = item.link.as_deref() else {
                continue;
            };

            match self.og_image(link).await {
                Ok(image) => item.thumbnail = image,
                Err(error) => {
                    tracing::warn!(link = %link, error = %error, "Image enrichment failed");
                    item.thumbnail = None;
                    failures.push(EnrichFailure {
                        link: link.to_owned(),
                        error,
                    });
                }
            }
        }

        failures
    }

    /// Open Graph image of the page at `link`, using the cache when enabled.
    pub async fn og_image(&self, link: &str) -> Result<Option<String>, FetchError> {
        if let Some(hit) = self.cached(link) {
            tracing::debug!(link = %link, "Image cache hit");
            return Ok(hit);
        }

        let page = self.fetcher.get(link).await?;
        let image = extract_og_image(&page.body);

        if let Some(cache) = &self.cache {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(link.to_owned(), image.clone());
        }
        Ok(image)
    }

    fn cached(&self, link: &str) -> Option<Option<String>> {
        let cache = self.cache.as_ref()?;
        cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(link)
            .cloned()
    }
}

/// First Open Graph image URL in an HTML document.
pub fn extract_og_image(html: &str) -> Option<String> {
    [&*OG_IMAGE, &*OG_IMAGE_REV]
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}
