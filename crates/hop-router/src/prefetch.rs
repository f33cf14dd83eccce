//! The "already requested" prefetch set and link discovery.

use hop_dom::Document;
use hop_dom::Element;
use hop_net::PageUrl;
use std::collections::HashSet;

/// URLs handed to the prefetcher, in issue order. Append-only.
#[derive(Debug, Clone, Default)]
pub(crate) struct PrefetchCache {
    order: Vec<PageUrl>,
    seen: HashSet<PageUrl>,
}

impl PrefetchCache {
    pub(crate) fn contains(&self, url: &PageUrl) -> bool {
        self.seen.contains(url)
    }

    /// Returns false when `url` was already recorded.
    pub(crate) fn insert(&mut self, url: PageUrl) -> bool {
        if !self.seen.insert(url.clone()) {
            return false;
        }
        self.order.push(url);
        true
    }

    pub(crate) fn urls(&self) -> &[PageUrl] {
        &self.order
    }
}

/// Links in `document` worth warming: same origin as `location`, no
/// fragment, not the current page, not already requested. Each URL appears
/// once, in document order.
pub(crate) fn discover(
    document: &Document,
    location: &PageUrl,
    cache: &PrefetchCache,
) -> Vec<PageUrl> {
    let mut found: Vec<PageUrl> = Vec::new();

    for href in document.link_hrefs() {
        let Ok(url) = location.join(href) else {
            continue;
        };
        if !url.same_origin(location)
            || url.has_fragment()
            || is_current(&url, location)
            || cache.contains(&url)
            || found.contains(&url)
        {
            continue;
        }
        found.push(url);
    }

    found
}

/// `/docs` and `/docs/` both count as the page at `/docs/`.
fn is_current(candidate: &PageUrl, location: &PageUrl) -> bool {
    let current = location.without_fragment();
    candidate.same_document(&current)
        || trim_slash(candidate.as_str()) == trim_slash(current.as_str())
}

fn trim_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

/// Head marker recording that `url` was prefetched.
pub(crate) fn marker(url: &PageUrl) -> Element {
    Element::new("link")
        .with_attr("rel", "prefetch")
        .with_attr("href", url.as_str())
}
