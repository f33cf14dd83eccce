//! Page fetching and prefetch warming on top of the blocking client.

use crate::client::Http11Client;
use crate::client::HttpClientConfig;
use crate::decode::decode_body;
use crate::http::HttpMethod;
use crate::http::HttpRequest;
use crate::http::HttpResponse;
use crate::http::HttpStatusCode;
use crate::url::PageUrl;
use hop_core::HopError;
use hop_core::HopResult;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;

const ACCEPT_DOCUMENT: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.8";
const ACCEPT_ENCODING: &str = "gzip, deflate, br";
const MAX_WARMED_PAGES: usize = 64;

/// Response of a completed fetch, after redirects and charset decoding.
///
/// Non-2xx statuses are returned as-is; deciding whether they are fatal is
/// left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: PageUrl,
    pub status: HttpStatusCode,
    pub content_type: String,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = HopResult<FetchedPage>> + 'a>>;

/// Issues one GET per call. Implementations may suspend; the navigator polls
/// the returned future on its own thread.
pub trait PageFetcher {
    fn fetch<'a>(&'a self, url: &'a PageUrl) -> FetchFuture<'a>;
}

/// Low-priority cache warming. Fire-and-forget: outcomes are only logged.
pub trait Prefetcher {
    fn prefetch(&self, url: &PageUrl);
}

/// Marks why a request is sent, which changes only its headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Navigate,
    Prefetch,
}

/// Successful prefetch responses keyed by the requested URL. Each entry is
/// handed out once, to the next fetch of that URL.
#[derive(Debug, Clone, Default)]
struct WarmedPages {
    pages: Arc<Mutex<HashMap<PageUrl, FetchedPage>>>,
}

impl WarmedPages {
    /// Returns false when the store is full (or poisoned) and `page` was dropped.
    fn store(&self, url: &PageUrl, page: FetchedPage) -> bool {
        let Ok(mut pages) = self.pages.lock() else {
            return false;
        };
        let key = url.without_fragment();
        if pages.len() >= MAX_WARMED_PAGES && !pages.contains_key(&key) {
            return false;
        }
        pages.insert(key, page);
        true
    }

    fn take(&self, url: &PageUrl) -> Option<FetchedPage> {
        self.pages.lock().ok()?.remove(&url.without_fragment())
    }
}

#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Arc<Http11Client>,
    warmed: WarmedPages,
}

impl HttpPageFetcher {
    pub fn new(config: HttpClientConfig) -> HopResult<Self> {
        Ok(Self {
            client: Arc::new(Http11Client::new(config)?),
            warmed: WarmedPages::default(),
        })
    }

    /// A prefetcher sharing this fetcher's client and warmed pages, so a
    /// navigation to a prefetched URL is answered without a second request.
    pub fn prefetcher(&self) -> HttpPrefetcher {
        HttpPrefetcher {
            client: Arc::clone(&self.client),
            warmed: self.warmed.clone(),
        }
    }

    /// Fetches on the calling thread.
    pub fn fetch_blocking(&self, url: &PageUrl) -> HopResult<FetchedPage> {
        fetch_page(&self.client, &self.warmed, url)
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch<'a>(&'a self, url: &'a PageUrl) -> FetchFuture<'a> {
        let client = Arc::clone(&self.client);
        let warmed = self.warmed.clone();
        let url = url.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || fetch_page(&client, &warmed, &url))
                .await
                .map_err(|error| {
                    HopError::new(
                        "net.fetch.task_failed",
                        format!("fetch task did not complete: {error}"),
                    )
                })?
        })
    }
}

/// Built by [`HttpPageFetcher::prefetcher`].
#[derive(Debug, Clone)]
pub struct HttpPrefetcher {
    client: Arc<Http11Client>,
    warmed: WarmedPages,
}

impl Prefetcher for HttpPrefetcher {
    fn prefetch(&self, url: &PageUrl) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(url = %url, "no async runtime available; prefetch skipped");
            return;
        };

        let client = Arc::clone(&self.client);
        let warmed = self.warmed.clone();
        let url = url.clone();
        // Detached: nobody awaits the handle.
        runtime.spawn_blocking(move || warm(&client, &warmed, &url));
    }
}

fn warm(client: &Http11Client, warmed: &WarmedPages, url: &PageUrl) {
    match fetch_following_redirects(client, url, Purpose::Prefetch) {
        Ok(page) if page.is_success() => {
            let bytes = page.body.len();
            if warmed.store(url, page) {
                tracing::debug!(url = %url, bytes, "prefetch warmed");
            } else {
                tracing::debug!(url = %url, "warmed page store full; prefetch discarded");
            }
        }
        Ok(page) => {
            tracing::warn!(url = %url, status = page.status.as_u16(), "prefetch rejected");
        }
        Err(error) => {
            tracing::warn!(url = %url, %error, "prefetch failed");
        }
    }
}

fn fetch_page(
    client: &Http11Client,
    warmed: &WarmedPages,
    url: &PageUrl,
) -> HopResult<FetchedPage> {
    if let Some(page) = warmed.take(url) {
        tracing::debug!(url = %url, "served from prefetch");
        return Ok(page);
    }
    fetch_following_redirects(client, url, Purpose::Navigate)
}

fn fetch_following_redirects(
    client: &Http11Client,
    url: &PageUrl,
    purpose: Purpose,
) -> HopResult<FetchedPage> {
    let max_redirects = client.config().max_redirects;
    let mut current = url.clone();

    for _ in 0..=max_redirects {
        let response = client.execute(build_request(&current, purpose)?)?;
        if !response.status.is_redirect() {
            return Ok(page_from_response(current, response));
        }

        let next = redirect_target(&current, &response)?;
        tracing::debug!(
            from = %current,
            to = %next,
            status = response.status.as_u16(),
            "following redirect"
        );
        current = next;
    }

    Err(HopError::new(
        "net.http.too_many_redirects",
        format!("`{url}` redirected more than {max_redirects} times"),
    ))
}

fn build_request(url: &PageUrl, purpose: Purpose) -> HopResult<HttpRequest> {
    let request = HttpRequest::new(HttpMethod::Get, url)?
        .with_header("Accept", ACCEPT_DOCUMENT)?
        .with_header("Accept-Language", ACCEPT_LANGUAGE)?
        .with_header("Accept-Encoding", ACCEPT_ENCODING)?;

    match purpose {
        Purpose::Navigate => Ok(request),
        Purpose::Prefetch => request.with_header("Sec-Purpose", "prefetch"),
    }
}

fn redirect_target(current: &PageUrl, response: &HttpResponse) -> HopResult<PageUrl> {
    let location = response.header("location").ok_or_else(|| {
        HopError::new(
            "net.http.redirect_location_missing",
            format!(
                "redirect status {} from `{current}` has no Location header",
                response.status.as_u16()
            ),
        )
    })?;
    current.join(location)
}

fn page_from_response(url: PageUrl, response: HttpResponse) -> FetchedPage {
    let content_type = response.content_type().to_owned();
    let body = decode_body(&response.body, &content_type);
    FetchedPage {
        url,
        status: response.status,
        content_type,
        body,
    }
}
