//! The reconstruction pipeline: eligibility, fetch, parse, merge, settle.

use crate::capability::Capabilities;
use crate::capability::HostWindow;
use crate::event::EventBus;
use crate::event::NavigationEvent;
use crate::intent::ClickEvent;
use crate::intent::IntentRecord;
use crate::intent::NavigationIntent;
use crate::intent::NavigationKind;
use crate::intent::decode_click;
use crate::intent::decode_pop;
use crate::options::NavigatorOptions;
use crate::prefetch;
use crate::prefetch::PrefetchCache;
use hop_core::HopError;
use hop_core::HopResult;
use hop_dom::Document;
use hop_dom::merge_head;
use hop_html::MarkupParser;
use hop_js::ScriptRunner;
use hop_js::ScriptSource;
use hop_net::FetchedPage;
use hop_net::PageFetcher;
use hop_net::PageUrl;
use hop_net::Prefetcher;
use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;
use tokio::sync::mpsc;

/// How one reconstruction cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The destination document is live.
    Settled,
    /// Ineligible: unknown kind, unusable target, or the current document.
    Skipped,
    /// The navigator was disabled when the intent arrived.
    Disabled,
    /// A newer cycle started while this one was fetching (single-flight only).
    Superseded,
    Failed(HopError),
}

/// Services the navigator calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub window: Rc<dyn HostWindow>,
    pub fetcher: Rc<dyn PageFetcher>,
    pub prefetcher: Rc<dyn Prefetcher>,
    pub scripts: Rc<dyn ScriptRunner>,
}

/// Destination page after fetching, before any live mutation.
struct FetchedDocument {
    url: PageUrl,
    document: Document,
    scripts: Vec<ScriptSource>,
}

enum Reconstruction {
    Settled,
    Superseded,
}

/// Intercepts navigations and rebuilds the live document in place.
///
/// The navigator is single-threaded (`!Send`): all state sits in `Cell` or
/// `RefCell` and cycles are futures polled on the owning thread. No borrow
/// of that state is held across an `.await`.
pub struct Navigator {
    options: NavigatorOptions,
    capabilities: Capabilities,
    window: Rc<dyn HostWindow>,
    fetcher: Rc<dyn PageFetcher>,
    prefetcher: Rc<dyn Prefetcher>,
    scripts: Rc<dyn ScriptRunner>,
    parser: MarkupParser,
    document: RefCell<Document>,
    /// URL of the document currently merged in; trails the address bar
    /// while a cycle is in flight.
    shown: RefCell<PageUrl>,
    enabled: Cell<bool>,
    prefetched: RefCell<PrefetchCache>,
    events: EventBus,
    latest_cycle: Cell<u64>,
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("options", &self.options)
            .field("capabilities", &self.capabilities)
            .field("shown", &self.shown.borrow().as_str())
            .field("enabled", &self.enabled.get())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl Navigator {
    /// Builds a navigator over the live `document` currently shown in
    /// `collaborators.window`. Never fails: without history support the
    /// navigator starts disabled.
    pub fn initialize(
        options: NavigatorOptions,
        capabilities: Capabilities,
        collaborators: Collaborators,
        document: Document,
    ) -> Self {
        let shown = collaborators.window.location();
        let navigator = Self {
            options,
            capabilities,
            window: collaborators.window,
            fetcher: collaborators.fetcher,
            prefetcher: collaborators.prefetcher,
            scripts: collaborators.scripts,
            parser: MarkupParser,
            document: RefCell::new(document),
            shown: RefCell::new(shown),
            enabled: Cell::new(capabilities.supports_history),
            prefetched: RefCell::new(PrefetchCache::default()),
            events: EventBus::default(),
            latest_cycle: Cell::new(0),
        };

        if !capabilities.supports_history {
            tracing::warn!(
                code = "router.history_unsupported",
                "history API unavailable; navigation interception disabled"
            );
            return navigator;
        }

        let issued = navigator.refresh_prefetch();
        tracing::debug!(issued, "navigator initialized");
        navigator
    }

    pub fn options(&self) -> NavigatorOptions {
        self.options
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Toggles interception. Cycles already past eligibility keep running.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
        tracing::info!(enabled, "navigator toggled");
    }

    pub fn location(&self) -> PageUrl {
        self.window.location()
    }

    pub fn title(&self) -> Option<String> {
        self.document.borrow().title()
    }

    pub fn with_document<R>(&self, read: impl FnOnce(&Document) -> R) -> R {
        read(&self.document.borrow())
    }

    /// URLs handed to the prefetcher so far, in issue order.
    pub fn prefetched_urls(&self) -> Vec<PageUrl> {
        self.prefetched.borrow().urls().to_vec()
    }

    pub fn on_event(&self, listener: impl Fn(&NavigationEvent) + 'static) {
        self.events.on_event(listener);
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<NavigationEvent> {
        self.events.subscribe()
    }

    /// Navigates to `path`, resolved against the current location.
    pub async fn navigate_to(&self, path: &str) -> NavigationOutcome {
        if !self.enabled.get() {
            tracing::info!(path, "navigator disabled; programmatic navigation ignored");
            return NavigationOutcome::Disabled;
        }

        let prev = self.window.location();
        match prev.join(path) {
            Ok(next) => {
                self.run_cycle(NavigationIntent::new(NavigationKind::Programmatic, next, prev))
                    .await
            }
            Err(error) => {
                tracing::error!(path, %error, "cannot resolve navigation target");
                NavigationOutcome::Failed(error)
            }
        }
    }

    /// Moves the host history back; the host reports the pop afterwards.
    pub fn go_back(&self) -> bool {
        self.window.back()
    }

    pub fn go_forward(&self) -> bool {
        self.window.forward()
    }

    /// Returns `None` when the click is left to the host.
    pub async fn handle_click(&self, event: &ClickEvent) -> Option<NavigationOutcome> {
        let intent = decode_click(event, &self.window.location())?;
        Some(self.run_cycle(intent).await)
    }

    /// The host's history cursor moved (back/forward).
    pub async fn handle_pop_state(&self) -> NavigationOutcome {
        let shown = self.shown.borrow().clone();
        self.run_cycle(decode_pop(&self.window.location(), &shown)).await
    }

    /// Entry point for external intent decoders.
    pub async fn handle_intent_record(&self, record: &IntentRecord) -> NavigationOutcome {
        if !self.enabled.get() {
            tracing::info!(
                kind = %record.kind,
                next = %record.next,
                "navigator disabled; intent ignored"
            );
            return NavigationOutcome::Disabled;
        }

        let Some(kind) = NavigationKind::from_name(&record.kind) else {
            tracing::debug!(kind = %record.kind, "unknown navigation kind; skipped");
            return NavigationOutcome::Skipped;
        };

        let location = self.window.location();
        let resolved = location
            .join(&record.next)
            .and_then(|next| Ok((next, location.join(&record.prev)?)));
        match resolved {
            Ok((next, prev)) => self.run_cycle(NavigationIntent::new(kind, next, prev)).await,
            Err(error) => {
                tracing::warn!(%error, "unusable intent record; skipped");
                NavigationOutcome::Skipped
            }
        }
    }

    /// Runs one reconstruction cycle.
    ///
    /// Cycles are not serialized: two overlapping cycles both fetch and both
    /// merge, so the last merge wins and the address bar may show a newer
    /// URL than the document does. `single_flight` opts into discarding the
    /// older cycle after its fetch.
    pub async fn run_cycle(&self, intent: NavigationIntent) -> NavigationOutcome {
        if !self.enabled.get() {
            tracing::info!(
                kind = %intent.kind,
                next = %intent.next,
                "navigator disabled; intent ignored"
            );
            return NavigationOutcome::Disabled;
        }

        if intent.is_same_document() {
            tracing::debug!(
                kind = %intent.kind,
                next = %intent.next,
                "target is the current document; skipped"
            );
            return NavigationOutcome::Skipped;
        }

        let token = self.latest_cycle.get() + 1;
        self.latest_cycle.set(token);
        let started = Instant::now();

        self.events.emit(NavigationEvent::FetchStart {
            url: intent.next.clone(),
        });

        match self.reconstruct(&intent, token).await {
            Ok(Reconstruction::Settled) => {
                if self.options.verbose_logging {
                    tracing::debug!(
                        next = %intent.next,
                        elapsed_ms = started.elapsed().as_millis(),
                        "cycle settled"
                    );
                }
                tracing::info!(kind = %intent.kind, url = %intent.next, "navigation settled");
                NavigationOutcome::Settled
            }
            Ok(Reconstruction::Superseded) => {
                tracing::info!(
                    url = %intent.next,
                    token,
                    "newer navigation started; merge dropped"
                );
                NavigationOutcome::Superseded
            }
            Err(error) => {
                if self.options.verbose_logging {
                    tracing::debug!(
                        next = %intent.next,
                        elapsed_ms = started.elapsed().as_millis(),
                        "cycle failed"
                    );
                }
                tracing::error!(
                    kind = %intent.kind,
                    url = %intent.next,
                    %error,
                    "navigation failed"
                );
                self.events.emit(NavigationEvent::NavigationError {
                    url: intent.next.clone(),
                    error: error.clone(),
                });
                NavigationOutcome::Failed(error)
            }
        }
    }

    async fn reconstruct(
        &self,
        intent: &NavigationIntent,
        token: u64,
    ) -> HopResult<Reconstruction> {
        // Optimistic: the address bar moves before the fetch resolves. Pops
        // already moved the host cursor.
        if intent.kind != NavigationKind::Pop {
            self.window.push_history(&intent.next)?;
        }

        let fetched = self.fetch_document(&intent.next).await?;

        if self.options.single_flight && token != self.latest_cycle.get() {
            return Ok(Reconstruction::Superseded);
        }

        self.merge(intent, fetched)?;

        match intent.kind {
            NavigationKind::Pop => self.window.restore_scroll(),
            NavigationKind::Link | NavigationKind::Programmatic => self.window.scroll_to_top(),
        }
        *self.shown.borrow_mut() = intent.next.clone();
        self.events.emit(NavigationEvent::NavigationEnd {
            url: intent.next.clone(),
        });
        self.refresh_prefetch();

        Ok(Reconstruction::Settled)
    }

    /// Fetches and parses the destination plus the external scripts it will
    /// run, so that merging never waits on the network.
    async fn fetch_document(&self, url: &PageUrl) -> HopResult<FetchedDocument> {
        let page = expect_success(self.fetcher.fetch(url).await?)?;
        let document = self.parser.parse(&page.body);

        let mut scripts = Vec::new();
        for (index, element) in document.rerunnable_scripts().into_iter().enumerate() {
            let script = match element.attr("src") {
                Some(src) => {
                    let src = page.url.join(src)?;
                    let fetched = expect_success(self.fetcher.fetch(&src).await?)?;
                    ScriptSource {
                        origin: src.as_str().to_owned(),
                        source: fetched.body,
                    }
                }
                None => ScriptSource {
                    origin: format!("inline:{}", index + 1),
                    source: element.text_content(),
                },
            };
            scripts.push(script);
        }

        Ok(FetchedDocument {
            url: page.url,
            document,
            scripts,
        })
    }

    fn merge(&self, intent: &NavigationIntent, fetched: FetchedDocument) -> HopResult<()> {
        let FetchedDocument {
            url,
            document: incoming,
            scripts,
        } = fetched;

        let (removed, appended) =
            merge_head(&mut self.document.borrow_mut().head, &incoming.head);
        tracing::debug!(url = %url, removed, appended, "head reconciled");

        let mut body = Some(incoming.body);
        let location = intent.next.as_str();
        let mut swap = || -> HopResult<()> {
            let mut live = self.document.borrow_mut();
            if let Some(body) = body.take() {
                live.replace_body(body);
            }
            for script in &scripts {
                self.scripts.run(script, &mut live, location)?;
            }
            Ok(())
        };

        if self.capabilities.supports_transitions && self.options.use_native_transitions {
            self.window.run_transition(&mut swap)
        } else {
            swap()
        }
    }

    /// Queues every eligible link of the live document for prefetching.
    /// Returns how many were newly issued.
    pub fn refresh_prefetch(&self) -> usize {
        if !self.options.prefetch {
            return 0;
        }

        // The merged document's own URL; under the race the address bar may
        // already show a newer one.
        let location = self.shown.borrow().clone();
        let candidates = {
            let document = self.document.borrow();
            let cache = self.prefetched.borrow();
            prefetch::discover(&document, &location, &cache)
        };

        for url in &candidates {
            self.document
                .borrow_mut()
                .append_to_head(prefetch::marker(url));
            self.prefetcher.prefetch(url);
            self.prefetched.borrow_mut().insert(url.clone());
            tracing::debug!(url = %url, "prefetch issued");
        }

        candidates.len()
    }
}

fn expect_success(page: FetchedPage) -> HopResult<FetchedPage> {
    if page.is_success() {
        return Ok(page);
    }

    Err(HopError::new(
        "net.http.status",
        format!(
            "`{}` answered with status {}",
            page.url,
            page.status.as_u16()
        ),
    ))
}
