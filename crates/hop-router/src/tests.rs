use crate::capability::Capabilities;
use crate::event::NavigationEvent;
use crate::intent::ClickEvent;
use crate::intent::IntentRecord;
use crate::navigator::Collaborators;
use crate::navigator::NavigationOutcome;
use crate::navigator::Navigator;
use crate::options::NavigatorOptions;
use crate::window::HeadlessWindow;
use hop_core::HopError;
use hop_core::HopResult;
use hop_dom::Document;
use hop_dom::Element;
use hop_html::MarkupParser;
use hop_js::ScriptRunner;
use hop_js::ScriptSource;
use hop_net::FetchFuture;
use hop_net::FetchedPage;
use hop_net::HttpStatusCode;
use hop_net::PageFetcher;
use hop_net::PageUrl;
use hop_net::Prefetcher;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::Notify;

const ORIGIN: &str = "https://site.test";

const HOME: &str = "<title>Home</title>\
    <link rel=stylesheet href=/site.css>\
    <meta name=page content=home>\
    <body><nav><a href=/about>About</a> <a href=/blog/>Blog</a> \
    <a href=#top>Top</a> <a href=https://elsewhere.test/>Out</a></nav>\
    <h1>Home</h1></body>";

fn url(path: &str) -> PageUrl {
    match PageUrl::parse(&format!("{ORIGIN}{path}")) {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    }
}

#[derive(Clone, Default)]
struct Route {
    status: u16,
    body: String,
    /// Response is held until this is notified.
    gate: Option<Rc<Notify>>,
    /// Notified as soon as the request is issued.
    on_request: Vec<Rc<Notify>>,
    failure: Option<HopError>,
}

impl Route {
    fn ok(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_owned(),
            ..Self::default()
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            body: "<h1>Oops</h1>".to_owned(),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct ScriptedFetcher {
    routes: RefCell<HashMap<String, Route>>,
    requests: RefCell<Vec<String>>,
}

impl ScriptedFetcher {
    fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl PageFetcher for ScriptedFetcher {
    fn fetch<'a>(&'a self, url: &'a PageUrl) -> FetchFuture<'a> {
        self.requests.borrow_mut().push(url.path().to_owned());
        let route = self.routes.borrow().get(url.path()).cloned();
        Box::pin(async move {
            let route = route.unwrap_or_else(|| Route::status(404));
            for signal in &route.on_request {
                signal.notify_one();
            }
            if let Some(gate) = &route.gate {
                gate.notified().await;
            }
            if let Some(error) = route.failure {
                return Err(error);
            }

            let status = match HttpStatusCode::new(route.status) {
                Ok(value) => value,
                Err(error) => panic!("{error}"),
            };
            Ok(FetchedPage {
                url: url.clone(),
                status,
                content_type: "text/html".to_owned(),
                body: route.body,
            })
        })
    }
}

#[derive(Default)]
struct RecordingPrefetcher {
    urls: RefCell<Vec<String>>,
}

impl Prefetcher for RecordingPrefetcher {
    fn prefetch(&self, url: &PageUrl) {
        self.urls.borrow_mut().push(url.path().to_owned());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScriptRun {
    origin: String,
    source: String,
    body_at_run: String,
}

#[derive(Default)]
struct RecordingScripts {
    runs: RefCell<Vec<ScriptRun>>,
}

impl ScriptRunner for RecordingScripts {
    fn run(
        &self,
        script: &ScriptSource,
        document: &mut Document,
        _location: &str,
    ) -> HopResult<()> {
        self.runs.borrow_mut().push(ScriptRun {
            origin: script.origin.clone(),
            source: script.source.clone(),
            body_at_run: document.body.inner_html(),
        });
        if script.source.contains("throw") {
            return Err(HopError::new("js.script_failed", "script threw"));
        }
        Ok(())
    }
}

struct Harness {
    navigator: Navigator,
    window: Rc<HeadlessWindow>,
    fetcher: Rc<ScriptedFetcher>,
    prefetcher: Rc<RecordingPrefetcher>,
    scripts: Rc<RecordingScripts>,
    events: Rc<RefCell<Vec<NavigationEvent>>>,
}

impl Harness {
    fn new(
        options: NavigatorOptions,
        capabilities: Capabilities,
        routes: &[(&str, Route)],
    ) -> Self {
        let window = Rc::new(HeadlessWindow::new(url("/")));
        let fetcher = Rc::new(ScriptedFetcher::default());
        for (path, route) in routes {
            fetcher
                .routes
                .borrow_mut()
                .insert((*path).to_owned(), route.clone());
        }
        let prefetcher = Rc::new(RecordingPrefetcher::default());
        let scripts = Rc::new(RecordingScripts::default());

        let navigator = Navigator::initialize(
            options,
            capabilities,
            Collaborators {
                window: window.clone(),
                fetcher: fetcher.clone(),
                prefetcher: prefetcher.clone(),
                scripts: scripts.clone(),
            },
            MarkupParser.parse(HOME),
        );

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        navigator.on_event(move |event| sink.borrow_mut().push(event.clone()));

        Self {
            navigator,
            window,
            fetcher,
            prefetcher,
            scripts,
            events,
        }
    }

    fn with_routes(routes: &[(&str, Route)]) -> Self {
        Self::new(NavigatorOptions::default(), Capabilities::default(), routes)
    }

    /// `"<event> <path>"` per emitted event.
    fn event_log(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(|event| format!("{} {}", event.name(), event.url().path()))
            .collect()
    }

    fn body(&self) -> String {
        self.navigator.with_document(|document| document.body.inner_html())
    }

    fn history(&self) -> Vec<String> {
        self.window
            .history()
            .iter()
            .map(|url| url.path().to_owned())
            .collect()
    }
}

fn failed_code(outcome: NavigationOutcome) -> Option<&'static str> {
    match outcome {
        NavigationOutcome::Failed(error) => Some(error.code),
        _ => None,
    }
}

#[test]
fn initialization_prefetches_same_origin_links_once() {
    let harness = Harness::with_routes(&[]);
    assert!(harness.navigator.is_enabled());
    assert_eq!(*harness.prefetcher.urls.borrow(), vec!["/about", "/blog/"]);

    assert_eq!(harness.navigator.refresh_prefetch(), 0);
    assert_eq!(harness.navigator.refresh_prefetch(), 0);
    assert_eq!(harness.prefetcher.urls.borrow().len(), 2);

    let markers = harness.navigator.with_document(|document| {
        document
            .head
            .child_elements()
            .filter(|element| element.has_rel("prefetch"))
            .filter_map(|element| element.attr("href").map(str::to_owned))
            .collect::<Vec<_>>()
    });
    assert_eq!(
        markers,
        vec!["https://site.test/about", "https://site.test/blog/"]
    );
    assert_eq!(
        harness.navigator.prefetched_urls(),
        vec![url("/about"), url("/blog/")]
    );
}

#[test]
fn prefetch_option_off_issues_nothing() {
    let options = NavigatorOptions {
        prefetch: false,
        ..NavigatorOptions::default()
    };
    let harness = Harness::new(options, Capabilities::default(), &[]);
    assert_eq!(harness.navigator.refresh_prefetch(), 0);
    assert!(harness.prefetcher.urls.borrow().is_empty());
    assert!(harness.navigator.prefetched_urls().is_empty());
}

#[tokio::test]
async fn missing_history_support_starts_disabled() {
    let capabilities = Capabilities {
        supports_history: false,
        supports_transitions: false,
    };
    let harness = Harness::new(
        NavigatorOptions::default(),
        capabilities,
        &[("/about", Route::ok("<h1>About</h1>"))],
    );

    assert!(!harness.navigator.is_enabled());
    assert!(harness.prefetcher.urls.borrow().is_empty());
    assert_eq!(
        harness.navigator.navigate_to("/about").await,
        NavigationOutcome::Disabled
    );
    assert!(harness.fetcher.requests().is_empty());
}

#[tokio::test]
async fn about_page_end_to_end() {
    let harness = Harness::with_routes(&[(
        "/about",
        Route::ok("<title>About</title><h1>About</h1>"),
    )]);

    let outcome = harness.navigator.navigate_to("/about").await;

    assert_eq!(outcome, NavigationOutcome::Settled);
    assert_eq!(
        harness.event_log(),
        vec!["fetch-start /about", "navigation-end /about"]
    );
    assert_eq!(harness.navigator.title().as_deref(), Some("About"));
    assert_eq!(harness.body(), "<h1>About</h1>");
    assert_eq!(harness.navigator.location(), url("/about"));
    assert_eq!(harness.history(), vec!["/", "/about"]);
    assert_eq!(harness.fetcher.requests(), vec!["/about"]);
}

#[tokio::test]
async fn navigating_to_the_current_url_is_skipped() {
    let harness = Harness::with_routes(&[("/", Route::ok(HOME))]);

    assert_eq!(
        harness.navigator.navigate_to("/").await,
        NavigationOutcome::Skipped
    );
    assert_eq!(
        harness.navigator.navigate_to("/#top").await,
        NavigationOutcome::Skipped
    );
    assert!(harness.fetcher.requests().is_empty());
    assert!(harness.event_log().is_empty());
    assert_eq!(harness.history(), vec!["/"]);
}

#[tokio::test]
async fn disabled_navigator_is_inert() {
    let harness = Harness::with_routes(&[("/about", Route::ok("<h1>About</h1>"))]);
    harness.navigator.set_enabled(false);

    assert_eq!(
        harness.navigator.navigate_to("/about").await,
        NavigationOutcome::Disabled
    );
    let click = ClickEvent::on(Element::new("a").with_attr("href", "/about"));
    assert_eq!(
        harness.navigator.handle_click(&click).await,
        Some(NavigationOutcome::Disabled)
    );
    assert!(harness.fetcher.requests().is_empty());
    assert!(harness.event_log().is_empty());
    assert_eq!(harness.history(), vec!["/"]);

    harness.navigator.set_enabled(true);
    assert_eq!(
        harness.navigator.navigate_to("/about").await,
        NavigationOutcome::Settled
    );
}

#[tokio::test]
async fn pop_restores_scroll_and_links_reset_it() {
    let harness = Harness::with_routes(&[
        ("/", Route::ok(HOME)),
        ("/about", Route::ok("<title>About</title><h1>About</h1>")),
    ]);
    harness.window.scroll_to(300);

    assert_eq!(
        harness.navigator.navigate_to("/about").await,
        NavigationOutcome::Settled
    );
    assert_eq!(harness.window.scroll_y(), 0);
    harness.window.scroll_to(50);

    assert!(harness.navigator.go_back());
    assert_eq!(
        harness.navigator.handle_pop_state().await,
        NavigationOutcome::Settled
    );
    assert_eq!(harness.window.scroll_y(), 300);
    assert_eq!(harness.navigator.title().as_deref(), Some("Home"));

    assert!(harness.navigator.go_forward());
    assert_eq!(
        harness.navigator.handle_pop_state().await,
        NavigationOutcome::Settled
    );
    assert_eq!(harness.window.scroll_y(), 50);
    assert_eq!(harness.history(), vec!["/", "/about"]);
    assert_eq!(harness.fetcher.requests(), vec!["/about", "/", "/about"]);
}

#[tokio::test]
async fn scripts_run_once_each_after_body_replacement() {
    let harness = Harness::with_routes(&[
        (
            "/app",
            Route::ok(
                "<head><title>App</title><script data-reload>boot()</script></head>\
                 <body><div id=app>new</div><script>first()</script>\
                 <script type=application/json>{\"data\":1}</script>\
                 <script src=/app.js></script></body>",
            ),
        ),
        ("/app.js", Route::ok("second()")),
    ]);

    assert_eq!(
        harness.navigator.navigate_to("/app").await,
        NavigationOutcome::Settled
    );

    let runs = harness.scripts.runs.borrow().clone();
    let sources: Vec<&str> = runs.iter().map(|run| run.source.as_str()).collect();
    assert_eq!(sources, vec!["boot()", "first()", "second()"]);
    assert_eq!(runs[2].origin, "https://site.test/app.js");
    assert!(runs.iter().all(|run| run.body_at_run.contains("new")));
    assert_eq!(harness.fetcher.requests(), vec!["/app", "/app.js"]);
}

#[tokio::test]
async fn http_error_fails_the_cycle_with_one_notification() {
    let harness = Harness::with_routes(&[("/broken", Route::status(500))]);

    let outcome = harness.navigator.navigate_to("/broken").await;

    assert_eq!(failed_code(outcome), Some("net.http.status"));
    assert_eq!(
        harness.event_log(),
        vec!["fetch-start /broken", "navigation-error /broken"]
    );
    assert_eq!(harness.navigator.title().as_deref(), Some("Home"));
    // The history push happened before the fetch and is not undone.
    assert_eq!(harness.navigator.location(), url("/broken"));
}

#[tokio::test]
async fn transport_failure_is_reported_as_is() {
    let failure = Route {
        failure: Some(HopError::new(
            "net.transport.connect_failed",
            "connection refused",
        )),
        ..Route::default()
    };
    let harness = Harness::with_routes(&[("/down", failure)]);

    let outcome = harness.navigator.navigate_to("/down").await;
    assert_eq!(failed_code(outcome), Some("net.transport.connect_failed"));
    assert_eq!(harness.events.borrow().len(), 2);
}

#[tokio::test]
async fn script_failure_keeps_the_merged_body() {
    let harness = Harness::with_routes(&[(
        "/bad",
        Route::ok("<p>kept</p><script>throw 1</script><script>after()</script>"),
    )]);

    let outcome = harness.navigator.navigate_to("/bad").await;

    assert_eq!(failed_code(outcome), Some("js.script_failed"));
    assert_eq!(harness.scripts.runs.borrow().len(), 1);
    assert!(harness.body().starts_with("<p>kept</p>"));
    assert_eq!(
        harness.event_log(),
        vec!["fetch-start /bad", "navigation-error /bad"]
    );
}

#[tokio::test]
async fn native_transition_wraps_the_swap_when_opted_in() {
    let routes = [("/about", Route::ok("<h1>About</h1>"))];
    let capabilities = Capabilities {
        supports_history: true,
        supports_transitions: true,
    };

    let plain = Harness::new(NavigatorOptions::default(), capabilities, &routes);
    assert_eq!(
        plain.navigator.navigate_to("/about").await,
        NavigationOutcome::Settled
    );
    assert_eq!(plain.window.transitions_run(), 0);

    let options = NavigatorOptions {
        use_native_transitions: true,
        ..NavigatorOptions::default()
    };
    let animated = Harness::new(options, capabilities, &routes);
    assert_eq!(
        animated.navigator.navigate_to("/about").await,
        NavigationOutcome::Settled
    );
    assert_eq!(animated.window.transitions_run(), 1);
    assert_eq!(animated.body(), "<h1>About</h1>");
}

fn racing_routes(slow_started: &Rc<Notify>, slow_gate: &Rc<Notify>) -> Vec<(&'static str, Route)> {
    vec![
        (
            "/slow",
            Route {
                gate: Some(Rc::clone(slow_gate)),
                on_request: vec![Rc::clone(slow_started)],
                ..Route::ok("<title>Slow</title><p>slow</p>")
            },
        ),
        (
            "/fast",
            Route {
                on_request: vec![Rc::clone(slow_gate)],
                ..Route::ok("<title>Fast</title><p>fast</p>")
            },
        ),
    ]
}

#[tokio::test]
async fn overlapping_cycles_race_and_last_merge_wins() {
    let slow_started = Rc::new(Notify::new());
    let slow_gate = Rc::new(Notify::new());
    let harness = Harness::with_routes(&racing_routes(&slow_started, &slow_gate));

    let (slow, fast) = tokio::join!(harness.navigator.navigate_to("/slow"), async {
        slow_started.notified().await;
        harness.navigator.navigate_to("/fast").await
    });

    assert_eq!(slow, NavigationOutcome::Settled);
    assert_eq!(fast, NavigationOutcome::Settled);
    // The slower response merged last, so its document is shown while the
    // address bar points at the newer URL.
    assert_eq!(harness.navigator.title().as_deref(), Some("Slow"));
    assert_eq!(harness.navigator.location(), url("/fast"));
}

#[tokio::test]
async fn single_flight_supersedes_the_older_cycle() {
    let slow_started = Rc::new(Notify::new());
    let slow_gate = Rc::new(Notify::new());
    let options = NavigatorOptions {
        single_flight: true,
        ..NavigatorOptions::default()
    };
    let harness = Harness::new(
        options,
        Capabilities::default(),
        &racing_routes(&slow_started, &slow_gate),
    );

    let (slow, fast) = tokio::join!(harness.navigator.navigate_to("/slow"), async {
        slow_started.notified().await;
        harness.navigator.navigate_to("/fast").await
    });

    assert_eq!(slow, NavigationOutcome::Superseded);
    assert_eq!(fast, NavigationOutcome::Settled);
    assert_eq!(harness.navigator.title().as_deref(), Some("Fast"));
    assert_eq!(
        harness.event_log(),
        vec![
            "fetch-start /slow",
            "fetch-start /fast",
            "navigation-end /fast"
        ]
    );
}

#[tokio::test]
async fn unknown_intent_kinds_are_skipped() {
    let harness = Harness::with_routes(&[("/about", Route::ok("<h1>About</h1>"))]);

    let unknown = IntentRecord {
        kind: "reload".to_owned(),
        next: "/about".to_owned(),
        prev: "/".to_owned(),
    };
    assert_eq!(
        harness.navigator.handle_intent_record(&unknown).await,
        NavigationOutcome::Skipped
    );
    assert!(harness.fetcher.requests().is_empty());

    let link = IntentRecord {
        kind: "link".to_owned(),
        ..unknown
    };
    assert_eq!(
        harness.navigator.handle_intent_record(&link).await,
        NavigationOutcome::Settled
    );
}

#[tokio::test]
async fn clicks_are_decoded_before_interception() {
    let harness = Harness::with_routes(&[("/about", Route::ok("<h1>About</h1>"))]);

    let mut modified = ClickEvent::on(Element::new("a").with_attr("href", "/about"));
    modified.ctrl_key = true;
    assert_eq!(harness.navigator.handle_click(&modified).await, None);

    let external = ClickEvent::on(Element::new("a").with_attr("href", "https://elsewhere.test/"));
    assert_eq!(harness.navigator.handle_click(&external).await, None);
    assert!(harness.fetcher.requests().is_empty());

    let plain = ClickEvent::on(Element::new("a").with_attr("href", "/about"));
    assert_eq!(
        harness.navigator.handle_click(&plain).await,
        Some(NavigationOutcome::Settled)
    );
}

#[tokio::test]
async fn channel_subscribers_see_the_same_events() {
    let harness = Harness::with_routes(&[("/about", Route::ok("<h1>About</h1>"))]);
    let mut receiver = harness.navigator.subscribe();

    assert_eq!(
        harness.navigator.navigate_to("/about").await,
        NavigationOutcome::Settled
    );

    let mut names = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        names.push(event.name());
    }
    assert_eq!(names, vec!["fetch-start", "navigation-end"]);
}

#[tokio::test]
async fn head_reconciliation_keeps_shared_nodes_and_prefetch_markers() {
    let harness = Harness::with_routes(&[(
        "/about",
        Route::ok(
            "<title>About</title><link rel=stylesheet href=/site.css>\
             <meta name=page content=about><h1>About</h1>",
        ),
    )]);

    assert_eq!(
        harness.navigator.navigate_to("/about").await,
        NavigationOutcome::Settled
    );

    let head = harness.navigator.with_document(|document| document.head.inner_html());
    assert_eq!(head.matches("/site.css").count(), 1);
    assert!(head.contains("content=\"about\""));
    assert!(!head.contains("content=\"home\""));
    assert!(!head.contains("<title>Home</title>"));
    assert!(head.contains("rel=\"prefetch\""));
}

#[tokio::test]
async fn prefetch_refreshes_after_each_settle() {
    let harness = Harness::with_routes(&[(
        "/about",
        Route::ok("<h1>About</h1><a href=/team>Team</a><a href=/about>Self</a><a href=/>Home</a>"),
    )]);

    assert_eq!(
        harness.navigator.navigate_to("/about").await,
        NavigationOutcome::Settled
    );
    assert_eq!(
        *harness.prefetcher.urls.borrow(),
        vec!["/about", "/blog/", "/team", "/"]
    );
}

#[tokio::test]
async fn prefetch_resolves_links_against_the_merged_document() {
    let slow_started = Rc::new(Notify::new());
    let slow_gate = Rc::new(Notify::new());
    let harness = Harness::with_routes(&[
        (
            "/docs/slow",
            Route {
                gate: Some(Rc::clone(&slow_gate)),
                on_request: vec![Rc::clone(&slow_started)],
                ..Route::ok("<title>Slow</title><a href=intro>Intro</a><a href=slow>Self</a>")
            },
        ),
        (
            "/fast",
            Route {
                on_request: vec![Rc::clone(&slow_gate)],
                ..Route::ok("<title>Fast</title><p>fast</p>")
            },
        ),
    ]);

    let (slow, fast) = tokio::join!(harness.navigator.navigate_to("/docs/slow"), async {
        slow_started.notified().await;
        harness.navigator.navigate_to("/fast").await
    });
    assert_eq!(slow, NavigationOutcome::Settled);
    assert_eq!(fast, NavigationOutcome::Settled);
    assert_eq!(harness.navigator.location(), url("/fast"));

    let prefetched = harness.navigator.prefetched_urls();
    assert!(prefetched.contains(&url("/docs/intro")));
    assert!(!prefetched.contains(&url("/docs/slow")));
    assert!(!prefetched.contains(&url("/intro")));
    assert!(!prefetched.contains(&url("/slow")));
}
