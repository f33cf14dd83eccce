mod args;
mod config;

use args::CliArgs;
use args::Step;
use config::HopnavConfig;
use hop_html::MarkupParser;
use hop_js::JsRuntime;
use hop_net::HttpPageFetcher;
use hop_net::PageFetcher;
use hop_router::Capabilities;
use hop_router::Collaborators;
use hop_router::HeadlessWindow;
use hop_router::HostWindow;
use hop_router::NavigationOutcome;
use hop_router::Navigator;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// How long exit waits for prefetches still in flight.
const PREFETCH_GRACE: Duration = Duration::from_millis(500);

fn main() -> ExitCode {
    let args = match args::parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::from(2);
        }
    };

    init_tracing(args.verbose);

    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("hopnav: failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };
    let outcome = runtime.block_on(run(args));
    finish(runtime);

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("hopnav: {error}");
            ExitCode::FAILURE
        }
    }
}

/// The navigator is `!Send`, so everything runs on one thread.
fn build_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Prefetches are detached blocking tasks; abandon them after a short grace
/// period instead of waiting out their connect timeouts.
fn finish(runtime: Runtime) {
    runtime.shutdown_timeout(PREFETCH_GRACE);
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(args: &CliArgs) -> Result<HopnavConfig, String> {
    let config = match &args.config {
        Some(path) => HopnavConfig::load(path)?,
        None => HopnavConfig::default(),
    };
    Ok(config.apply_flags(args))
}

/// Returns `Ok(false)` when any scripted step failed.
async fn run(args: CliArgs) -> Result<bool, String> {
    let config = load_config(&args)?;
    let fetcher =
        HttpPageFetcher::new(config.http_client()?).map_err(|error| error.to_string())?;

    let start = fetcher
        .fetch(&args.start)
        .await
        .map_err(|error| error.to_string())?;
    if !start.is_success() {
        return Err(format!(
            "{} answered HTTP {}",
            start.url,
            start.status.as_u16()
        ));
    }
    tracing::info!(url = %start.url, status = start.status.as_u16(), "start page loaded");

    let document = MarkupParser.parse(&start.body);
    let window = Rc::new(HeadlessWindow::new(start.url.clone()));
    let collaborators = Collaborators {
        window: Rc::clone(&window) as Rc<dyn HostWindow>,
        prefetcher: Rc::new(fetcher.prefetcher()),
        fetcher: Rc::new(fetcher),
        scripts: Rc::new(JsRuntime::default()),
    };
    let navigator = Navigator::initialize(
        config.navigator,
        Capabilities::default(),
        collaborators,
        document,
    );
    navigator.on_event(|event| println!("{:<16} {}", event.name(), event.url().as_str()));
    report(&navigator, "start");

    let mut all_settled = true;
    for step in &args.steps {
        let outcome = match step {
            Step::Visit(path) => navigator.navigate_to(path).await,
            Step::Back if navigator.go_back() => navigator.handle_pop_state().await,
            Step::Forward if navigator.go_forward() => navigator.handle_pop_state().await,
            Step::Back | Step::Forward => {
                tracing::warn!(step = ?step, "no history entry in that direction");
                NavigationOutcome::Skipped
            }
        };
        match &outcome {
            NavigationOutcome::Settled => report(&navigator, "settled"),
            NavigationOutcome::Failed(error) => {
                all_settled = false;
                println!("failed           {error}");
            }
            other => println!("{other:?}"),
        }
    }

    println!(
        "history          {}",
        window
            .history()
            .iter()
            .map(|url| url.path())
            .collect::<Vec<_>>()
            .join(" ")
    );
    Ok(all_settled)
}

fn report(navigator: &Navigator, label: &str) {
    let title = navigator.title().unwrap_or_default();
    println!(
        "{label:<16} {} \"{title}\" ({} prefetched)",
        navigator.location().as_str(),
        navigator.prefetched_urls().len()
    );
}
