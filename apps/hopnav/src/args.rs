use hop_net::PageUrl;
use std::path::PathBuf;

pub(crate) const USAGE: &str = "usage: hopnav [--config PATH] [--verbose] [--no-prefetch] \
[--transitions] [--single-flight] [--trust-store webpki|os] <start-url> [path|back|forward]...";

/// One scripted step after the start page loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Visit(String),
    Back,
    Forward,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliArgs {
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub no_prefetch: bool,
    pub transitions: bool,
    pub single_flight: bool,
    pub trust_store: Option<String>,
    pub start: PageUrl,
    pub steps: Vec<Step>,
}

pub(crate) fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut config = None;
    let mut verbose = false;
    let mut no_prefetch = false;
    let mut transitions = false;
    let mut single_flight = false;
    let mut trust_store = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| "missing path after --config".to_owned())?;
                config = Some(PathBuf::from(path));
            }
            "--trust-store" => {
                trust_store = Some(
                    args.next()
                        .ok_or_else(|| "missing mode after --trust-store".to_owned())?,
                );
            }
            "--verbose" | "-v" => verbose = true,
            "--no-prefetch" => no_prefetch = true,
            "--transitions" => transitions = true,
            "--single-flight" => single_flight = true,
            flag if flag.starts_with("--") => {
                return Err(format!("unknown flag `{flag}`\n{USAGE}"));
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let start = positional
        .next()
        .ok_or_else(|| format!("missing start URL\n{USAGE}"))?;
    let start = PageUrl::parse(&start).map_err(|error| error.to_string())?;
    let steps = positional
        .map(|step| match step.as_str() {
            "back" => Step::Back,
            "forward" => Step::Forward,
            _ => Step::Visit(step),
        })
        .collect();

    Ok(CliArgs {
        config,
        verbose,
        no_prefetch,
        transitions,
        single_flight,
        trust_store,
        start,
        steps,
    })
}
