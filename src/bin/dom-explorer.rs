//! dom-explorer CLI.
//!
//! Opens a page in a local (or attached) Chromium and locates elements by
//! natural-language description.
//!
//! Usage examples:
//!   One-off lookup:
//!     $ MODEL_API_KEY=... cargo run --bin dom-explorer -- locate \
//!       --url https://example.com --prompt "The main heading of the page"
//!   Scrolling scrape of a feed:
//!     $ MODEL_API_KEY=... cargo run --bin dom-explorer -- timeline \
//!       --url https://news.ycombinator.com --root "#hnmain" \
//!       --items "The list of rows containing the story titles" \
//!       --field "title=The link with the story title"

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use dom_explorer::adapter::{ChromiumoxideBackend, RemoteElement};
use dom_explorer::config::{ExplorerConfig, ExplorerConfigOverrides, LoggerCallback, Verbosity};
use dom_explorer::explorer::DomExplorer;
use dom_explorer::llm::OpenAiChatProvider;
use dom_explorer::runtime::{ChromiumoxideRuntime, LaunchStrategy};
use dom_explorer::ElementBackend;
use log::{info, warn};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::time::sleep;

#[derive(Parser)]
#[command(
    name = "dom-explorer",
    author,
    version,
    about = "Locate DOM elements from natural-language descriptions"
)]
struct Cli {
    /// Log every trial at DEBUG; without it DOM_EXPLORER_VERBOSE applies.
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Show the launched browser window.
    #[arg(long, global = true)]
    show_browser: bool,

    /// Override the model-backed attempts per lookup.
    #[arg(long, global = true)]
    max_trials: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Locate one element (or all matches with --many) and print its text.
    Locate(LocateArgs),
    /// Scrape a scrolling list: extract fields from every item, scroll, repeat.
    Timeline(TimelineArgs),
}

#[derive(Args)]
struct LocateArgs {
    #[arg(long)]
    url: String,

    /// CSS selector of the element to search inside.
    #[arg(long, default_value = "body")]
    root: String,

    /// Natural-language description of the element(s).
    #[arg(long)]
    prompt: String,

    /// Return every match instead of a single element.
    #[arg(long)]
    many: bool,
}

#[derive(Args)]
struct TimelineArgs {
    #[arg(long)]
    url: String,

    /// CSS selector of the scrolling container.
    #[arg(long)]
    root: String,

    /// Description of the item elements inside the container.
    #[arg(long)]
    items: String,

    /// Field to extract from each item, as `label=description`. Repeatable.
    #[arg(long = "field", value_parser = parse_field, required = true)]
    fields: Vec<FieldSpec>,

    /// Stop after this many scroll rounds.
    #[arg(long, default_value_t = 20)]
    max_rounds: usize,

    /// Wait after each scroll before checking for new content.
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,
}

#[derive(Clone, Debug)]
struct FieldSpec {
    label: String,
    prompt: String,
}

fn parse_field(raw: &str) -> Result<FieldSpec, String> {
    let (label, prompt) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected label=description, got '{raw}'"))?;
    let (label, prompt) = (label.trim(), prompt.trim());
    if label.is_empty() || prompt.is_empty() {
        return Err(format!("label and description must be non-empty in '{raw}'"));
    }
    Ok(FieldSpec {
        label: label.to_string(),
        prompt: prompt.to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    let config = ExplorerConfig::from_env()
        .context("invalid explorer configuration")?
        .with_overrides(ExplorerConfigOverrides {
            verbose: verbosity_from_count(cli.verbose),
            logger: Some(Some(make_logger_callback())),
            headless: cli.show_browser.then_some(false),
            max_trials: cli.max_trials,
            ..ExplorerConfigOverrides::default()
        });

    let mut explorer =
        DomExplorer::from_config(&config).context("failed to construct explorer")?;

    let runtime = ChromiumoxideRuntime::new();
    runtime
        .start(&LaunchStrategy::from_config(&config))
        .await
        .context("failed to start browser")?;

    let outcome = match cli.command {
        Command::Locate(args) => run_locate(&runtime, &mut explorer, args).await,
        Command::Timeline(args) => run_timeline(&runtime, &mut explorer, args).await,
    };

    info!(
        "model invocations={} cache hits={} failed trials={} tokens={}/{}",
        explorer.metrics().model_invocations,
        explorer.metrics().cache_hits,
        explorer.metrics().failed_trials,
        explorer.metrics().total_prompt_tokens,
        explorer.metrics().total_completion_tokens,
    );

    runtime
        .shutdown()
        .await
        .context("failed to shutdown browser runtime")?;
    outcome
}

async fn open_root(
    runtime: &ChromiumoxideRuntime,
    url: &str,
    root: &str,
) -> Result<(ChromiumoxideBackend, RemoteElement)> {
    let page = runtime
        .new_page(url)
        .await
        .with_context(|| format!("failed to open {url}"))?;
    info!("Opened {url}");

    let backend = ChromiumoxideBackend::new(page);
    let element = find_root(&backend, root).await?;
    Ok((backend, element))
}

async fn find_root(backend: &ChromiumoxideBackend, root: &str) -> Result<RemoteElement> {
    backend
        .find_element(root)
        .await
        .with_context(|| format!("failed to query {root}"))?
        .ok_or_else(|| anyhow!("no element matches {root}"))
}

async fn run_locate(
    runtime: &ChromiumoxideRuntime,
    explorer: &mut DomExplorer<OpenAiChatProvider>,
    args: LocateArgs,
) -> Result<()> {
    let (backend, root) = open_root(runtime, &args.url, &args.root).await?;

    let matches = if args.many {
        explorer
            .get_elements(&backend, &root, &args.prompt)
            .await
            .context("lookup failed")?
    } else {
        explorer
            .get_element(&backend, &root, &args.prompt)
            .await
            .context("lookup failed")?
            .into_iter()
            .collect()
    };

    if matches.is_empty() {
        warn!("No element matched '{}'", args.prompt);
    }
    for element in &matches {
        let text = backend.text_content(element).await?;
        println!("{}", text.trim());
    }

    for (mode, prompt, query) in explorer.cache().entries() {
        info!("cached [{}] {prompt:?} -> {query}", mode.label());
    }
    Ok(())
}

async fn run_timeline(
    runtime: &ChromiumoxideRuntime,
    explorer: &mut DomExplorer<OpenAiChatProvider>,
    args: TimelineArgs,
) -> Result<()> {
    let (backend, mut root) = open_root(runtime, &args.url, &args.root).await?;
    let mut root_html = backend.outer_html(&root).await?;

    for round in 1..=args.max_rounds {
        let items = explorer
            .get_elements(&backend, &root, &args.items)
            .await
            .context("error getting items")?;
        info!("round {round}: got {} items", items.len());

        'items: for item in &items {
            let mut record = JsonMap::new();
            for field in &args.fields {
                let element = match explorer.get_element(&backend, item, &field.prompt).await {
                    Ok(Some(element)) => element,
                    Ok(None) => {
                        warn!("no {} in item", field.label);
                        continue 'items;
                    }
                    Err(err) => {
                        warn!("error getting {}: {err}", field.label);
                        continue 'items;
                    }
                };
                match backend.text_content(&element).await {
                    Ok(text) => {
                        record.insert(field.label.clone(), JsonValue::String(text.trim().into()));
                    }
                    Err(err) => {
                        warn!("error reading {} text: {err}", field.label);
                        continue 'items;
                    }
                }
            }
            println!("{}", JsonValue::Object(record));
        }

        let Some(last) = items.last() else {
            break;
        };
        backend.scroll_into_view(last).await?;
        sleep(Duration::from_millis(args.settle_ms)).await;

        // Item and field handles from this round are dead weight in the page.
        backend.release_objects().await?;
        root = find_root(&backend, &args.root).await?;
        let next_html = backend.outer_html(&root).await?;
        if next_html == root_html {
            info!("no new content after scrolling, stopping");
            break;
        }
        root_html = next_html;
    }

    Ok(())
}

fn make_logger_callback() -> LoggerCallback {
    Arc::new(|line: &str| {
        log::info!("{line}");
    })
}

fn verbosity_from_count(count: u8) -> Option<Verbosity> {
    (count > 0).then_some(Verbosity::Detailed)
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
