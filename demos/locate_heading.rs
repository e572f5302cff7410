//! Run with:
//! `DOM_EXPLORER_CHROME_BIN=/path/to/chrome MODEL_API_KEY=... cargo run --example locate_heading`
//!
//! Opens example.com, asks the explorer for the page heading and the
//! paragraphs, prints their text, then asks again to show the cached query
//! answering without another model call.

use anyhow::{Context, Result, anyhow};
use dom_explorer::adapter::ChromiumoxideBackend;
use dom_explorer::config::{ExplorerConfig, Verbosity};
use dom_explorer::explorer::DomExplorer;
use dom_explorer::runtime::{ChromiumoxideRuntime, LaunchStrategy};

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = ExplorerConfig::from_env().context("invalid configuration")?;
    config.verbose = Verbosity::Detailed;

    let mut explorer = DomExplorer::from_config(&config).context("failed to build explorer")?;

    let runtime = ChromiumoxideRuntime::new();
    runtime
        .start(&LaunchStrategy::from_config(&config))
        .await
        .context("failed to start browser")?;

    let page = runtime
        .new_page("https://example.com")
        .await
        .context("failed to open example.com")?;
    let backend = ChromiumoxideBackend::new(page);
    let body = backend
        .find_element("body")
        .await?
        .ok_or_else(|| anyhow!("page has no body"))?;

    let heading = explorer
        .get_element(&backend, &body, "The main heading of the page")
        .await?
        .ok_or_else(|| anyhow!("no heading found"))?;
    println!("heading: {}", backend.text_content(&heading).await?.trim());

    let paragraphs = explorer
        .get_elements(&backend, &body, "The paragraphs of body text")
        .await?;
    for paragraph in &paragraphs {
        println!("paragraph: {}", backend.text_content(paragraph).await?.trim());
    }

    explorer
        .get_element(&backend, &body, "The main heading of the page")
        .await?;
    println!(
        "model invocations: {}, cache hits: {}",
        explorer.metrics().model_invocations,
        explorer.metrics().cache_hits
    );

    runtime.shutdown().await.context("failed to shutdown")?;
    Ok(())
}
