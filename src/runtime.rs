//! Chromiumoxide-based browser runtime.
//!
//! Launches a local Chromium or attaches to an existing one over CDP, keeps
//! the protocol handler running on a tokio task and opens pages for the
//! explorer to work on.

use std::path::PathBuf;
use std::sync::Arc;

use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    page::Page,
};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::{fs, sync::Mutex, task::JoinHandle};

use crate::config::ExplorerConfig;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("browser runtime is not initialized")]
    NotInitialized,
    #[error("{0}")]
    Message(String),
}

/// How the runtime obtains a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStrategy {
    Launch {
        headless: bool,
        chrome_executable: Option<PathBuf>,
        user_data_dir: Option<PathBuf>,
    },
    AttachCdp {
        url: String,
    },
}

impl LaunchStrategy {
    /// A CDP url in the configuration wins over launch options.
    pub fn from_config(config: &ExplorerConfig) -> Self {
        match &config.cdp_url {
            Some(url) => LaunchStrategy::AttachCdp { url: url.clone() },
            None => LaunchStrategy::Launch {
                headless: config.headless,
                chrome_executable: config.chrome_executable.clone(),
                user_data_dir: None,
            },
        }
    }
}

struct RuntimeState {
    browser: Browser,
    handler: JoinHandle<()>,
    attached: bool,
}

pub struct ChromiumoxideRuntime {
    state: Arc<Mutex<Option<RuntimeState>>>,
}

impl ChromiumoxideRuntime {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// Launch or attach according to `strategy`. A no-op when already started.
    pub async fn start(&self, strategy: &LaunchStrategy) -> Result<(), RuntimeError> {
        let mut guard = self.state.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let (browser, handler, attached) = match strategy {
            LaunchStrategy::AttachCdp { url } => {
                let (browser, handler) = Browser::connect(url.as_str())
                    .await
                    .map_err(map_chromiumoxide_error)?;
                (browser, handler, true)
            }
            LaunchStrategy::Launch { user_data_dir, .. } => {
                if let Some(dir) = user_data_dir {
                    fs::create_dir_all(dir)
                        .await
                        .map_err(|err| RuntimeError::Message(err.to_string()))?;
                }
                let config = build_config(strategy)?;
                let (browser, handler) = Browser::launch(config)
                    .await
                    .map_err(map_chromiumoxide_error)?;
                (browser, handler, false)
            }
        };

        *guard = Some(RuntimeState {
            browser,
            handler: spawn_handler(handler),
            attached,
        });
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Open `url` in a new page and wait for the navigation to settle.
    pub async fn new_page(&self, url: &str) -> Result<Page, RuntimeError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(RuntimeError::NotInitialized)?;

        let page = state
            .browser
            .new_page(url)
            .await
            .map_err(map_chromiumoxide_error)?;
        page.wait_for_navigation()
            .await
            .map_err(map_chromiumoxide_error)?;
        Ok(page)
    }

    /// Close a launched browser, or detach from an attached one.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let state = {
            let mut guard = self.state.lock().await;
            guard.take()
        };

        if let Some(mut state) = state {
            if !state.attached {
                if let Err(err) = state.browser.close().await {
                    log::warn!("failed to close browser: {err}");
                }
                if let Err(err) = state.browser.wait().await {
                    log::warn!("failed to wait for browser exit: {err}");
                }
            }
            state.handler.abort();
        }

        Ok(())
    }
}

impl Default for ChromiumoxideRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn build_config(strategy: &LaunchStrategy) -> Result<BrowserConfig, RuntimeError> {
    let mut builder = BrowserConfig::builder();

    if let LaunchStrategy::Launch {
        headless,
        chrome_executable,
        user_data_dir,
    } = strategy
    {
        if let Some(path) = chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(dir) = user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if !headless {
            builder = builder.with_head();
        }
    }

    builder.build().map_err(RuntimeError::Message)
}

fn map_chromiumoxide_error<E: std::fmt::Display>(err: E) -> RuntimeError {
    RuntimeError::Message(err.to_string())
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                log::debug!("chromiumoxide handler error: {err}");
            }
        }
    })
}
