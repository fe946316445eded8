//! [`Browser`] backed by a local Chrome/Chromium through `headless_chrome`.
//!
//! The CDP client is blocking, so every call is moved onto the blocking
//! pool; tabs are `Arc`s and can be handed to those threads freely.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use headless_chrome::browser::tab::RequestPausedDecision;
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::FailRequest;
use headless_chrome::protocol::cdp::Network::{ErrorReason, ResourceType};
use headless_chrome::protocol::cdp::Target;
use headless_chrome::types::Bounds;
use headless_chrome::{LaunchOptions, Tab};
use tracing::debug;

use super::{Browser, BrowserLauncher, Page, PageProfile, ResourceKind};

const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-infobars",
    "--window-position=0,0",
    "--ignore-certificate-errors",
];

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("browser call panicked")?
}

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    headless: bool,
    executable: Option<PathBuf>,
    window_size: (u32, u32),
}

impl ChromeLauncher {
    pub fn new(headless: bool, executable: Option<PathBuf>) -> Self {
        Self {
            headless,
            executable,
            window_size: (1920, 1080),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>> {
        let headless = self.headless;
        let path = self.executable.clone();
        let window_size = self.window_size;

        let browser = blocking(move || {
            headless_chrome::Browser::new(LaunchOptions {
                headless,
                path,
                window_size: Some(window_size),
                args: LAUNCH_ARGS.iter().map(OsStr::new).collect(),
                idle_browser_timeout: Duration::from_secs(600),
                ..Default::default()
            })
        })
        .await
        .context("failed to launch chrome")?;

        debug!("chrome launched (headless: {headless})");
        Ok(Arc::new(ChromeBrowser {
            inner: Mutex::new(Some(Arc::new(browser))),
        }))
    }
}

pub struct ChromeBrowser {
    inner: Mutex<Option<Arc<headless_chrome::Browser>>>,
}

impl ChromeBrowser {
    fn handle(&self) -> Result<Arc<headless_chrome::Browser>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("browser handle poisoned"))?
            .clone()
            .ok_or_else(|| anyhow!("browser already closed"))
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn open_page(&self, profile: &PageProfile) -> Result<Box<dyn Page>> {
        let browser = self.handle()?;
        let profile = profile.clone();

        let page = blocking(move || {
            let context = browser.new_context()?;
            let context_id = context.get_id().to_string();
            let tab = context.new_tab()?;

            let accept_language = format!("{},en;q=0.9", profile.locale);
            tab.set_user_agent(&profile.user_agent, Some(&accept_language), None)?;
            let (width, height) = profile.viewport;
            tab.set_bounds(Bounds::Normal {
                left: Some(0),
                top: Some(0),
                width: Some(f64::from(width)),
                height: Some(f64::from(height)),
            })?;

            Ok(ChromePage {
                tab,
                context_id,
                intercepting: AtomicBool::new(false),
            })
        })
        .await?;

        Ok(Box::new(page))
    }

    async fn close(&self) -> Result<()> {
        let browser = self
            .inner
            .lock()
            .map_err(|_| anyhow!("browser handle poisoned"))?
            .take();
        // Dropping the last handle terminates the chrome process.
        if let Some(browser) = browser {
            blocking(move || {
                drop(browser);
                Ok(())
            })
            .await?;
        }
        Ok(())
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
    context_id: String,
    intercepting: AtomicBool,
}

fn resource_type(kind: ResourceKind) -> ResourceType {
    match kind {
        ResourceKind::Image => ResourceType::Image,
        ResourceKind::Media => ResourceType::Media,
        ResourceKind::Font => ResourceType::Font,
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn block_resources(&self, kinds: &[ResourceKind]) -> Result<()> {
        if self.intercepting.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let blocked: Vec<ResourceType> = kinds.iter().copied().map(resource_type).collect();
        let tab = Arc::clone(&self.tab);

        let installed = blocking(move || {
            tab.enable_fetch(None, None)?;
            tab.enable_request_interception(Arc::new(
                move |_transport: Arc<Transport>, _session: SessionId, event: RequestPausedEvent| {
                    if blocked.contains(&event.params.resource_Type) {
                        RequestPausedDecision::Fail(FailRequest {
                            request_id: event.params.request_id,
                            error_reason: ErrorReason::BlockedByClient,
                        })
                    } else {
                        RequestPausedDecision::Continue(None)
                    }
                },
            ))?;
            Ok(())
        })
        .await;

        if installed.is_err() {
            self.intercepting.store(false, Ordering::SeqCst);
        }
        installed
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        let url = url.to_string();
        blocking(move || {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        let selector = selector.to_string();
        blocking(move || {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)?;
            Ok(())
        })
        .await
    }

    async fn title(&self) -> Result<String> {
        let tab = Arc::clone(&self.tab);
        blocking(move || tab.get_title()).await
    }

    async fn content(&self) -> Result<String> {
        let tab = Arc::clone(&self.tab);
        blocking(move || tab.get_content()).await
    }

    async fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>> {
        let tab = Arc::clone(&self.tab);
        let script = script.to_string();
        blocking(move || {
            let remote = tab.evaluate(&script, false)?;
            Ok(remote.value)
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        let tab = Arc::clone(&self.tab);
        let selector = selector.to_string();
        blocking(move || {
            let clicked = match tab.find_element(&selector) {
                Ok(element) => {
                    element.click()?;
                    true
                }
                Err(_) => false,
            };
            Ok(clicked)
        })
        .await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        let key = key.to_string();
        blocking(move || {
            tab.press_key(&key)?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        let context_id = self.context_id.clone();
        blocking(move || {
            // Disposing the context also closes its tabs; the tab's session
            // must still be attached to send it.
            let disposed = tab.call_method(Target::DisposeBrowserContext {
                browser_context_id: context_id.clone(),
            });
            if let Err(e) = disposed {
                debug!("disposing context {context_id} failed: {e}");
                tab.close(false)
                    .with_context(|| format!("failed to close tab of context {context_id}"))?;
            }
            Ok(())
        })
        .await
    }
}
