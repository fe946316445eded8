//! In-memory browser serving static HTML, with counters for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{Browser, BrowserLauncher, Page, PageProfile, ResourceKind};

#[derive(Debug, Clone, Default)]
pub struct FixturePage {
    html: String,
    title: String,
    failures: u32,
    latency: Duration,
}

impl FixturePage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Default::default()
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Fail the next `times` navigations to this URL.
    pub fn failing(mut self, times: u32) -> Self {
        self.failures = times;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[derive(Default)]
struct FixtureState {
    pages: Mutex<HashMap<String, FixturePage>>,
    visits: Mutex<HashMap<String, u32>>,
    profiles: Mutex<Vec<PageProfile>>,
    fail_launch: AtomicBool,
    fail_open: AtomicBool,
    launches: AtomicUsize,
    browser_closes: AtomicUsize,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
    open_now: AtomicUsize,
    peak_open: AtomicUsize,
    blocking_installed: AtomicUsize,
}

/// Launcher and browser in one; clones share state, so a test keeps a
/// handle to read the counters after the run.
#[derive(Clone, Default)]
pub struct FixtureBrowser {
    state: Arc<FixtureState>,
}

impl FixtureBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, page: FixturePage) -> Self {
        if let Ok(mut pages) = self.state.pages.lock() {
            pages.insert(url.into(), page);
        }
        self
    }

    pub fn failing_launch(self) -> Self {
        self.state.fail_launch.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_open(self) -> Self {
        self.state.fail_open.store(true, Ordering::SeqCst);
        self
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn browser_closes(&self) -> usize {
        self.state.browser_closes.load(Ordering::SeqCst)
    }

    pub fn pages_opened(&self) -> usize {
        self.state.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.state.pages_closed.load(Ordering::SeqCst)
    }

    /// Highest number of pages open at the same instant.
    pub fn peak_open_pages(&self) -> usize {
        self.state.peak_open.load(Ordering::SeqCst)
    }

    pub fn blocking_installed(&self) -> usize {
        self.state.blocking_installed.load(Ordering::SeqCst)
    }

    pub fn visits(&self, url: &str) -> u32 {
        self.state
            .visits
            .lock()
            .map(|visits| visits.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn profiles(&self) -> Vec<PageProfile> {
        self.state
            .profiles
            .lock()
            .map(|profiles| profiles.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BrowserLauncher for FixtureBrowser {
    async fn launch(&self) -> Result<Arc<dyn Browser>> {
        if self.state.fail_launch.load(Ordering::SeqCst) {
            bail!("fixture browser refused to launch");
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl Browser for FixtureBrowser {
    async fn open_page(&self, profile: &PageProfile) -> Result<Box<dyn Page>> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            bail!("fixture browser refused to open a context");
        }
        if let Ok(mut profiles) = self.state.profiles.lock() {
            profiles.push(profile.clone());
        }
        self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        let open = self.state.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_open.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(FixtureTab {
            state: Arc::clone(&self.state),
            current: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.state.browser_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FixtureTab {
    state: Arc<FixtureState>,
    current: Mutex<Option<FixturePage>>,
    closed: AtomicBool,
}

impl FixtureTab {
    fn current(&self) -> Option<FixturePage> {
        self.current.lock().ok().and_then(|page| page.clone())
    }
}

fn html_matches(html: &str, selector: &str) -> Result<bool> {
    let selector = Selector::parse(selector).map_err(|e| anyhow!("bad selector {selector}: {e:?}"))?;
    let document = Html::parse_document(html);
    let found = document.select(&selector).next().is_some();
    Ok(found)
}

#[async_trait]
impl Page for FixtureTab {
    async fn block_resources(&self, _kinds: &[ResourceKind]) -> Result<()> {
        self.state.blocking_installed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        if let Ok(mut visits) = self.state.visits.lock() {
            *visits.entry(url.to_string()).or_default() += 1;
        }
        let latency = self
            .state
            .pages
            .lock()
            .ok()
            .and_then(|pages| pages.get(url).map(|page| page.latency))
            .unwrap_or_default();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let page = {
            let mut pages = self
                .state
                .pages
                .lock()
                .map_err(|_| anyhow!("fixture pages poisoned"))?;
            let page = pages
                .get_mut(url)
                .ok_or_else(|| anyhow!("net::ERR_NAME_NOT_RESOLVED at {url}"))?;
            if page.failures > 0 {
                page.failures -= 1;
                bail!("navigation to {url} timed out");
            }
            page.clone()
        };

        if let Ok(mut current) = self.current.lock() {
            *current = Some(page);
        }
        Ok(())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<()> {
        let html = self.current().map(|page| page.html).unwrap_or_default();
        if html_matches(&html, selector)? {
            Ok(())
        } else {
            bail!("timed out waiting for `{selector}`")
        }
    }

    async fn title(&self) -> Result<String> {
        Ok(self.current().map(|page| page.title).unwrap_or_default())
    }

    async fn content(&self) -> Result<String> {
        self.current()
            .map(|page| page.html)
            .ok_or_else(|| anyhow!("no document loaded"))
    }

    async fn evaluate(&self, _script: &str) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        let html = self.current().map(|page| page.html).unwrap_or_default();
        html_matches(&html, selector)
    }

    async fn press_key(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
            self.state.open_now.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
