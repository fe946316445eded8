//! Capability contract for the headless browser.
//!
//! Everything above this module talks to pages through [`Page`]; the real
//! Chrome driver lives in [`chrome`]. `fixture` is a static-HTML stand-in,
//! compiled for tests and behind the `test-utils` feature.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub mod chrome;
#[cfg(any(test, feature = "test-utils"))]
pub mod fixture;

/// Sub-resource types that can be aborted before they are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    Media,
    Font,
}

/// Heavy assets never needed for extraction.
pub const BLOCKED_RESOURCES: &[ResourceKind] =
    &[ResourceKind::Image, ResourceKind::Media, ResourceKind::Font];

/// Identity of an isolated browsing context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub locale: String,
}

/// Starts a browser instance; one launch serves a whole scrape run.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Browser>>;
}

#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a tab inside a fresh context (own cookies, UA and viewport).
    async fn open_page(&self, profile: &PageProfile) -> Result<Box<dyn Page>>;

    async fn close(&self) -> Result<()>;
}

/// A tab owned exclusively by one task.
#[async_trait]
pub trait Page: Send + Sync {
    /// Abort sub-requests of the given kinds from now on.
    async fn block_resources(&self, kinds: &[ResourceKind]) -> Result<()>;

    /// Navigate and wait for the document to load.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn title(&self) -> Result<String>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String>;

    async fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>>;

    /// Click the first element matching `selector`. Ok(false) when none exists.
    async fn click(&self, selector: &str) -> Result<bool>;

    async fn press_key(&self, key: &str) -> Result<()>;

    /// Close the tab and dispose of its context.
    async fn close(&self) -> Result<()>;
}

/// Scroll to the bottom `steps` times, pausing between steps so lazy
/// content can attach.
pub async fn auto_scroll(page: &dyn Page, steps: u32, pause: Duration) {
    for _ in 0..steps {
        if let Err(e) = page
            .evaluate("window.scrollBy(0, document.body.scrollHeight)")
            .await
        {
            tracing::debug!("scroll step failed: {e}");
        }
        tokio::time::sleep(pause).await;
    }
}
