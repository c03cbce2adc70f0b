//! The seam between the agent loops and the browser
//!
//! [`PageDriver`] is everything the act/extract/observe loops need from a
//! live page: script evaluation, navigation, typed input primitives, and
//! new-tab detection. [`CdpDriver`] implements it over a chromiumoxide
//! [`Page`](chromiumoxide::page::Page); tests supply their own.

mod cdp;
mod keys;

pub use cdp::CdpDriver;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::browser::BrowserResult;

/// A tab produced by a click, observed and already closed by the driver.
///
/// The agent owns exactly one page; when a click spawns a second tab the
/// driver closes it and reports its URL so the caller can fold the
/// navigation back into the main page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPage {
    pub url: String,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Evaluate a JavaScript expression in the page, awaiting promises, and
    /// return the value by serde_json.
    async fn evaluate(&self, expression: &str) -> BrowserResult<serde_json::Value>;

    async fn goto(&self, url: &str) -> BrowserResult<()>;

    async fn current_url(&self) -> BrowserResult<String>;

    /// Wait for the current navigation to reach domcontentloaded.
    async fn wait_for_navigation(&self) -> BrowserResult<()>;

    /// Wait until the network goes idle. Unbounded; callers race it against
    /// a timer and treat the timeout as settled.
    async fn wait_for_network_idle(&self) -> BrowserResult<()>;

    /// Native click at the clickable point of the first element matching
    /// `xpath`.
    async fn click(&self, xpath: &str) -> BrowserResult<()>;

    /// Clear the field, click it to focus, then type `text`
    /// character-by-character with a humanized per-character delay.
    async fn fill(&self, xpath: &str, text: &str) -> BrowserResult<()>;

    /// Send a keyboard press (e.g. "Enter") to the page.
    async fn press(&self, key: &str) -> BrowserResult<()>;

    async fn scroll_into_view(&self, xpath: &str) -> BrowserResult<()>;

    async fn hover(&self, xpath: &str) -> BrowserResult<()>;

    async fn set_checked(&self, xpath: &str, checked: bool) -> BrowserResult<()>;

    async fn focus(&self, xpath: &str) -> BrowserResult<()>;

    /// PNG screenshot of the viewport, or of the whole page when `full_page`.
    async fn screenshot(&self, full_page: bool) -> BrowserResult<Vec<u8>>;

    /// Watch for a tab other than the main page for up to `timeout`.
    ///
    /// A detected tab is closed before this returns; `None` means no tab
    /// appeared within the deadline.
    async fn wait_for_new_page(&self, timeout: Duration) -> BrowserResult<Option<NewPage>>;
}

/// Screenshot annotation service.
///
/// A vision-capable model selects elements by markers drawn over each
/// selector-map entry. Producing those markers is an external concern; the
/// shipped [`PassthroughAnnotator`] captures the page without them.
#[async_trait]
pub trait ScreenshotAnnotator: Send + Sync {
    async fn annotated_screenshot(
        &self,
        driver: &Arc<dyn PageDriver>,
        selector_map: &BTreeMap<u64, String>,
        full_page: bool,
    ) -> BrowserResult<Vec<u8>>;
}

/// Plain capture, no markers drawn.
pub struct PassthroughAnnotator;

#[async_trait]
impl ScreenshotAnnotator for PassthroughAnnotator {
    async fn annotated_screenshot(
        &self,
        driver: &Arc<dyn PageDriver>,
        _selector_map: &BTreeMap<u64, String>,
        full_page: bool,
    ) -> BrowserResult<Vec<u8>> {
        driver.screenshot(full_page).await
    }
}
