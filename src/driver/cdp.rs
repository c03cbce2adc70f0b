//! chromiumoxide-backed implementation of [`PageDriver`]
//!
//! XPath resolution happens in-page: a script scrolls the element into view
//! and reports the center of its bounding box, which is then used for native
//! CDP mouse input. Resolution polls with exponential backoff so elements
//! rendered late by SPAs are still found.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventLifecycleEvent, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::layout::Point;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::keys;
use super::{NewPage, PageDriver};
use crate::browser::{BrowserError, BrowserResult, BrowserWrapper};
use crate::utils::constants::{LOCATE_TIMEOUT_MS, POLL_INTERVAL_MS, TYPE_DELAY_MS};

pub struct CdpDriver {
    page: Page,
    browser: Arc<Mutex<Option<BrowserWrapper>>>,
}

impl CdpDriver {
    /// Wrap a page together with the browser that owns it. The browser handle
    /// is needed for new-tab detection.
    pub fn new(page: Page, browser: Arc<Mutex<Option<BrowserWrapper>>>) -> Self {
        Self { page, browser }
    }

    /// Wrap a page provisioned elsewhere (remote environments). New-tab
    /// detection is unavailable and always reports no tab.
    pub fn from_page(page: Page) -> Self {
        Self {
            page,
            browser: Arc::new(Mutex::new(None)),
        }
    }

    /// Register a script to run in every new document, e.g. the in-page
    /// DOM-processing bundle the agent loops call into.
    pub async fn install_page_script(&self, source: &str) -> BrowserResult<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await?;
        Ok(())
    }

    /// Resolve `xpath` to the viewport center point of its first match.
    ///
    /// Polls with exponential backoff (100ms doubling, capped at 1s) so SPA
    /// content that renders after load is still located. The element is
    /// scrolled into view before measuring, otherwise the point may be
    /// off-screen.
    async fn locate_point(&self, xpath: &str) -> BrowserResult<Point> {
        let expression = format!(
            r#"(() => {{
                const found = document.evaluate({xpath}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
                const el = found.singleNodeValue;
                if (!el) return null;
                el.scrollIntoView({{ block: "center", inline: "center" }});
                const rect = el.getBoundingClientRect();
                return {{ x: rect.x + rect.width / 2, y: rect.y + rect.height / 2 }};
            }})()"#,
            xpath = serde_json::to_string(xpath)?,
        );

        let start = Instant::now();
        let timeout = Duration::from_millis(LOCATE_TIMEOUT_MS);
        let mut poll_interval = Duration::from_millis(POLL_INTERVAL_MS);
        let max_interval = Duration::from_secs(1);

        loop {
            let value = self.evaluate(&expression).await?;
            if value.is_object() {
                let x = value.get("x").and_then(|v| v.as_f64());
                let y = value.get("y").and_then(|v| v.as_f64());
                if let (Some(x), Some(y)) = (x, y) {
                    return Ok(Point { x, y });
                }
            }

            if start.elapsed() >= timeout {
                return Err(BrowserError::ElementNotFound {
                    xpath: xpath.to_string(),
                    message: format!("no match after {}ms", timeout.as_millis()),
                });
            }

            tokio::time::sleep(poll_interval).await;
            poll_interval = (poll_interval * 2).min(max_interval);
        }
    }

    /// Run a snippet against the first element matching `xpath`. The snippet
    /// sees the element as `el`; a `false` return means no match.
    async fn with_element(&self, xpath: &str, snippet: &str) -> BrowserResult<()> {
        let expression = format!(
            r#"(() => {{
                const found = document.evaluate({xpath}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
                const el = found.singleNodeValue;
                if (!el) return false;
                {snippet}
                return true;
            }})()"#,
            xpath = serde_json::to_string(xpath)?,
        );

        let value = self.evaluate(&expression).await?;
        if value.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound {
                xpath: xpath.to_string(),
                message: "no match".to_string(),
            })
        }
    }

    async fn send_char(&self, c: char) -> BrowserResult<()> {
        let params = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::Char)
            .text(c.to_string())
            .build()
            .map_err(BrowserError::Input)?;
        self.page.execute(params).await?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn evaluate(&self, expression: &str) -> BrowserResult<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::Script)?;
        let result = self.page.evaluate(params).await?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn goto(&self, url: &str) -> BrowserResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn wait_for_navigation(&self) -> BrowserResult<()> {
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_network_idle(&self) -> BrowserResult<()> {
        self.page
            .execute(SetLifecycleEventsEnabledParams::new(true))
            .await?;
        let mut events = self.page.event_listener::<EventLifecycleEvent>().await?;
        while let Some(event) = events.next().await {
            if event.name == "networkIdle" || event.name == "networkAlmostIdle" {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn click(&self, xpath: &str) -> BrowserResult<()> {
        let point = self.locate_point(xpath).await?;
        self.page
            .click(point)
            .await
            .map_err(|e| BrowserError::Input(format!("click at xpath '{xpath}' failed: {e}")))?;
        Ok(())
    }

    async fn fill(&self, xpath: &str, text: &str) -> BrowserResult<()> {
        // Clear, then click to focus, then type like a person would
        self.with_element(
            xpath,
            r#"if ("value" in el) { el.value = ""; el.dispatchEvent(new Event("input", { bubbles: true })); }"#,
        )
        .await?;
        self.click(xpath).await?;

        for c in text.chars() {
            self.send_char(c).await?;
            let delay = rand::rng().random_range(TYPE_DELAY_MS);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }

    async fn press(&self, key: &str) -> BrowserResult<()> {
        let mut single = key.chars();
        if let (Some(c), None) = (single.next(), single.next()) {
            // Bare characters are typed, not pressed
            return self.send_char(c).await;
        }

        let def = keys::lookup(key)
            .ok_or_else(|| BrowserError::Input(format!("unknown key '{key}'")))?;

        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(def.key)
            .code(def.code)
            .windows_virtual_key_code(def.key_code)
            .native_virtual_key_code(def.key_code);
        if let Some(text) = def.text {
            down = down.text(text);
        }
        self.page
            .execute(down.build().map_err(BrowserError::Input)?)
            .await?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(def.key)
            .code(def.code)
            .windows_virtual_key_code(def.key_code)
            .native_virtual_key_code(def.key_code)
            .build()
            .map_err(BrowserError::Input)?;
        self.page.execute(up).await?;
        Ok(())
    }

    async fn scroll_into_view(&self, xpath: &str) -> BrowserResult<()> {
        self.with_element(
            xpath,
            r#"el.scrollIntoView({ behavior: "smooth", block: "center" });"#,
        )
        .await
    }

    async fn hover(&self, xpath: &str) -> BrowserResult<()> {
        let point = self.locate_point(xpath).await?;
        self.page
            .move_mouse(point)
            .await
            .map_err(|e| BrowserError::Input(format!("hover at xpath '{xpath}' failed: {e}")))?;
        Ok(())
    }

    async fn set_checked(&self, xpath: &str, checked: bool) -> BrowserResult<()> {
        let want = if checked { "true" } else { "false" };
        self.with_element(
            xpath,
            &format!(r#"if (Boolean(el.checked) !== {want}) el.click();"#),
        )
        .await
    }

    async fn focus(&self, xpath: &str) -> BrowserResult<()> {
        self.with_element(xpath, "el.focus();").await
    }

    async fn screenshot(&self, full_page: bool) -> BrowserResult<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(full_page).build())
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))
    }

    async fn wait_for_new_page(&self, timeout: Duration) -> BrowserResult<Option<NewPage>> {
        let guard = self.browser.lock().await;
        let Some(wrapper) = guard.as_ref() else {
            debug!("No browser handle attached; skipping new-tab detection");
            return Ok(None);
        };

        let main_id = self.page.target_id().clone();
        let deadline = Instant::now() + timeout;

        loop {
            let pages = wrapper
                .browser()
                .pages()
                .await
                .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

            if let Some(extra) = pages.into_iter().find(|p| p.target_id() != &main_id) {
                let url = extra.url().await.ok().flatten().unwrap_or_default();
                info!("New tab detected with URL: {}", url);
                if let Err(e) = extra.close().await {
                    warn!("Failed to close new tab: {}", e);
                }
                return Ok(Some(NewPage { url }));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }
}
