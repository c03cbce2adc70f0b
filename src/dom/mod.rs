//! Typed bridge to the in-page DOM-processing scripts
//!
//! The page carries a pre-installed bundle (`window.processDom`,
//! `window.processAllOfDom`, `window.waitForDomSettle`, `window.scrollToHeight`,
//! `window.debugDom`, `window.cleanupDebug`) that serializes interactive
//! elements into numbered chunks sized for one model context window. This
//! module calls those functions through the driver and parses their results;
//! chunk selection order is page-side and treated as opaque.

pub mod settle;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::browser::BrowserResult;
use crate::driver::PageDriver;

/// One chunk of the serialized DOM.
///
/// `output_string` holds one element per line, prefixed with the numeric ID
/// used in the model dialogue; `selector_map` resolves those IDs back to
/// XPath strings for dispatch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSnapshot {
    pub output_string: String,
    pub selector_map: BTreeMap<u64, String>,
    pub chunk: u64,
    pub chunks: Vec<u64>,
}

/// Flat serialization of the whole page, no chunking.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub output_string: String,
    pub selector_map: BTreeMap<u64, String>,
}

#[derive(Clone)]
pub struct DomBridge {
    driver: Arc<dyn PageDriver>,
    debug_overlay: bool,
}

impl DomBridge {
    pub fn new(driver: Arc<dyn PageDriver>, debug_overlay: bool) -> Self {
        Self {
            driver,
            debug_overlay,
        }
    }

    /// Serialize exactly one chunk not present in `chunks_seen`.
    pub async fn process_dom(&self, chunks_seen: &[u64]) -> BrowserResult<ChunkSnapshot> {
        let expression = format!(
            "window.processDom({})",
            serde_json::to_string(chunks_seen)?
        );
        let value = self.driver.evaluate(&expression).await?;
        let snapshot: ChunkSnapshot = serde_json::from_value(value)?;
        debug!(
            chunk = snapshot.chunk,
            chunks = snapshot.chunks.len(),
            elements = snapshot.selector_map.len(),
            "Processed DOM chunk"
        );
        Ok(snapshot)
    }

    /// Serialize the whole page in one pass.
    pub async fn process_all_of_dom(&self) -> BrowserResult<PageSnapshot> {
        let value = self.driver.evaluate("window.processAllOfDom()").await?;
        let snapshot: PageSnapshot = serde_json::from_value(value)?;
        debug!(
            elements = snapshot.selector_map.len(),
            "Processed full DOM"
        );
        Ok(snapshot)
    }

    /// Used by the act loop's vision fallback before replaying with a
    /// screenshot.
    pub async fn scroll_to_top(&self) -> BrowserResult<()> {
        self.driver.evaluate("window.scrollToHeight(0)").await?;
        Ok(())
    }

    /// Start the in-page debug overlay. No-op unless debug_dom is set;
    /// overlay errors never affect the calling loop.
    pub async fn debug_start(&self) {
        if self.debug_overlay
            && let Err(e) = self.driver.evaluate("window.debugDom()").await
        {
            debug!("Debug overlay start failed: {}", e);
        }
    }

    pub async fn debug_cleanup(&self) {
        if self.debug_overlay
            && let Err(e) = self.driver.evaluate("window.cleanupDebug()").await
        {
            debug!("Debug overlay cleanup failed: {}", e);
        }
    }
}
