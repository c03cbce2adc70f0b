//! DOM-settle synchronization
//!
//! The loops cannot make progress without a DOM view, so settling is
//! best-effort by construction: the first of several heuristics wins, a
//! timeout counts as settled, and no error ever escapes.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::browser::BrowserResult;
use crate::driver::PageDriver;

const BODY_POLL_MS: u64 = 100;

/// Wait until the page looks safe to inspect.
///
/// Races, in a single deadline:
/// 1. the injected `window.waitForDomSettle()` promise,
/// 2. the document ready state leaving `loading`,
/// 3. a `body` element becoming queryable.
///
/// A timeout logs at level 1 and returns normally; any script error is
/// swallowed with a log. This function never fails.
pub async fn wait_for_settled(driver: &Arc<dyn PageDriver>, timeout_ms: u64) {
    let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        tokio::select! {
            result = driver.evaluate("window.waitForDomSettle()") => ("dom settle", result.map(|_| ())),
            result = ready_state_past_loading(driver) => ("ready state", result),
            result = body_queryable(driver) => ("body present", result),
        }
    })
    .await;

    match outcome {
        Err(_) => {
            info!(
                timeout_ms,
                "DOM settle timeout exceeded, continuing with the page as-is"
            );
        }
        Ok((heuristic, Err(e))) => {
            debug!("DOM settle heuristic '{}' errored, continuing: {}", heuristic, e);
        }
        Ok((heuristic, Ok(()))) => {
            debug!("DOM settled via {}", heuristic);
        }
    }
}

async fn ready_state_past_loading(driver: &Arc<dyn PageDriver>) -> BrowserResult<()> {
    loop {
        let state = driver.evaluate("document.readyState").await?;
        if matches!(state.as_str(), Some("interactive") | Some("complete")) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(BODY_POLL_MS)).await;
    }
}

async fn body_queryable(driver: &Arc<dyn PageDriver>) -> BrowserResult<()> {
    loop {
        let present = driver
            .evaluate("document.querySelector('body') !== null")
            .await?;
        if present.as_bool() == Some(true) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(BODY_POLL_MS)).await;
    }
}
