//! Ownership wrapper for a launched browser and its CDP event-handler task
//!
//! The handler task MUST be aborted when the browser goes away, otherwise it
//! runs forever against a dead websocket. The temp profile directory MUST be
//! removed only after `browser.wait()` completes; Windows will refuse to
//! delete files Chrome still holds open.

use chromiumoxide::browser::Browser;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Wrapper for a Browser, its event-handler task and its profile directory.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser,
            handler,
            user_data_dir: Some(user_data_dir),
        }
    }

    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Gracefully close the browser process, wait for it to exit, then remove
    /// the temp profile directory.
    ///
    /// `Drop` only aborts the handler task; without an explicit `close()` +
    /// `wait()` the Chrome process becomes a zombie.
    pub async fn shutdown(&mut self) {
        info!("Shutting down browser");

        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }

        self.cleanup_temp_dir();
    }

    /// Remove the temp profile directory (blocking; callable from Drop context).
    fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("Cleaning up temp profile directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to clean up temp profile directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();

        // A populated user_data_dir here means shutdown() never ran; the
        // Chrome process may still hold the profile, so only warn.
        if let Some(path) = self.user_data_dir.as_ref() {
            warn!(
                "BrowserWrapper dropped without explicit shutdown; temp profile directory \
                 will be orphaned: {}",
                path.display()
            );
        }
    }
}
