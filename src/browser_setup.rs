//! Chromium discovery and launch
//!
//! Resolution order for the executable: `CHROMIUM_PATH`, well-known install
//! locations, `which`, and finally a managed download. Every launch gets an
//! isolated profile directory under the system temp dir; the wrapper removes
//! it after shutdown.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::handler::Handler;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use crate::utils::constants::CHROME_USER_AGENT;

/// Flags that quiet an automated Chrome down and hide the most obvious
/// automation tells. Applied to every launch.
const BASE_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-notifications",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-background-networking",
    "--disable-breakpad",
    "--no-first-run",
    "--no-default-browser-check",
    "--password-store=basic",
    "--use-mock-keychain",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Added only when the caller opts out of web security.
const INSECURE_ARGS: &[&str] = &[
    "--disable-web-security",
    "--disable-features=IsolateOrigins,site-per-process",
    "--ignore-certificate-errors",
];

const SANDBOX_OFF_ARGS: &[&str] = &["--no-sandbox", "--disable-setuid-sandbox"];

/// Chrome emits CDP traffic chromiumoxide has no models for; the handler
/// surfaces it as deserialization errors. Matching these substrings keeps
/// the log readable without hiding genuine faults.
const IGNORABLE_HANDLER_ERRORS: &[&str] = &[
    "data did not match any variant of untagged enum Message",
    "Failed to deserialize WS response",
];

/// Find a Chrome/Chromium executable on this machine.
pub fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(overridden) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(overridden);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points at nothing: {}", path.display());
    }

    well_known_install()
        .or_else(which_lookup)
        .inspect(|path| info!("Found browser at: {}", path.display()))
        .ok_or_else(|| anyhow::anyhow!("Chrome/Chromium executable not found"))
}

fn well_known_install() -> Option<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    candidates.iter().map(PathBuf::from).find(|path| path.exists())
}

fn which_lookup() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return None;
    }
    ["chromium", "chromium-browser", "google-chrome", "chrome"]
        .iter()
        .find_map(|name| {
            let output = Command::new("which").arg(name).output().ok()?;
            if !output.status.success() {
                return None;
            }
            let line = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!line.is_empty()).then(|| PathBuf::from(line))
        })
}

/// Download a managed Chromium into the user cache directory and return the
/// executable path. Used when no local install is found.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("No local browser found, downloading managed Chromium...");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| std::env::temp_dir().join(".cache"))
        .join("pagehand/chromium");
    std::fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;

    let options = BrowserFetcherOptions::builder()
        .with_path(&cache_dir)
        .build()
        .context("Failed to build fetcher options")?;
    let revision_info = BrowserFetcher::new(options)
        .fetch()
        .await
        .context("Failed to fetch browser")?;

    info!(
        "Downloaded Chromium to: {}",
        revision_info.folder_path.display()
    );
    Ok(revision_info.executable_path)
}

/// Launch Chrome/Chromium with the stealth argument set and an isolated
/// profile.
///
/// Returns the browser, the spawned CDP event-handler task, and the profile
/// directory the caller (via [`crate::browser::BrowserWrapper`]) must remove
/// after shutdown.
pub async fn launch_browser(
    headless: bool,
    window: (u32, u32),
    disable_security: bool,
) -> Result<(Browser, JoinHandle<()>, PathBuf)> {
    let chrome_path = match find_browser_executable() {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let profile_dir = std::env::temp_dir().join(format!("pagehand_{}", std::process::id()));
    let config = build_config(chrome_path, headless, window, &profile_dir, disable_security)?;

    std::fs::create_dir_all(&profile_dir).context("Failed to create profile directory")?;
    info!("Launching browser");
    let (browser, handler) = match Browser::launch(config).await {
        Ok(launched) => launched,
        Err(e) => {
            // a failed launch must not orphan the fresh profile
            let _ = std::fs::remove_dir_all(&profile_dir);
            return Err(anyhow::Error::new(e).context("Failed to launch browser"));
        }
    };

    Ok((browser, spawn_handler_task(handler), profile_dir))
}

fn build_config(
    chrome_path: PathBuf,
    headless: bool,
    window: (u32, u32),
    profile_dir: &Path,
    disable_security: bool,
) -> Result<BrowserConfig> {
    let mut args: Vec<String> = BASE_ARGS.iter().map(|flag| flag.to_string()).collect();
    args.push(format!("--user-agent={CHROME_USER_AGENT}"));
    if disable_security {
        warn!("Web security disabled for this browser (disable_security=true)");
        args.extend(INSECURE_ARGS.iter().map(|flag| flag.to_string()));
    }
    // setuid sandboxing does not work inside containers
    if disable_security || sandbox_unusable() {
        args.extend(SANDBOX_OFF_ARGS.iter().map(|flag| flag.to_string()));
    }

    let (width, height) = window;
    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(width, height)
        .user_data_dir(profile_dir)
        .chrome_executable(chrome_path)
        .args(args);
    builder = if headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };
    builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))
}

fn sandbox_unusable() -> bool {
    Path::new("/.dockerenv").exists()
        || std::env::var_os("container").is_some()
        || std::env::var_os("KUBERNETES_SERVICE_HOST").is_some()
}

fn spawn_handler_task(mut handler: Handler) -> JoinHandle<()> {
    task::spawn(async move {
        while let Some(event) = handler.next().await {
            let Err(e) = event else { continue };
            let message = e.to_string();
            if IGNORABLE_HANDLER_ERRORS.iter().any(|s| message.contains(s)) {
                trace!("Ignoring unmodeled CDP traffic: {}", message);
            } else {
                error!("Browser handler error: {:?}", e);
            }
        }
        info!("Browser handler task completed");
    })
}
