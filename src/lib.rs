//! LLM-driven browser automation
//!
//! Closes a loop between a Chromium browser (driven over CDP via chromiumoxide)
//! and a large language model. Three high-level operations are exposed on
//! [`Session`]: `act` performs a natural-language instruction against the live
//! page, `extract` pulls schema-shaped data out of it, and `observe` enumerates
//! candidate interactive elements.

pub mod act;
pub mod browser;
pub mod browser_setup;
pub mod dom;
pub mod driver;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod observe;
pub mod recorder;
pub mod session;
mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Which kind of browser backs the session.
///
/// `Local` launches a Chromium instance on this machine. `Remote` means the
/// caller provisions the browser elsewhere and attaches an already-connected
/// driver via [`Session::attach`].
///
/// [`Session::attach`]: crate::session::Session::attach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub env: Environment,

    /// Console-mirror verbosity: 0 = off, 1 = info, 2 = debug
    #[serde(default)]
    pub verbose: u8,

    /// Draw the in-page debug overlay around each DOM pass
    #[serde(default)]
    pub debug_dom: bool,

    #[serde(default = "default_model")]
    pub default_model: String,

    /// Deadline for the DOM-settle race; soft, never fails the call
    #[serde(default = "default_dom_settle_timeout_ms")]
    pub dom_settle_timeout_ms: u64,

    /// Evict a request's LLM cache entries when its call fails
    #[serde(default)]
    pub enable_caching: bool,

    /// Bound on successful-dispatch iterations of a single act call
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode (forces the configured window size,
    /// 1280x720 by default)
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default)]
    pub disable_security: bool,

    /// Window dimensions
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_dom_settle_timeout_ms() -> u64 {
    60_000
}

fn default_max_steps() -> usize {
    10
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: Environment::default(),
            verbose: 0,
            debug_dom: false,
            default_model: default_model(),
            dom_settle_timeout_ms: default_dom_settle_timeout_ms(),
            enable_caching: false,
            max_steps: default_max_steps(),
            browser: BrowserConfig::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: false,
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

/// Load config from config.yaml in package root
pub fn load_yaml_config() -> anyhow::Result<Config> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml");

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

pub use browser::{BrowserError, BrowserResult, BrowserWrapper};
pub use dom::{ChunkSnapshot, DomBridge, PageSnapshot};
pub use driver::{CdpDriver, NewPage, PageDriver, PassthroughAnnotator, ScreenshotAnnotator};
pub use llm::{
    ActCommand, ExtractOutcome, LlmClient, LlmError, ObservedElement, OpenAiClient, VisionPolicy,
};
pub use observe::ObservedTarget;
pub use recorder::Recorder;
pub use session::{
    ActOptions, ActOutcome, ExtractOptions, ObserveOptions, Session, SessionError,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.env, Environment::Local);
        assert_eq!(config.verbose, 0);
        assert!(!config.debug_dom);
        assert_eq!(config.dom_settle_timeout_ms, 60_000);
        assert!(!config.enable_caching);
        assert_eq!(config.browser.window.width, 1280);
        assert_eq!(config.browser.window.height, 720);
    }

    #[test]
    fn config_parses_partial_yaml_with_defaults() {
        let config: Config = serde_yaml::from_str("verbose: 2\ndebug_dom: true\n")
            .expect("partial config should parse");
        assert_eq!(config.verbose, 2);
        assert!(config.debug_dom);
        assert_eq!(config.dom_settle_timeout_ms, 60_000);
        assert!(config.browser.headless);
    }

    #[test]
    fn environment_parses_lowercase() {
        let config: Config = serde_yaml::from_str("env: remote\n").expect("env should parse");
        assert_eq!(config.env, Environment::Remote);
    }
}
