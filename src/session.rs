//! Public façade: one session, one page, three operations
//!
//! A [`Session`] owns a browser tab exclusively and exposes `act`, `extract`
//! and `observe` over it. Each call gets a fresh request id; failures are
//! captured at this level, evicting the request's LLM cache entries, and act
//! is the one operation that never errors — it reports failure structurally.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::browser::{BrowserError, BrowserResult, BrowserWrapper};
use crate::browser_setup;
use crate::dom::DomBridge;
use crate::dom::settle::wait_for_settled;
use crate::driver::{CdpDriver, PageDriver, PassthroughAnnotator, ScreenshotAnnotator};
use crate::llm::{LlmClient, LlmError, VisionPolicy};
use crate::logging::{ConsoleMirror, LogLine};
use crate::observe::ObservedTarget;
use crate::recorder::Recorder;
use crate::utils::new_request_id;
use crate::{Config, Environment, act, extract, observe};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("browser provisioning failed: {0}")]
    Provisioning(String),
}

#[derive(Debug, Clone)]
pub struct ActOptions {
    pub action: String,
    pub model_name: Option<String>,
    pub use_vision: VisionPolicy,
}

impl ActOptions {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            model_name: None,
            use_vision: VisionPolicy::Fallback,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub instruction: String,
    pub schema: Value,
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ObserveOptions {
    /// Defaults to a generic find-interactive-elements instruction
    pub instruction: Option<String>,
    pub model_name: Option<String>,
    pub use_vision: bool,
    pub full_page: bool,
}

/// The structured result of an act call. `success: false` carries an
/// explanatory message and the original action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActOutcome {
    pub success: bool,
    pub message: String,
    pub action: String,
}

/// Everything one loop invocation needs, bundled per request.
pub(crate) struct LoopContext {
    pub driver: Arc<dyn PageDriver>,
    pub bridge: DomBridge,
    pub llm: Arc<dyn LlmClient>,
    pub recorder: Arc<Recorder>,
    pub annotator: Arc<dyn ScreenshotAnnotator>,
    pub config: Config,
    pub request_id: String,
}

pub struct Session {
    config: Config,
    driver: Arc<dyn PageDriver>,
    llm: Arc<dyn LlmClient>,
    recorder: Arc<Recorder>,
    annotator: Arc<dyn ScreenshotAnnotator>,
    mirror: Arc<ConsoleMirror>,
    browser: Arc<Mutex<Option<BrowserWrapper>>>,
    session_id: Uuid,
}

impl Session {
    /// Launch a local browser and open the session's single page.
    ///
    /// Remote environments are provisioned by the caller; use
    /// [`Session::attach`] there.
    pub async fn launch(config: Config, llm: Arc<dyn LlmClient>) -> Result<Self, SessionError> {
        if config.env == Environment::Remote {
            return Err(SessionError::Provisioning(
                "remote sessions are provisioned externally; attach a driver instead".to_string(),
            ));
        }

        let (browser, handler, user_data_dir) = browser_setup::launch_browser(
            config.browser.headless,
            (config.browser.window.width, config.browser.window.height),
            config.browser.disable_security,
        )
        .await
        .map_err(|e| SessionError::Provisioning(e.to_string()))?;

        let wrapper = BrowserWrapper::new(browser, handler, user_data_dir);
        let page = wrapper
            .browser()
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Provisioning(format!("failed to open page: {e}")))?;

        let browser = Arc::new(Mutex::new(Some(wrapper)));
        let driver: Arc<dyn PageDriver> = Arc::new(CdpDriver::new(page, browser.clone()));
        Ok(Self::build(config, driver, llm, browser))
    }

    /// Wrap an externally provisioned page driver.
    pub fn attach(config: Config, driver: Arc<dyn PageDriver>, llm: Arc<dyn LlmClient>) -> Self {
        Self::build(config, driver, llm, Arc::new(Mutex::new(None)))
    }

    fn build(
        config: Config,
        driver: Arc<dyn PageDriver>,
        llm: Arc<dyn LlmClient>,
        browser: Arc<Mutex<Option<BrowserWrapper>>>,
    ) -> Self {
        let session = Self {
            mirror: Arc::new(ConsoleMirror::new(config.verbose)),
            config,
            driver,
            llm,
            recorder: Arc::new(Recorder::new()),
            annotator: Arc::new(PassthroughAnnotator),
            browser,
            session_id: Uuid::new_v4(),
        };
        info!(session_id = %session.session_id, "Session ready");
        session
    }

    /// Swap in a real screenshot annotation service.
    pub fn with_annotator(mut self, annotator: Arc<dyn ScreenshotAnnotator>) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn loop_context(&self, request_id: String) -> LoopContext {
        LoopContext {
            driver: self.driver.clone(),
            bridge: DomBridge::new(self.driver.clone(), self.config.debug_dom),
            llm: self.llm.clone(),
            recorder: self.recorder.clone(),
            annotator: self.annotator.clone(),
            config: self.config.clone(),
            request_id,
        }
    }

    fn model_for(&self, requested: &Option<String>) -> String {
        requested
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    /// Structured log entry, mirrored into the page console per verbosity.
    fn log(&self, category: &'static str, message: String, level: u8) {
        match level {
            0 | 1 => info!(category, "{message}"),
            _ => debug!(category, "{message}"),
        }
        self.mirror.enqueue(LogLine::new(category, message, level));
        let mirror = self.mirror.clone();
        let driver = self.driver.clone();
        tokio::spawn(async move {
            mirror.drain(&driver).await;
        });
    }

    /// Navigate the page; domcontentloaded and DOM settle always complete
    /// before this returns.
    pub async fn goto(&self, url: &str) -> Result<(), SessionError> {
        url::Url::parse(url)
            .map_err(|e| BrowserError::NavigationFailed(format!("{url}: {e}")))?;
        self.driver.goto(url).await?;
        self.driver.wait_for_navigation().await?;
        wait_for_settled(&self.driver, self.config.dom_settle_timeout_ms).await;
        Ok(())
    }

    /// Perform a natural-language instruction against the page.
    ///
    /// Never errors: failures come back as `success: false` with an
    /// explanatory message.
    pub async fn act(&self, options: ActOptions) -> ActOutcome {
        let request_id = new_request_id();
        self.log("act", format!("Running: {}", options.action), 1);
        let model = self.model_for(&options.model_name);
        let ctx = self.loop_context(request_id.clone());

        match act::run_act_loop(&ctx, &options.action, &model, options.use_vision, true).await {
            Ok(outcome) => {
                self.log(
                    "act",
                    format!("Finished (success={}): {}", outcome.success, options.action),
                    1,
                );
                outcome
            }
            Err(e) => {
                error!("act failed: {e}");
                if self.config.enable_caching {
                    self.llm.evict_request_cache(&request_id);
                }
                ActOutcome {
                    success: false,
                    message: format!("Internal error: {e}"),
                    action: options.action,
                }
            }
        }
    }

    /// Pull structured data conforming to `schema` out of the page.
    pub async fn extract(&self, options: ExtractOptions) -> Result<Value, SessionError> {
        let request_id = new_request_id();
        self.log("extract", format!("Running: {}", options.instruction), 1);
        let model = self.model_for(&options.model_name);
        let ctx = self.loop_context(request_id.clone());

        match extract::run_extract_loop(&ctx, &options.instruction, &options.schema, &model).await
        {
            Ok(value) => Ok(value),
            Err(e) => {
                error!("extract failed: {e}");
                if self.config.enable_caching {
                    self.llm.evict_request_cache(&request_id);
                }
                Err(e)
            }
        }
    }

    /// [`Session::extract`] with the schema derived from `T`.
    pub async fn extract_into<T>(&self, instruction: &str) -> Result<T, SessionError>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))?;
        let value = self
            .extract(ExtractOptions {
                instruction: instruction.to_string(),
                schema,
                model_name: None,
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Enumerate candidate interactive elements on the page.
    pub async fn observe(
        &self,
        options: ObserveOptions,
    ) -> Result<Vec<ObservedTarget>, SessionError> {
        let request_id = new_request_id();
        let instruction = options
            .instruction
            .clone()
            .unwrap_or_else(|| crate::llm::DEFAULT_OBSERVE_INSTRUCTION.to_string());
        self.log("observe", format!("Running: {instruction}"), 1);
        let model = self.model_for(&options.model_name);
        let ctx = self.loop_context(request_id.clone());

        match observe::run_observe(
            &ctx,
            &instruction,
            options.use_vision,
            options.full_page,
            &model,
        )
        .await
        {
            Ok(targets) => Ok(targets),
            Err(e) => {
                error!("observe failed: {e}");
                if self.config.enable_caching {
                    self.llm.evict_request_cache(&request_id);
                }
                Err(e)
            }
        }
    }

    /// Shut the local browser down gracefully. No-op for attached sessions.
    pub async fn close(&self) -> BrowserResult<()> {
        let mut guard = self.browser.lock().await;
        if let Some(mut wrapper) = guard.take() {
            wrapper.shutdown().await;
        }
        Ok(())
    }
}
