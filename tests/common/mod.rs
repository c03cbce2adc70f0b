//! Shared fixtures: a scriptable page driver and a scriptable model
//!
//! The loops only see the `PageDriver` and `LlmClient` traits, so the whole
//! control flow is exercised here without a browser or network. Both mocks
//! pop pre-queued answers and record what they were asked.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use pagehand::browser::{BrowserError, BrowserResult};
use pagehand::driver::{NewPage, PageDriver};
use pagehand::llm::{
    ActCommand, ActPlanRequest, ExtractMetadata, ExtractOutcome, ExtractRequest, LlmClient,
    LlmError, LlmResult, ObserveRequest, ObservedElement, VerifyRequest,
};
use pagehand::{Config, Session};

#[derive(Default)]
pub struct DriverLog {
    pub process_dom_calls: usize,
    pub process_all_calls: usize,
    pub scroll_to_top_calls: usize,
    pub clicks: Vec<String>,
    pub fills: Vec<(String, String)>,
    pub presses: Vec<String>,
    pub gotos: Vec<String>,
    pub navigation_waits: usize,
    pub new_page_waits: usize,
    pub screenshots: usize,
}

#[derive(Default)]
pub struct MockDriver {
    pub chunks: Mutex<VecDeque<Value>>,
    pub full_page: Mutex<Option<Value>>,
    pub new_pages: Mutex<VecDeque<Option<NewPage>>>,
    pub urls: Mutex<VecDeque<String>>,
    pub click_failures: Mutex<usize>,
    pub screenshot_failures: Mutex<usize>,
    /// Make every settle heuristic hang, for timeout tests
    pub settle_hangs: bool,
    pub log: Mutex<DriverLog>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_chunk(&self, value: Value) {
        self.chunks.lock().push_back(value);
    }

    pub fn set_full_page(&self, value: Value) {
        *self.full_page.lock() = Some(value);
    }

    async fn hang_if_requested(&self) {
        if self.settle_hangs {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn evaluate(&self, expression: &str) -> BrowserResult<Value> {
        if expression.starts_with("window.processDom(") {
            self.log.lock().process_dom_calls += 1;
            return self
                .chunks
                .lock()
                .pop_front()
                .ok_or_else(|| BrowserError::Script("mock: chunk queue exhausted".to_string()));
        }
        if expression.starts_with("window.processAllOfDom") {
            self.log.lock().process_all_calls += 1;
            return self
                .full_page
                .lock()
                .clone()
                .ok_or_else(|| BrowserError::Script("mock: no full-page snapshot".to_string()));
        }
        if expression.starts_with("window.scrollToHeight") {
            self.log.lock().scroll_to_top_calls += 1;
            return Ok(Value::Null);
        }
        if expression.starts_with("window.waitForDomSettle") {
            self.hang_if_requested().await;
            return Ok(Value::Null);
        }
        if expression.starts_with("document.readyState") {
            self.hang_if_requested().await;
            return Ok(json!("complete"));
        }
        if expression.starts_with("document.querySelector") {
            self.hang_if_requested().await;
            return Ok(json!(true));
        }
        // debug overlay, console mirror, anything cosmetic
        Ok(Value::Null)
    }

    async fn goto(&self, url: &str) -> BrowserResult<()> {
        self.log.lock().gotos.push(url.to_string());
        self.urls.lock().push_back(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        let urls = self.urls.lock();
        Ok(urls.back().cloned().unwrap_or_default())
    }

    async fn wait_for_navigation(&self) -> BrowserResult<()> {
        self.log.lock().navigation_waits += 1;
        Ok(())
    }

    async fn wait_for_network_idle(&self) -> BrowserResult<()> {
        Ok(())
    }

    async fn click(&self, xpath: &str) -> BrowserResult<()> {
        self.log.lock().clicks.push(xpath.to_string());
        let mut failures = self.click_failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(BrowserError::Input("mock: click refused".to_string()));
        }
        Ok(())
    }

    async fn fill(&self, xpath: &str, text: &str) -> BrowserResult<()> {
        self.log
            .lock()
            .fills
            .push((xpath.to_string(), text.to_string()));
        Ok(())
    }

    async fn press(&self, key: &str) -> BrowserResult<()> {
        self.log.lock().presses.push(key.to_string());
        Ok(())
    }

    async fn scroll_into_view(&self, _xpath: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn hover(&self, _xpath: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn set_checked(&self, _xpath: &str, _checked: bool) -> BrowserResult<()> {
        Ok(())
    }

    async fn focus(&self, _xpath: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn screenshot(&self, _full_page: bool) -> BrowserResult<Vec<u8>> {
        self.log.lock().screenshots += 1;
        let mut failures = self.screenshot_failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(BrowserError::Screenshot("mock: capture refused".to_string()));
        }
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn wait_for_new_page(&self, _timeout: Duration) -> BrowserResult<Option<NewPage>> {
        self.log.lock().new_page_waits += 1;
        Ok(self.new_pages.lock().pop_front().flatten())
    }
}

#[derive(Default)]
pub struct MockLlm {
    pub vision: bool,
    pub act_plans: Mutex<VecDeque<Option<ActCommand>>>,
    pub extracts: Mutex<VecDeque<ExtractOutcome>>,
    pub observations: Mutex<VecDeque<Vec<ObservedElement>>>,
    pub verdicts: Mutex<VecDeque<bool>>,
    pub seen_act: Mutex<Vec<ActPlanRequest>>,
    pub seen_extract: Mutex<Vec<ExtractRequest>>,
    pub seen_verify: Mutex<Vec<VerifyRequest>>,
    pub evicted: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vision() -> Self {
        Self {
            vision: true,
            ..Self::default()
        }
    }

    pub fn queue_plan(&self, plan: Option<ActCommand>) {
        self.act_plans.lock().push_back(plan);
    }

    pub fn queue_extract(&self, outcome: ExtractOutcome) {
        self.extracts.lock().push_back(outcome);
    }

    pub fn queue_observation(&self, elements: Vec<ObservedElement>) {
        self.observations.lock().push_back(elements);
    }

    pub fn queue_verdict(&self, verdict: bool) {
        self.verdicts.lock().push_back(verdict);
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn supports_vision(&self, _model: &str) -> bool {
        self.vision
    }

    async fn plan_act(&self, request: ActPlanRequest) -> LlmResult<Option<ActCommand>> {
        self.seen_act.lock().push(request);
        self.act_plans
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::MalformedResponse("mock: act queue exhausted".to_string()))
    }

    async fn extract(&self, request: ExtractRequest) -> LlmResult<ExtractOutcome> {
        self.seen_extract.lock().push(request);
        self.extracts
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::MalformedResponse("mock: extract queue exhausted".to_string()))
    }

    async fn observe(&self, _request: ObserveRequest) -> LlmResult<Vec<ObservedElement>> {
        self.observations
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::MalformedResponse("mock: observe queue exhausted".to_string()))
    }

    async fn verify_act_completion(&self, request: VerifyRequest) -> LlmResult<bool> {
        self.seen_verify.lock().push(request);
        self.verdicts
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::MalformedResponse("mock: verify queue exhausted".to_string()))
    }

    fn evict_request_cache(&self, request_id: &str) {
        self.evicted.lock().push(request_id.to_string());
    }
}

/// A single-chunk page: chunk 0 of [0].
pub fn single_chunk(output: &str, selectors: &[(u64, &str)]) -> Value {
    chunk_of(output, selectors, 0, &[0])
}

pub fn chunk_of(output: &str, selectors: &[(u64, &str)], chunk: u64, chunks: &[u64]) -> Value {
    let selector_map: serde_json::Map<String, Value> = selectors
        .iter()
        .map(|(id, xpath)| (id.to_string(), json!(xpath)))
        .collect();
    json!({
        "outputString": output,
        "selectorMap": selector_map,
        "chunk": chunk,
        "chunks": chunks,
    })
}

pub fn page_snapshot(output: &str, selectors: &[(u64, &str)]) -> Value {
    let selector_map: serde_json::Map<String, Value> = selectors
        .iter()
        .map(|(id, xpath)| (id.to_string(), json!(xpath)))
        .collect();
    json!({
        "outputString": output,
        "selectorMap": selector_map,
    })
}

pub fn click_command(element: u64, step: &str, completed: bool) -> ActCommand {
    ActCommand {
        element,
        method: "click".to_string(),
        args: vec![],
        step: step.to_string(),
        why: "btn".to_string(),
        completed,
    }
}

pub fn extract_outcome(progress: &str, completed: bool, fields: Value) -> ExtractOutcome {
    let fields = match fields {
        Value::Object(map) => map,
        other => panic!("extract fields must be an object, got {other}"),
    };
    ExtractOutcome {
        metadata: ExtractMetadata {
            progress: progress.to_string(),
            completed,
        },
        fields,
    }
}

pub fn session_with(driver: Arc<MockDriver>, llm: Arc<MockLlm>, config: Config) -> Session {
    init_test_logging();
    Session::attach(config, driver, llm)
}

/// Route loop tracing through `RUST_LOG` for failing-test forensics.
fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
