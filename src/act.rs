//! Act loop: perform a natural-language instruction against the live page
//!
//! Iterative state machine over `{chunks_seen, steps, vision, retries}`.
//! Each round serializes one unseen chunk and asks the model for the next
//! elementary command. A null plan advances to the next chunk; once chunks
//! run out, a `Fallback` vision policy replays the last view with a
//! screenshot before giving up. Dispatched commands are retried on failure,
//! and a claimed completion must survive an independent verification call
//! before the loop reports success.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::BrowserError;
use crate::dom::ChunkSnapshot;
use crate::dom::settle::wait_for_settled;
use crate::llm::{ActCommand, ActPlanRequest, VerifyRequest, VisionPolicy};
use crate::session::{ActOutcome, LoopContext, SessionError};
use crate::utils::constants::{MAX_DISPATCH_RETRIES, NETWORK_IDLE_RACE_MS, NEW_TAB_RACE_MS};

#[derive(Error, Debug)]
pub(crate) enum DispatchError {
    #[error("Internal error: Chosen method {0} is invalid")]
    InvalidMethod(String),

    #[error("element {0} is not present in the selector map")]
    UnknownElement(u64),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// The supported locator methods, closed. Anything the model invents outside
/// this set is rejected before it reaches the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionMethod {
    Click,
    Fill,
    Press,
    ScrollIntoView,
    Hover,
    Check,
    Uncheck,
    Focus,
}

impl ActionMethod {
    fn parse(name: &str) -> Result<Self, DispatchError> {
        match name {
            "click" => Ok(Self::Click),
            "fill" | "type" => Ok(Self::Fill),
            "press" => Ok(Self::Press),
            "scrollIntoView" => Ok(Self::ScrollIntoView),
            "hover" => Ok(Self::Hover),
            "check" => Ok(Self::Check),
            "uncheck" => Ok(Self::Uncheck),
            "focus" => Ok(Self::Focus),
            other => Err(DispatchError::InvalidMethod(other.to_string())),
        }
    }
}

pub(crate) async fn run_act_loop(
    ctx: &LoopContext,
    action: &str,
    model: &str,
    use_vision: VisionPolicy,
    verifier_use_vision: bool,
) -> Result<ActOutcome, SessionError> {
    let mut chunks_seen: Vec<u64> = Vec::new();
    let mut steps = String::new();
    let mut retries: u32 = 0;
    let mut vision = use_vision;
    let mut verifier_vision = verifier_use_vision;
    let mut vision_warned = false;
    let mut rejections: usize = 0;
    let mut iterations: usize = 0;
    let mut iteration_budget: Option<usize> = None;

    loop {
        iterations += 1;
        if let Some(budget) = iteration_budget
            && iterations > budget
        {
            warn!(iterations, "Iteration budget exhausted; giving up on action");
            return Ok(give_up(ctx, action).await);
        }

        // Phase A: vision gating, for both planning and verification
        if !ctx.llm.supports_vision(model) {
            if vision != VisionPolicy::Off && !vision_warned {
                warn!(model, "Model does not support vision; planning text-only");
                vision_warned = true;
            }
            vision = VisionPolicy::Off;
            verifier_vision = false;
        }

        // Phase B: serialize one unseen chunk
        wait_for_settled(&ctx.driver, ctx.config.dom_settle_timeout_ms).await;
        ctx.bridge.debug_start().await;

        let snapshot = match ctx.bridge.process_dom(&chunks_seen).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("DOM serialization failed; giving up on action: {e}");
                return Ok(give_up(ctx, action).await);
            }
        };
        if iteration_budget.is_none() {
            // every chunk, one vision replay (+1 spare), three dispatch
            // attempts, and the configured per-action step allowance
            iteration_budget = Some(
                snapshot.chunks.len() + 2 + (MAX_DISPATCH_RETRIES as usize + 1) + ctx.config.max_steps,
            );
        }

        let screenshot = if vision == VisionPolicy::On {
            match ctx
                .annotator
                .annotated_screenshot(&ctx.driver, &snapshot.selector_map, false)
                .await
            {
                Ok(shot) => Some(shot),
                Err(e) => {
                    warn!("Annotated screenshot failed; planning text-only: {e}");
                    None
                }
            }
        } else {
            None
        };

        // Phase C: ask for the next command
        let command = ctx
            .llm
            .plan_act(ActPlanRequest {
                action: action.to_string(),
                dom_elements: snapshot.output_string.clone(),
                steps: steps.clone(),
                screenshot,
                model: model.to_string(),
                request_id: ctx.request_id.clone(),
            })
            .await?;

        // Phase D: nothing actionable in this chunk
        let Some(command) = command else {
            if chunks_seen.len() + 1 < snapshot.chunks.len() {
                chunks_seen.push(snapshot.chunk);
                steps.push_str("## Step: Scrolled to another section\n");
                retries = 0;
                debug!(
                    seen = chunks_seen.len(),
                    total = snapshot.chunks.len(),
                    "No actionable element; advancing to the next chunk"
                );
                continue;
            }
            if vision == VisionPolicy::Fallback {
                info!("Chunks exhausted without a plan; replaying with a screenshot");
                if let Err(e) = ctx.bridge.scroll_to_top().await {
                    warn!("Scroll to top before vision replay failed: {e}");
                }
                vision = VisionPolicy::On;
                retries = 0;
                continue;
            }
            return Ok(give_up(ctx, action).await);
        };

        // Phase E/F: dispatch, folding any spawned tab back into the page
        match dispatch(ctx, &snapshot, &command).await {
            Err(error) => {
                // Phase G: the whole iteration is retried; chunks_seen,
                // steps and vision stay untouched
                if retries < MAX_DISPATCH_RETRIES {
                    retries += 1;
                    warn!(attempt = retries + 1, "Dispatch failed, retrying: {error}");
                    continue;
                }
                ctx.recorder.record_action(action, "");
                if ctx.config.enable_caching {
                    ctx.llm.evict_request_cache(&ctx.request_id);
                }
                ctx.bridge.debug_cleanup().await;
                let message = match &error {
                    DispatchError::InvalidMethod(_) => error.to_string(),
                    other => format!("Error performing action: {other}"),
                };
                return Ok(ActOutcome {
                    success: false,
                    message,
                    action: action.to_string(),
                });
            }
            Ok(()) => {
                retries = 0;

                // Phase H: audit trail
                let element = element_text(&snapshot.output_string, command.element);
                steps.push_str(&format!(
                    "## Step: {}\n  Element: {}\n  Action: {}\n  Reasoning: {}\n",
                    command.step, element, command.method, command.why
                ));

                // Phase I: a claimed completion must survive verification
                if command.completed {
                    let verified =
                        verify_completion(ctx, action, &steps, verifier_vision, model).await?;
                    if verified {
                        let message = format!("Action completed successfully: {steps}");
                        ctx.recorder.record_action(action, &message);
                        ctx.bridge.debug_cleanup().await;
                        info!("Action verified complete");
                        return Ok(ActOutcome {
                            success: true,
                            message,
                            action: action.to_string(),
                        });
                    }

                    rejections += 1;
                    if rejections >= snapshot.chunks.len().max(1) {
                        warn!(
                            rejections,
                            "Completion claimed but never verified; giving up"
                        );
                        return Ok(give_up(ctx, action).await);
                    }
                    debug!("Verifier rejected the completion claim; continuing");
                }
            }
        }
    }
}

async fn give_up(ctx: &LoopContext, action: &str) -> ActOutcome {
    if ctx.config.enable_caching {
        ctx.llm.evict_request_cache(&ctx.request_id);
    }
    ctx.bridge.debug_cleanup().await;
    ActOutcome {
        success: false,
        message: "Action was not able to be completed.".to_string(),
        action: action.to_string(),
    }
}

async fn dispatch(
    ctx: &LoopContext,
    snapshot: &ChunkSnapshot,
    command: &ActCommand,
) -> Result<(), DispatchError> {
    let method = ActionMethod::parse(&command.method)?;
    let xpath = snapshot
        .selector_map
        .get(&command.element)
        .ok_or(DispatchError::UnknownElement(command.element))?;
    let first_arg = command
        .args
        .first()
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    debug!(method = %command.method, element = command.element, xpath = %xpath, "Dispatching");

    match method {
        ActionMethod::Click => {
            let url_before = ctx.driver.current_url().await.unwrap_or_default();
            ctx.driver.click(xpath).await?;
            settle_after_click(ctx, &url_before).await?;
        }
        ActionMethod::Fill => ctx.driver.fill(xpath, first_arg).await?,
        ActionMethod::Press => ctx.driver.press(first_arg).await?,
        ActionMethod::ScrollIntoView => ctx.driver.scroll_into_view(xpath).await?,
        ActionMethod::Hover => ctx.driver.hover(xpath).await?,
        ActionMethod::Check => ctx.driver.set_checked(xpath, true).await?,
        ActionMethod::Uncheck => ctx.driver.set_checked(xpath, false).await?,
        ActionMethod::Focus => ctx.driver.focus(xpath).await?,
    }
    Ok(())
}

/// Post-click bookkeeping: fold a spawned tab back into the single owned
/// page, give the network a bounded chance to go idle, and note navigations.
async fn settle_after_click(ctx: &LoopContext, url_before: &str) -> Result<(), DispatchError> {
    if let Some(new_page) = ctx
        .driver
        .wait_for_new_page(Duration::from_millis(NEW_TAB_RACE_MS))
        .await?
    {
        info!(url = %new_page.url, "Click opened a new tab; continuing in the main page");
        ctx.driver.goto(&new_page.url).await?;
        ctx.driver.wait_for_navigation().await?;
        wait_for_settled(&ctx.driver, ctx.config.dom_settle_timeout_ms).await;
    }

    match tokio::time::timeout(
        Duration::from_millis(NETWORK_IDLE_RACE_MS),
        ctx.driver.wait_for_network_idle(),
    )
    .await
    {
        Err(_) => debug!("Network idle race timed out; continuing"),
        Ok(Err(e)) => debug!("Network idle wait errored; continuing: {e}"),
        Ok(Ok(())) => {}
    }

    let url_after = ctx.driver.current_url().await.unwrap_or_default();
    if url_after != url_before {
        info!(from = %url_before, to = %url_after, "Page navigated after click");
    }
    Ok(())
}

async fn verify_completion(
    ctx: &LoopContext,
    goal: &str,
    steps: &str,
    verifier_vision: bool,
    model: &str,
) -> Result<bool, SessionError> {
    let (screenshot, dom_elements) = if verifier_vision {
        let shot = match ctx.driver.screenshot(true).await {
            Ok(shot) => shot,
            Err(first) => {
                warn!("Full-page screenshot failed, retrying once: {first}");
                ctx.driver.screenshot(true).await?
            }
        };
        (Some(shot), None)
    } else {
        let page = ctx.bridge.process_all_of_dom().await?;
        (None, Some(page.output_string))
    };

    let verified = ctx
        .llm
        .verify_act_completion(VerifyRequest {
            goal: goal.to_string(),
            steps: steps.to_string(),
            screenshot,
            dom_elements,
            model: model.to_string(),
            request_id: ctx.request_id.clone(),
        })
        .await?;
    Ok(verified)
}

/// The text shown in the audit trail for a dispatched element: whatever
/// follows `"<id>:"` on its line in the chunk serialization.
fn element_text(output_string: &str, element_id: u64) -> String {
    let prefix = format!("{element_id}:");
    output_string
        .lines()
        .find_map(|line| line.strip_prefix(&prefix))
        .map(|rest| rest.trim().to_string())
        .unwrap_or_else(|| "Element not found".to_string())
}
