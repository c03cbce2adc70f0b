//! Observe pipeline: enumerate candidate interactive elements
//!
//! One-shot, not chunked: the first chunk (or the full page, on request) is
//! serialized, handed to the model, and the returned element ids are mapped
//! back into xpath selectors.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dom::settle::wait_for_settled;
use crate::llm::ObserveRequest;
use crate::session::{LoopContext, SessionError};

/// What `outputString` becomes when the model is told to read the screenshot
/// instead.
pub(crate) const VISION_SENTINEL: &str = "n/a. use the image to find the elements.";

/// One interactive element, ready for dispatch: `selector` is always
/// `"xpath="`-prefixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservedTarget {
    pub selector: String,
    pub description: String,
}

pub(crate) async fn run_observe(
    ctx: &LoopContext,
    instruction: &str,
    use_vision: bool,
    full_page: bool,
    model: &str,
) -> Result<Vec<ObservedTarget>, SessionError> {
    wait_for_settled(&ctx.driver, ctx.config.dom_settle_timeout_ms).await;
    ctx.bridge.debug_start().await;

    // Observation is single-chunk even when the DOM is larger; callers that
    // need everything pass full_page.
    let (mut output_string, selector_map) = if full_page {
        let snapshot = ctx.bridge.process_all_of_dom().await?;
        (snapshot.output_string, snapshot.selector_map)
    } else {
        let snapshot = ctx.bridge.process_dom(&[]).await?;
        (snapshot.output_string, snapshot.selector_map)
    };

    let mut screenshot = None;
    if use_vision {
        if ctx.llm.supports_vision(model) {
            let shot = ctx
                .annotator
                .annotated_screenshot(&ctx.driver, &selector_map, full_page)
                .await?;
            screenshot = Some(shot);
            output_string = VISION_SENTINEL.to_string();
        } else {
            warn!(
                model,
                "Model does not support vision; observing from the serialized DOM only"
            );
        }
    }

    let elements = ctx
        .llm
        .observe(ObserveRequest {
            instruction: instruction.to_string(),
            dom_elements: output_string,
            screenshot,
            model: model.to_string(),
            request_id: ctx.request_id.clone(),
        })
        .await?;

    let mut targets = Vec::with_capacity(elements.len());
    for element in elements {
        match selector_map.get(&element.element_id) {
            Some(xpath) => targets.push(ObservedTarget {
                selector: format!("xpath={xpath}"),
                description: element.description,
            }),
            None => warn!(
                element_id = element.element_id,
                "Model returned an element id absent from the selector map; skipping"
            ),
        }
    }

    ctx.bridge.debug_cleanup().await;
    ctx.recorder.record_observation(instruction, &targets);
    info!(count = targets.len(), "Observation complete");
    Ok(targets)
}
