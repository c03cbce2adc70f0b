//! Extract loop: progressive accumulation of schema-shaped data
//!
//! Walks the page chunk by chunk. Each iteration shows the model one unseen
//! chunk plus everything extracted so far; the model hands back an updated
//! value and says whether it is done. Terminates on `completed` or when every
//! chunk has been seen.

use serde_json::Value;
use tracing::{debug, warn};

use crate::dom::settle::wait_for_settled;
use crate::llm::ExtractRequest;
use crate::session::{LoopContext, SessionError};

pub(crate) async fn run_extract_loop(
    ctx: &LoopContext,
    instruction: &str,
    schema: &Value,
    model: &str,
) -> Result<Value, SessionError> {
    let mut chunks_seen: Vec<u64> = Vec::new();
    let mut progress = String::new();
    let mut content = serde_json::Map::new();

    loop {
        wait_for_settled(&ctx.driver, ctx.config.dom_settle_timeout_ms).await;
        ctx.bridge.debug_start().await;

        let snapshot = match ctx.bridge.process_dom(&chunks_seen).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "DOM serialization failed mid-extract; returning what was accumulated: {e}"
                );
                ctx.bridge.debug_cleanup().await;
                return Ok(Value::Object(content));
            }
        };

        let outcome = ctx
            .llm
            .extract(ExtractRequest {
                instruction: instruction.to_string(),
                progress: progress.clone(),
                previously_extracted: Value::Object(content.clone()),
                dom_elements: snapshot.output_string.clone(),
                schema: schema.clone(),
                chunks_seen: chunks_seen.len(),
                chunks_total: snapshot.chunks.len(),
                model: model.to_string(),
                request_id: ctx.request_id.clone(),
            })
            .await?;

        progress = outcome.metadata.progress;
        // Shallow merge, last writer wins on overlapping fields
        for (key, value) in outcome.fields {
            content.insert(key, value);
        }
        chunks_seen.push(snapshot.chunk);

        debug!(
            chunks_seen = chunks_seen.len(),
            chunks_total = snapshot.chunks.len(),
            completed = outcome.metadata.completed,
            progress = %progress,
            "Extract iteration finished"
        );

        if outcome.metadata.completed || chunks_seen.len() == snapshot.chunks.len() {
            ctx.bridge.debug_cleanup().await;
            return Ok(Value::Object(content));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    // The merge rule the loop applies to model output, isolated: new fields
    // land, overlapping fields take the newer value, untouched fields stay.
    #[test]
    fn shallow_merge_is_last_writer_wins() {
        let mut content = serde_json::Map::new();
        for (key, value) in [("title", json!("Hello")), ("items", json!(["a"]))] {
            content.insert(key.to_string(), value);
        }
        for (key, value) in [("items", json!(["a", "b"])), ("author", json!("x"))] {
            content.insert(key.to_string(), value);
        }

        assert_eq!(content["title"], json!("Hello"));
        assert_eq!(content["items"], json!(["a", "b"]));
        assert_eq!(content["author"], json!("x"));
    }
}
