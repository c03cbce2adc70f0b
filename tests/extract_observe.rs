//! Extract-loop and observe-pipeline behavior against scripted driver and model

mod common;

use std::sync::Arc;

use common::*;
use pagehand::llm::ObservedElement;
use pagehand::recorder::sha256_hex;
use pagehand::{Config, ExtractOptions, ObserveOptions};
use serde_json::json;

fn extract_options(instruction: &str) -> ExtractOptions {
    ExtractOptions {
        instruction: instruction.to_string(),
        schema: json!({
            "type": "object",
            "properties": { "title": { "type": "string" }, "items": { "type": "array" } }
        }),
        model_name: None,
    }
}

/// Single chunk, model reports completed: one DOM call, fields come back
/// without the metadata envelope.
#[tokio::test]
async fn extract_single_chunk_completed() {
    let driver = Arc::new(MockDriver::new());
    driver.queue_chunk(single_chunk("0:Hello headline", &[(0, "/h1[1]")]));

    let llm = Arc::new(MockLlm::new());
    llm.queue_extract(extract_outcome("done", true, json!({ "title": "Hello" })));

    let session = session_with(driver.clone(), llm.clone(), Config::default());
    let value = session
        .extract(extract_options("get the page title"))
        .await
        .expect("extract should succeed");

    assert_eq!(value, json!({ "title": "Hello" }));
    assert_eq!(driver.log.lock().process_dom_calls, 1);
}

/// Two chunks, first pass incomplete: the partial value is carried into the
/// second call and the accumulated result comes back. Two DOM calls.
#[tokio::test]
async fn extract_accumulates_across_chunks() {
    let driver = Arc::new(MockDriver::new());
    driver.queue_chunk(chunk_of("0:item a", &[(0, "/li[1]")], 0, &[0, 1]));
    driver.queue_chunk(chunk_of("1:item b", &[(1, "/li[2]")], 1, &[0, 1]));

    let llm = Arc::new(MockLlm::new());
    llm.queue_extract(extract_outcome("half", false, json!({ "items": ["a"] })));
    llm.queue_extract(extract_outcome("done", true, json!({ "items": ["a", "b"] })));

    let session = session_with(driver.clone(), llm.clone(), Config::default());
    let value = session
        .extract(extract_options("list the items"))
        .await
        .expect("extract should succeed");

    assert_eq!(value, json!({ "items": ["a", "b"] }));
    assert_eq!(driver.log.lock().process_dom_calls, 2);

    let seen = llm.seen_extract.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].previously_extracted, json!({}));
    assert_eq!(seen[0].chunks_seen, 0);
    assert_eq!(seen[0].chunks_total, 2);
    assert_eq!(seen[1].previously_extracted, json!({ "items": ["a"] }));
    assert_eq!(seen[1].progress, "half");
    assert_eq!(seen[1].chunks_seen, 1);
}

/// Chunk exhaustion terminates extraction even without a completed flag.
#[tokio::test]
async fn extract_stops_at_chunk_exhaustion() {
    let driver = Arc::new(MockDriver::new());
    driver.queue_chunk(single_chunk("0:only section", &[(0, "/p[1]")]));

    let llm = Arc::new(MockLlm::new());
    llm.queue_extract(extract_outcome("partial", false, json!({ "title": "Only" })));

    let session = session_with(driver.clone(), llm.clone(), Config::default());
    let value = session
        .extract(extract_options("get the title"))
        .await
        .expect("extract should succeed");

    assert_eq!(value, json!({ "title": "Only" }));
    assert_eq!(driver.log.lock().process_dom_calls, 1);
}

/// A DOM-script failure mid-loop returns what was accumulated instead of
/// erroring.
#[tokio::test]
async fn extract_returns_partial_value_on_dom_failure() {
    let driver = Arc::new(MockDriver::new());
    driver.queue_chunk(chunk_of("0:item a", &[(0, "/li[1]")], 0, &[0, 1]));
    // second process_dom call finds the queue empty -> script error

    let llm = Arc::new(MockLlm::new());
    llm.queue_extract(extract_outcome("half", false, json!({ "items": ["a"] })));

    let session = session_with(driver.clone(), llm.clone(), Config::default());
    let value = session
        .extract(extract_options("list the items"))
        .await
        .expect("extract should fall back to the partial value");

    assert_eq!(value, json!({ "items": ["a"] }));
}

/// Element ids come back mapped through the selector map, xpath-prefixed.
#[tokio::test]
async fn observe_maps_ids_to_selectors() {
    let driver = Arc::new(MockDriver::new());
    driver.queue_chunk(single_chunk(
        "0:Login button\n1:Signup",
        &[(0, "/a[1]"), (1, "/a[2]")],
    ));

    let llm = Arc::new(MockLlm::new());
    llm.queue_observation(vec![ObservedElement {
        element_id: 0,
        description: "Login".to_string(),
    }]);

    let session = session_with(driver.clone(), llm.clone(), Config::default());
    let targets = session
        .observe(ObserveOptions {
            instruction: Some("find the login button".to_string()),
            ..ObserveOptions::default()
        })
        .await
        .expect("observe should succeed");

    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].selector, "xpath=/a[1]");
    assert_eq!(targets[0].description, "Login");
}

/// Every selector is xpath-prefixed, ids missing from the map are skipped,
/// and the observation lands in the recorder.
#[tokio::test]
async fn observe_skips_unknown_ids_and_records() {
    let driver = Arc::new(MockDriver::new());
    driver.queue_chunk(single_chunk("0:Home\n1:About", &[(0, "/a[1]"), (1, "/a[2]")]));

    let llm = Arc::new(MockLlm::new());
    llm.queue_observation(vec![
        ObservedElement {
            element_id: 1,
            description: "About".to_string(),
        },
        ObservedElement {
            element_id: 99,
            description: "Phantom".to_string(),
        },
    ]);

    let session = session_with(driver.clone(), llm.clone(), Config::default());
    let targets = session
        .observe(ObserveOptions {
            instruction: Some("find nav links".to_string()),
            ..ObserveOptions::default()
        })
        .await
        .expect("observe should succeed");

    assert_eq!(targets.len(), 1);
    assert!(targets.iter().all(|t| t.selector.starts_with("xpath=")));

    let record = session
        .recorder()
        .observation(&sha256_hex("find nav links"))
        .expect("observation should be recorded");
    assert_eq!(record.instruction, "find nav links");
    assert_eq!(record.result, targets);
}

/// Observing twice with one instruction overwrites rather than duplicates.
#[tokio::test]
async fn observe_twice_keeps_one_record() {
    let driver = Arc::new(MockDriver::new());
    driver.queue_chunk(single_chunk("0:First", &[(0, "/a[1]")]));
    driver.queue_chunk(single_chunk("0:Second", &[(0, "/a[9]")]));

    let llm = Arc::new(MockLlm::new());
    llm.queue_observation(vec![ObservedElement {
        element_id: 0,
        description: "First".to_string(),
    }]);
    llm.queue_observation(vec![ObservedElement {
        element_id: 0,
        description: "Second".to_string(),
    }]);

    let session = session_with(driver.clone(), llm.clone(), Config::default());
    let options = || ObserveOptions {
        instruction: Some("find the link".to_string()),
        ..ObserveOptions::default()
    };
    session.observe(options()).await.expect("first observe");
    session.observe(options()).await.expect("second observe");

    assert_eq!(session.recorder().observation_count(), 1);
    let record = session
        .recorder()
        .observation(&sha256_hex("find the link"))
        .expect("record should exist");
    assert_eq!(record.result[0].selector, "xpath=/a[9]");
}

/// Full-page observation uses the flat serialization, not a chunk.
#[tokio::test]
async fn observe_full_page_uses_flat_serialization() {
    let driver = Arc::new(MockDriver::new());
    driver.set_full_page(page_snapshot("0:Everything", &[(0, "/main[1]")]));

    let llm = Arc::new(MockLlm::new());
    llm.queue_observation(vec![ObservedElement {
        element_id: 0,
        description: "Everything".to_string(),
    }]);

    let session = session_with(driver.clone(), llm.clone(), Config::default());
    let targets = session
        .observe(ObserveOptions {
            instruction: Some("survey the page".to_string()),
            full_page: true,
            ..ObserveOptions::default()
        })
        .await
        .expect("observe should succeed");

    assert_eq!(targets[0].selector, "xpath=/main[1]");
    let log = driver.log.lock();
    assert_eq!(log.process_all_calls, 1);
    assert_eq!(log.process_dom_calls, 0);
}

/// With vision requested on a capable model, the DOM text is replaced by the
/// sentinel and a screenshot rides along. (Observed through the mock's
/// absence of vision here: an incapable model keeps the DOM text.)
#[tokio::test]
async fn observe_without_vision_support_keeps_dom_text() {
    let driver = Arc::new(MockDriver::new());
    driver.queue_chunk(single_chunk("0:Link", &[(0, "/a[1]")]));

    let llm = Arc::new(MockLlm::new());
    llm.queue_observation(vec![]);

    let session = session_with(driver.clone(), llm.clone(), Config::default());
    let targets = session
        .observe(ObserveOptions {
            instruction: Some("find anything".to_string()),
            use_vision: true,
            ..ObserveOptions::default()
        })
        .await
        .expect("observe should succeed");

    assert!(targets.is_empty());
    assert_eq!(driver.log.lock().screenshots, 0);
}
