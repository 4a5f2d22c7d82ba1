//! Claim synthesis over whole documents

use brief_core::{Document, FetchStatus, RetryPolicy};
use brief_pipeline::synthesis::{document_chunks, synthesize, BATCH_SIZE};
use brief_pipeline::{CompletionGateway, PromptKind};
use brief_test_utils::ScriptedCompletion;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const LONG: &str = "https://alpha.example/long";

fn document(url: &str, text: String) -> Document {
    Document {
        url: url.into(),
        title: "Pilot line survey".into(),
        text,
        domain: "alpha.example".into(),
        fetch_status: FetchStatus::default(),
    }
}

/// Roughly 7 200 characters of filler followed by one late sentence
fn long_text() -> String {
    let mut text = "Pilot lines report steady progress on cell yield this quarter. ".repeat(114);
    text.push_str("KEYFACT sulfide cells passed abuse testing.");
    text
}

fn gateway(completion: Arc<ScriptedCompletion>) -> CompletionGateway {
    CompletionGateway::new(completion, RetryPolicy::none(), Duration::from_secs(5))
}

#[tokio::test]
async fn text_past_the_first_chunk_reaches_the_model() {
    let doc = document(LONG, long_text());
    let last = document_chunks(&doc).len();
    assert!(last > 2);

    let reply = format!(r#"{{"claims":[{{"text":"Sulfide cells passed abuse testing","sources":["S{last}"]}}]}}"#);
    let completion = Arc::new(ScriptedCompletion::new().respond(PromptKind::Claims, reply));

    let synthesis = synthesize(&gateway(Arc::clone(&completion)), "solid-state batteries", &[doc])
        .await
        .unwrap();

    let prompts = completion.calls();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].prompt.contains("KEYFACT sulfide cells passed abuse testing."));
    assert_eq!(synthesis.drafts.len(), 1);
    assert_eq!(synthesis.drafts[0].urls, vec![LONG.to_string()]);
}

#[tokio::test]
async fn chunks_are_batched_six_at_a_time() {
    let mut docs = vec![document(LONG, long_text())];
    for i in 0..4 {
        docs.push(document(
            &format!("https://beta.example/{i}"),
            "Short note on cathode coatings and their cost.".into(),
        ));
    }
    let total: usize = docs.iter().map(|d| document_chunks(d).len()).sum();
    let completion = Arc::new(ScriptedCompletion::new().respond(PromptKind::Claims, r#"{"claims":[]}"#));

    synthesize(&gateway(Arc::clone(&completion)), "solid-state batteries", &docs)
        .await
        .unwrap();

    let prompts = completion.calls();
    assert_eq!(prompts.len(), total.div_ceil(BATCH_SIZE));
    for request in &prompts {
        let labels = (1..=BATCH_SIZE + 1)
            .filter(|i| request.prompt.contains(&format!("[S{i}]")))
            .count();
        assert!(labels <= BATCH_SIZE);
    }
    assert!(prompts.iter().any(|r| r.prompt.contains("KEYFACT")));
    assert!(prompts.iter().any(|r| r.prompt.contains("https://beta.example/3")));
}
