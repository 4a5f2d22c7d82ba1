//! Extraction against the kinds of output completion models actually emit.

use brief_extract::{extract, extract_as, ClaimSet, Critique, ExpectedShape, ResearchPlan, Strategy};
use proptest::prelude::*;

/// Tenet: a truncated claim list still yields a valid (possibly partial) list with ok=false
#[test]
fn truncated_claim_list_degrades_gracefully() {
    for raw in [
        r#"{"claims": [{"text": "X""#,
        r#"{"claims": [{"text": "X", "sources": ["S1", "S2"#,
        r#"{"claims": [{"text": "X"}, {"te"#,
        r#"{"claims": ["#,
        r#"{"claims"#,
    ] {
        let out = extract_as::<ClaimSet>(raw);
        assert!(!out.ok(), "{raw}");
        assert!(out.value.claims.len() <= 1, "{raw}");
    }
}

#[test]
fn claims_wrapped_in_markdown_and_prose() {
    let raw = "Based on the sources, here are the claims.\n\n```json\n{\n  \"claims\": [\n    {\"text\": \"Solid-state cells reached 400 Wh/kg in lab tests\", \"type\": \"statistical\", \"confidence\": 0.8, \"sources\": [\"S1\"]}\n  ]\n}\n```\n\nLet me know if you need more.";
    let out = extract_as::<ClaimSet>(raw);
    assert_eq!(out.strategy, Strategy::Unwrapped);
    assert_eq!(out.value.claims[0].sources, vec!["S1".to_string()]);
}

#[test]
fn raw_newlines_inside_strings_are_repaired() {
    let raw = "{\"body\": \"First paragraph.\n\nSecond paragraph [1].\", \"title\": \"Brief\"}";
    let out = extract(raw, ExpectedShape::Draft);
    assert!(out.ok());
}

#[test]
fn critique_in_prose_is_recovered_heuristically() {
    let raw = "My verdict: \"is_publishable\": false because \"revisions_needed\": [\"add a counterpoint\", \"cite the 2023 study\"";
    let out = extract_as::<Critique>(raw);
    assert_eq!(out.strategy, Strategy::Heuristic);
    assert!(!out.ok());
    assert!(!out.value.is_publishable);
    assert_eq!(out.value.revisions_needed.len(), 2);
}

#[test]
fn plan_from_bullet_list() {
    let raw = "I'd search for:\n- solid state battery energy density 2024\n- solid state battery manufacturing cost\n";
    let out = extract_as::<ResearchPlan>(raw);
    assert_eq!(out.strategy, Strategy::Heuristic);
    assert_eq!(out.value.queries.len(), 2);
}

#[test]
fn deeply_nested_input_does_not_overflow() {
    let raw = "[".repeat(10_000);
    let out = extract_as::<ClaimSet>(&raw);
    assert!(!out.ok());
    let raw = format!("{}{}", "{\"a\":".repeat(5_000), "1");
    let _ = extract(&raw, ExpectedShape::Plan);
}

#[test]
fn binary_garbage_falls_back() {
    let bytes: Vec<u8> = (0u16..2048).map(|i| (i.wrapping_mul(7919) % 251) as u8).collect();
    let raw = String::from_utf8_lossy(&bytes);
    for shape in [
        ExpectedShape::Plan,
        ExpectedShape::Claims,
        ExpectedShape::Critique,
        ExpectedShape::Draft,
    ] {
        let out = extract(&raw, shape);
        assert!(!out.ok());
        assert_eq!(out.record.shape(), shape);
    }
}

const VALID_CLAIMS: &str = r#"{"claims": [{"text": "Lithium prices fell in 2023", "kind": "fact", "confidence": 0.9, "sources": ["S1", "https://example.com/a"]}, {"text": "Demand will double", "kind": "estimate", "confidence": 0.4, "sources": []}]}"#;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn never_panics_on_arbitrary_text(raw in ".{0,2000}") {
        for shape in [ExpectedShape::Plan, ExpectedShape::Claims, ExpectedShape::Critique, ExpectedShape::Draft] {
            let out = extract(&raw, shape);
            prop_assert_eq!(out.record.shape(), shape);
        }
    }

    #[test]
    fn never_panics_on_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let raw = String::from_utf8_lossy(&bytes);
        let _ = extract(&raw, ExpectedShape::Claims);
    }

    #[test]
    fn truncated_prefix_of_valid_claims_never_panics(cut in 0usize..VALID_CLAIMS.len()) {
        let raw = &VALID_CLAIMS[..cut];
        let out = extract_as::<ClaimSet>(raw);
        prop_assert!(out.value.claims.len() <= 2);
        if out.ok() {
            // Only possible once the whole claims array survived the cut.
            prop_assert_eq!(out.value.claims.len(), 2);
        }
    }

    #[test]
    fn valid_claims_with_noise_stay_ok(prefix in "[a-zA-Z ,.:]{0,80}", suffix in "[a-zA-Z ,.!]{0,80}") {
        let raw = format!("{prefix}\n{VALID_CLAIMS}\n{suffix}");
        let out = extract_as::<ClaimSet>(&raw);
        prop_assert!(out.ok());
        prop_assert_eq!(out.value.claims.len(), 2);
    }
}
