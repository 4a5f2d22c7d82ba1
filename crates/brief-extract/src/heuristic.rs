//! Field-by-field recovery for text that will not parse
//!
//! All patterns are compiled once and run on the `regex` crate's
//! linear-time engine, so even adversarial input finishes promptly.

use crate::shape::ClaimDraft;
use brief_core::ClaimKind;
use once_cell::sync::Lazy;
use regex::Regex;

static CLAIM_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:text|claim|statement)"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("valid claim text regex")
});
static CLAIM_KIND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:kind|type|claim_type)"\s*:\s*"([^"]*)""#).expect("valid claim kind regex")
});
static CONFIDENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""confidence"\s*:\s*"?([0-9]*\.?[0-9]+)"#).expect("valid confidence regex")
});
static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>\\\]\),]+"#).expect("valid url regex"));
static SOURCE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""S(\d{1,3})""#).expect("valid source label regex"));
static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("valid string literal regex"));
static LIST_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*\u{2022}]|\d{1,2}[.)])\s+(.{3,200}?)\s*$").expect("valid list regex")
});

/// Claims recovered from `"text": "..."` fields and what follows each
pub(crate) fn claim_fields(text: &str) -> Vec<ClaimDraft> {
    let matches: Vec<_> = CLAIM_TEXT.captures_iter(text).collect();
    let mut claims = Vec::with_capacity(matches.len());
    for (i, caps) in matches.iter().enumerate() {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let claim_text = unescape(body.as_str());
        if claim_text.trim().is_empty() {
            continue;
        }
        let segment_end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let segment = &text[whole.end()..segment_end];

        let kind = CLAIM_KIND
            .captures(segment)
            .and_then(|c| c.get(1))
            .map_or(ClaimKind::Fact, |m| ClaimKind::from_label(m.as_str()));
        let confidence = CONFIDENCE
            .captures(segment)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f32>().ok())
            .map_or(0.5, |c| if c > 1.0 { c / 100.0 } else { c })
            .clamp(0.0, 1.0);

        let mut sources: Vec<String> = Vec::new();
        for m in URL.find_iter(segment) {
            let url = m.as_str().to_string();
            if !sources.contains(&url) {
                sources.push(url);
            }
        }
        for c in SOURCE_LABEL.captures_iter(segment) {
            if let Some(n) = c.get(1) {
                let label = format!("S{}", n.as_str());
                if !sources.contains(&label) {
                    sources.push(label);
                }
            }
        }

        claims.push(ClaimDraft {
            text: claim_text.trim().to_string(),
            kind,
            confidence,
            sources,
        });
    }
    claims
}

/// String elements of the first `"<name>": [ ... ]` array among `names`
///
/// Tolerates a missing closing bracket.
pub(crate) fn string_array_field(text: &str, names: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for name in names {
        let needle = format!("\"{name}\"");
        let Some(pos) = text.find(&needle) else {
            continue;
        };
        let rest = &text[pos + needle.len()..];
        let Some(open) = rest.find('[') else {
            continue;
        };
        if !rest[..open].trim().trim_start_matches(':').trim().is_empty() {
            continue;
        }
        let inner = &rest[open + 1..];
        let inner = inner.find(']').map_or(inner, |close| &inner[..close]);
        for caps in STRING_LITERAL.captures_iter(inner) {
            if let Some(m) = caps.get(1) {
                let value = unescape(m.as_str()).trim().to_string();
                if !value.is_empty() && !out.contains(&value) {
                    out.push(value);
                }
            }
        }
    }
    out
}

/// Value of the first `"<name>": "..."` string field among `names`
pub(crate) fn string_field(text: &str, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        let pattern = format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)"?"#, regex::escape(name));
        let re = Regex::new(&pattern).ok()?;
        let caps = re.captures(text)?;
        let value = unescape(caps.get(1)?.as_str());
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Value of a `"<name>": true|false` field
pub(crate) fn bool_field(text: &str, name: &str) -> Option<bool> {
    let pattern = format!(r#""{}"\s*:\s*"?(true|false|True|False)"#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(text)?;
    Some(caps.get(1)?.as_str().eq_ignore_ascii_case("true"))
}

/// Bulleted or numbered lines of prose
pub(crate) fn list_lines(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in LIST_LINE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            let line = m
                .as_str()
                .trim_matches(|c: char| c == '"' || c == '`' || c == '*')
                .trim()
                .to_string();
            if !line.is_empty() && !out.contains(&line) {
                out.push(line);
            }
        }
    }
    out
}

/// Decode JSON string escapes, keeping the raw text if they are malformed
fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}
