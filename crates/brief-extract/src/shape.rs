//! Expected shapes
//!
//! Each shape is a typed record with a lenient mapping from a parsed JSON
//! value and a field-by-field heuristic for text that never parses.
//! Mappings accept the field-name variants completion models commonly
//! produce (`text`/`claim`/`statement`, nested `research_plan`, ...).

use crate::heuristic;
use brief_core::ClaimKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of shapes the pipeline asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedShape {
    /// Research plan: sub-questions and search queries
    Plan,
    /// List of claims with sources
    Claims,
    /// Critique verdict
    Critique,
    /// Report narrative
    Draft,
}

/// Extracted value, tagged by shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Record {
    Plan(ResearchPlan),
    Claims(ClaimSet),
    Critique(Critique),
    Draft(DraftBody),
}

impl Record {
    /// Shape this record belongs to
    #[must_use]
    pub fn shape(&self) -> ExpectedShape {
        match self {
            Record::Plan(_) => ExpectedShape::Plan,
            Record::Claims(_) => ExpectedShape::Claims,
            Record::Critique(_) => ExpectedShape::Critique,
            Record::Draft(_) => ExpectedShape::Draft,
        }
    }
}

/// A typed record the extractor can produce
pub trait Shape: Sized + Default {
    /// Tag for this shape
    const KIND: ExpectedShape;

    /// Map a parsed value; `None` when the value does not have this shape
    fn from_value(value: &Value) -> Option<Self>;

    /// Recover fields from raw text; `None` when nothing was found
    fn from_fields(text: &str) -> Option<Self>;

    /// Wrap into the tagged union
    fn into_record(self) -> Record;
}

/// Research plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchPlan {
    /// Questions the brief should answer
    pub sub_questions: Vec<String>,
    /// Search queries to run
    pub queries: Vec<String>,
}

impl Shape for ResearchPlan {
    const KIND: ExpectedShape = ExpectedShape::Plan;

    fn from_value(value: &Value) -> Option<Self> {
        if let Value::Array(items) = value {
            let queries: Vec<String> = items.iter().filter_map(non_empty_str).collect();
            return (!queries.is_empty() || items.is_empty()).then(|| Self {
                sub_questions: Vec::new(),
                queries,
            });
        }
        let root = get_path(value, "research_plan").unwrap_or(value);
        let root = root.as_object()?;

        let mut plan = Self::default();
        let mut matched = false;
        for key in ["queries", "search_queries"] {
            if let Some(Value::Array(items)) = root.get(key) {
                matched = true;
                plan.queries.extend(items.iter().filter_map(non_empty_str));
            }
        }
        if let Some(Value::Array(items)) = root.get("sub_questions") {
            matched = true;
            for item in items {
                match item {
                    Value::String(_) => plan.sub_questions.extend(non_empty_str(item)),
                    Value::Object(obj) => {
                        if let Some(q) = obj.get("question").and_then(non_empty_str) {
                            plan.sub_questions.push(q);
                        }
                        for key in ["search_queries", "queries"] {
                            if let Some(Value::Array(qs)) = obj.get(key) {
                                plan.queries.extend(qs.iter().filter_map(non_empty_str));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        matched.then_some(plan)
    }

    fn from_fields(text: &str) -> Option<Self> {
        let mut queries = heuristic::string_array_field(text, &["queries", "search_queries"]);
        let sub_questions = heuristic::string_array_field(text, &["sub_questions"]);
        if queries.is_empty() && sub_questions.is_empty() {
            queries = heuristic::list_lines(text);
        }
        (!queries.is_empty() || !sub_questions.is_empty()).then_some(Self {
            sub_questions,
            queries,
        })
    }

    fn into_record(self) -> Record {
        Record::Plan(self)
    }
}

/// Claim as proposed by the completion capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimDraft {
    /// Claim text
    pub text: String,
    /// Framing
    pub kind: ClaimKind,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Source labels (`S3`) or URLs, as given
    pub sources: Vec<String>,
}

impl ClaimDraft {
    fn from_item(item: &Value) -> Option<Self> {
        match item {
            Value::String(_) => non_empty_str(item).map(|text| Self {
                text,
                kind: ClaimKind::Fact,
                confidence: DEFAULT_CONFIDENCE,
                sources: Vec::new(),
            }),
            Value::Object(obj) => {
                let text = ["text", "claim", "statement"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(non_empty_str))?;
                let kind = ["kind", "type", "claim_type"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))
                    .map_or(ClaimKind::Fact, ClaimKind::from_label);
                let confidence = obj
                    .get("confidence")
                    .and_then(confidence_of)
                    .unwrap_or(DEFAULT_CONFIDENCE);
                let mut sources = Vec::new();
                for key in ["sources", "supporting_sources", "urls", "citations", "source"] {
                    if let Some(v) = obj.get(key) {
                        collect_sources(v, &mut sources);
                    }
                }
                Some(Self {
                    text,
                    kind,
                    confidence,
                    sources,
                })
            }
            _ => None,
        }
    }
}

/// Claims extracted from one response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Claims in response order
    pub claims: Vec<ClaimDraft>,
}

impl Shape for ClaimSet {
    const KIND: ExpectedShape = ExpectedShape::Claims;

    fn from_value(value: &Value) -> Option<Self> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(_) => ["claims", "key_claims", "analysis.claims"]
                .iter()
                .find_map(|p| get_path(value, p).and_then(Value::as_array))?,
            _ => return None,
        };
        Some(Self {
            claims: items.iter().filter_map(ClaimDraft::from_item).collect(),
        })
    }

    fn from_fields(text: &str) -> Option<Self> {
        let claims = heuristic::claim_fields(text);
        (!claims.is_empty()).then_some(Self { claims })
    }

    fn into_record(self) -> Record {
        Record::Claims(self)
    }
}

/// Critique verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    /// Whether the report can ship as is
    pub is_publishable: bool,
    /// Concrete revision instructions
    pub revisions_needed: Vec<String>,
    /// Overall score on a 0-10 scale, when given
    pub score: Option<f32>,
}

impl Default for Critique {
    fn default() -> Self {
        Self {
            is_publishable: true,
            revisions_needed: Vec::new(),
            score: None,
        }
    }
}

/// Scores below this suggest a revision when no explicit verdict is given
pub const PUBLISHABLE_SCORE: f32 = 7.5;

impl Shape for Critique {
    const KIND: ExpectedShape = ExpectedShape::Critique;

    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let score = ["overall_score", "score"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_f64))
            .map(|s| s as f32);

        let mut revisions = Vec::new();
        for path in [
            "revisions_needed",
            "revision_recommendations.focus_areas",
            "priority_improvements",
        ] {
            if let Some(Value::Array(items)) = get_path(value, path) {
                for item in items {
                    let text = non_empty_str(item).or_else(|| {
                        ["description", "issue", "recommendation"]
                            .iter()
                            .find_map(|k| item.get(*k).and_then(non_empty_str))
                    });
                    if let Some(text) = text {
                        if !revisions.contains(&text) {
                            revisions.push(text);
                        }
                    }
                }
            }
        }

        let is_publishable = obj
            .get("is_publishable")
            .and_then(Value::as_bool)
            .or_else(|| {
                get_path(value, "revision_recommendations.should_revise")
                    .and_then(Value::as_bool)
                    .map(|revise| !revise)
            })
            .or_else(|| score.map(|s| s >= PUBLISHABLE_SCORE))?;

        Some(Self {
            is_publishable,
            revisions_needed: revisions,
            score,
        })
    }

    fn from_fields(text: &str) -> Option<Self> {
        let publishable = heuristic::bool_field(text, "is_publishable")
            .or_else(|| heuristic::bool_field(text, "should_revise").map(|r| !r))?;
        Some(Self {
            is_publishable: publishable,
            revisions_needed: heuristic::string_array_field(
                text,
                &["revisions_needed", "focus_areas"],
            ),
            score: None,
        })
    }

    fn into_record(self) -> Record {
        Record::Critique(self)
    }
}

/// Report narrative
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftBody {
    /// Optional headline
    pub title: Option<String>,
    /// Narrative markdown
    pub body: String,
}

impl Shape for DraftBody {
    const KIND: ExpectedShape = ExpectedShape::Draft;

    fn from_value(value: &Value) -> Option<Self> {
        if let Value::String(_) = value {
            return non_empty_str(value).map(|body| Self { title: None, body });
        }
        let obj = value.as_object()?;
        let body = ["body", "content", "report", "markdown", "narrative"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(non_empty_str))?;
        let title = obj.get("title").and_then(non_empty_str);
        Some(Self { title, body })
    }

    fn from_fields(text: &str) -> Option<Self> {
        if let Some(body) = heuristic::string_field(text, &["body", "content", "report"]) {
            return Some(Self {
                title: heuristic::string_field(text, &["title"]),
                body,
            });
        }
        let prose = text.trim();
        (!prose.is_empty() && !prose.starts_with(['{', '['])).then(|| Self {
            title: None,
            body: prose.to_string(),
        })
    }

    fn into_record(self) -> Record {
        Record::Draft(self)
    }
}

const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Value at a dot-separated object path
fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn non_empty_str(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn confidence_of(value: &Value) -> Option<f32> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "high" => 0.85,
            "medium" | "moderate" => 0.6,
            "low" => 0.35,
            other => other.trim_end_matches('%').parse::<f64>().ok()?,
        },
        _ => return None,
    };
    let raw = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };
    #[allow(clippy::cast_possible_truncation)]
    let c = raw.clamp(0.0, 1.0) as f32;
    c.is_finite().then_some(c)
}

fn collect_sources(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(_) => {
            if let Some(s) = non_empty_str(value) {
                if !out.contains(&s) {
                    out.push(s);
                }
            }
        }
        Value::Number(n) => {
            let s = format!("S{n}");
            if !out.contains(&s) {
                out.push(s);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_sources(item, out);
            }
        }
        Value::Object(obj) => {
            if let Some(url) = ["url", "source", "id"].iter().find_map(|k| obj.get(*k)) {
                collect_sources(url, out);
            }
        }
        _ => {}
    }
}
