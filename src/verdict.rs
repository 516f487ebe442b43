use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RAW_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictLabel {
    Pass,
    Fail,
    Unclear,
}

impl VerdictLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictLabel::Pass => "PASS",
            VerdictLabel::Fail => "FAIL",
            VerdictLabel::Unclear => "UNCLEAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pass,
    Fail,
    Skip,
}

/// Agent-authored record of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    #[serde(default)]
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<Value>,
}

/// The single structured outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub verdict: VerdictLabel,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl Verdict {
    pub fn fail(reason: impl Into<String>, issues: Vec<String>) -> Verdict {
        Verdict {
            verdict: VerdictLabel::Fail,
            reason: reason.into(),
            steps: Vec::new(),
            issues,
        }
    }

    pub fn unclear(reason: impl Into<String>, issues: Vec<String>) -> Verdict {
        Verdict {
            verdict: VerdictLabel::Unclear,
            reason: reason.into(),
            steps: Vec::new(),
            issues,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == VerdictLabel::Pass
    }
}

/// Recovers a `Verdict` from whatever the agent's final payload looks
/// like. Strategies, in order: the payload is verdict JSON; the payload
/// is a wrapper object with the verdict under `result`; the payload is
/// prose or fenced markdown with a verdict object embedded somewhere.
/// When everything misses the run is UNCLEAR, carrying a bounded preview
/// of the raw payload. Never errors.
pub fn extract_verdict(raw: &str) -> Verdict {
    if let Some(v) = try_direct(raw) {
        return v;
    }
    if let Some(v) = try_result_wrapper(raw) {
        return v;
    }
    if let Some(v) = try_embedded(raw) {
        return v;
    }
    Verdict::unclear(
        "could not locate a verdict in the agent output",
        vec![format!("Raw output: {}...", preview(raw))],
    )
}

fn try_direct(raw: &str) -> Option<Verdict> {
    serde_json::from_str::<Verdict>(raw.trim()).ok()
}

fn try_result_wrapper(raw: &str) -> Option<Verdict> {
    let data: Value = serde_json::from_str(raw.trim()).ok()?;
    match data.get("result")? {
        Value::String(inner) => try_direct(inner).or_else(|| try_embedded(inner)),
        other => serde_json::from_value::<Verdict>(other.clone()).ok(),
    }
}

fn try_embedded(raw: &str) -> Option<Verdict> {
    let found = embedded_pattern().find(raw)?;
    serde_json::from_str::<Verdict>(found.as_str()).ok()
}

fn embedded_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\{[\s\S]*"verdict"[\s\S]*\}"#).expect("verdict regex"))
}

fn preview(raw: &str) -> String {
    raw.chars().take(RAW_PREVIEW_CHARS).collect()
}
