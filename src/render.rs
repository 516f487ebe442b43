use std::collections::VecDeque;

use serde_json::Value;

use crate::events::EventSink;
use crate::protocol::StreamEvent;
use crate::verdict::{StepStatus, Verdict, VerdictLabel};

const ARGS_CAP_CHARS: usize = 80;
const RESULT_CAP_CHARS: usize = 100;

struct PendingCall {
    name: String,
    args: String,
}

/// Line-oriented live view of the agent stream. Tool calls are buffered
/// and paired FIFO with their results, so one combined line per call
/// lands in the transcript; a result with no pending call still renders
/// instead of desynchronizing the stream.
pub struct TranscriptFormatter {
    pending: VecDeque<PendingCall>,
}

impl Default for TranscriptFormatter {
    fn default() -> Self {
        TranscriptFormatter::new()
    }
}

impl TranscriptFormatter {
    pub fn new() -> TranscriptFormatter {
        TranscriptFormatter {
            pending: VecDeque::new(),
        }
    }

    fn render(&mut self, event: &StreamEvent) -> Option<String> {
        match event {
            StreamEvent::SessionStart => Some("· session started".to_string()),
            StreamEvent::AssistantText { text } => text_preview(text).map(|p| format!("· {}", p)),
            StreamEvent::ToolCall { name, input } => {
                self.pending.push_back(PendingCall {
                    name: name.clone(),
                    args: compact(input, ARGS_CAP_CHARS),
                });
                None
            }
            StreamEvent::ToolResult { is_error, content } => {
                let mark = if *is_error { "✗" } else { "✓" };
                let rendered = compact(content, RESULT_CAP_CHARS);
                Some(match self.pending.pop_front() {
                    Some(call) => {
                        format!("  {} {}({}) -> {}", mark, call.name, call.args, rendered)
                    }
                    None => format!("  {} [unmatched result] {}", mark, rendered),
                })
            }
            StreamEvent::Final { duration_ms, .. } => duration_ms
                .map(|ms| format!("· completed in {:.1}s", ms as f64 / 1000.0)),
            StreamEvent::Unknown { raw } => {
                Some(format!("· [unrecognized] {}", truncate(raw, RESULT_CAP_CHARS)))
            }
        }
    }
}

impl EventSink for TranscriptFormatter {
    fn emit(&mut self, event: &StreamEvent) {
        if let Some(line) = self.render(event) {
            println!("{}", line);
        }
    }
}

pub fn verdict_banner(verdict: &Verdict) -> String {
    let rule = "=".repeat(60);
    let emoji = match verdict.verdict {
        VerdictLabel::Pass => "✅",
        VerdictLabel::Fail => "❌",
        VerdictLabel::Unclear => "❓",
    };
    let mut out = String::new();
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("{} VERDICT: {}\n", emoji, verdict.verdict.as_str()));
    if !verdict.reason.is_empty() {
        out.push_str(&format!("Reason: {}\n", verdict.reason));
    }
    for step in &verdict.steps {
        let mark = match step.status {
            StepStatus::Pass => "✓",
            StepStatus::Fail => "✗",
            StepStatus::Skip => "○",
        };
        if step.details.is_empty() {
            out.push_str(&format!("  {} {}\n", mark, step.name));
        } else {
            out.push_str(&format!("  {} {} - {}\n", mark, step.name, step.details));
        }
    }
    if !verdict.issues.is_empty() {
        out.push_str("Issues:\n");
        for issue in &verdict.issues {
            out.push_str(&format!("  - {}\n", issue));
        }
    }
    out.push_str(&rule);
    out
}

pub fn print_verdict(verdict: &Verdict) {
    println!("{}", verdict_banner(verdict));
}

fn text_preview(text: &str) -> Option<String> {
    let trimmed = text.trim();
    // The final JSON block already surfaces through the verdict banner.
    if trimmed.is_empty() || trimmed.starts_with("```") || trimmed.starts_with('{') {
        return None;
    }
    let first = trimmed.lines().next().unwrap_or_default();
    Some(truncate(first, ARGS_CAP_CHARS))
}

fn compact(value: &Value, cap: usize) -> String {
    let s = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    truncate(&s.replace('\n', " "), cap)
}

fn truncate(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        return s.to_string();
    }
    let cut: String = s.chars().take(cap).collect();
    format!("{}...", cut)
}
