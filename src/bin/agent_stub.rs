use std::io::{self, Write};

use serde_json::{json, Value};

/// Stand-in for the agent CLI in integration tests. Replays a canned
/// stream-json scenario selected by a `stub-mode=<name>` token in the
/// prompt (or the AGENT_STUB_MODE env var), ignoring the MCP flags the
/// driver passes.
fn main() {
    let args: Vec<String> = std::env::args().collect();
    let prompt = args
        .iter()
        .position(|a| a == "-p")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_default();
    let mode = mode_from_prompt(&prompt)
        .or_else(|| std::env::var("AGENT_STUB_MODE").ok())
        .unwrap_or_else(|| "pass".to_string());

    match mode.as_str() {
        "pass" => {
            emit(init());
            emit(assistant(vec![
                json!({"type": "text", "text": "running step 1"}),
                json!({"type": "tool_use", "name": "store_value",
                       "input": {"name": "token", "value": "abc"}}),
            ]));
            emit(json!({"type": "tool_result", "is_error": false, "content": "stored"}));
            emit(final_record(
                &json!({
                    "verdict": "PASS",
                    "reason": "all steps passed",
                    "steps": [{"name": "step 1", "status": "pass", "details": "ok"}],
                    "issues": [],
                })
                .to_string(),
            ));
        }
        "garbage" => {
            emit(init());
            raw("plain diagnostic noise from a wrapped process");
            raw("{\"type\": \"assistant\", broken json");
            emit(assistant(vec![json!({"type": "text", "text": "still going"})]));
            emit(final_record(
                &json!({"verdict": "PASS", "reason": "survived the noise"}).to_string(),
            ));
        }
        "fenced" => {
            emit(init());
            emit(final_record(
                "Here is the verdict:\n```json\n{\"verdict\": \"FAIL\", \"reason\": \"assertion mismatch\"}\n```",
            ));
        }
        "no-final" => {
            emit(init());
            emit(assistant(vec![json!({
                "type": "text",
                "text": "{\"verdict\": \"UNCLEAR\", \"reason\": \"could not finish\"}",
            })]));
        }
        "exit2" => {
            emit(init());
            eprintln!("stub: simulated crash");
            std::process::exit(2);
        }
        "hang" => {
            emit(init());
            std::thread::sleep(std::time::Duration::from_secs(600));
        }
        other => {
            eprintln!("stub: unknown mode '{}'", other);
            std::process::exit(64);
        }
    }
}

fn mode_from_prompt(prompt: &str) -> Option<String> {
    prompt
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("stub-mode="))
        .map(str::to_string)
}

fn init() -> Value {
    json!({"type": "system", "subtype": "init", "session_id": "stub"})
}

fn assistant(segments: Vec<Value>) -> Value {
    json!({"type": "assistant", "message": {"content": segments}})
}

fn final_record(result: &str) -> Value {
    json!({"type": "result", "result": result, "duration_ms": 42})
}

fn emit(value: Value) {
    raw(&value.to_string());
}

fn raw(line: &str) {
    let mut stdout = io::stdout();
    let _ = writeln!(stdout, "{}", line);
    let _ = stdout.flush();
}
