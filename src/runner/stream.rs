use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::events::EventSink;
use crate::protocol::{decode_line, StreamEvent};
use crate::runner::context::MCP_SERVER_KEY;

pub const DEFAULT_AGENT_PROGRAM: &str = "claude";

const STDERR_CAP_CHARS: usize = 4096;

/// How to start the agent CLI for one run.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: String,
    pub mcp_config: PathBuf,
    pub cwd: PathBuf,
}

impl AgentCommand {
    fn build(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-p")
            .arg(prompt)
            .arg("--mcp-config")
            .arg(&self.mcp_config)
            .arg("--allowedTools")
            .arg(format!("mcp__{}__*", MCP_SERVER_KEY))
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .current_dir(&self.cwd)
            // The agent CLI blocks forever reading stdin if it is left
            // attached.
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Total account of one agent subprocess run. Every way the subprocess
/// can end maps onto exactly one variant; nothing escapes as an error.
#[derive(Debug)]
pub enum StreamOutcome {
    Completed {
        final_payload: Option<String>,
        assistant_text: String,
        duration_ms: Option<u64>,
    },
    TimedOut {
        seconds: u64,
    },
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
    SpawnFailed {
        not_found: bool,
        detail: String,
    },
}

/// Spawns the agent and streams its stdout until EOF or timeout. Each
/// line is decoded and forwarded to `sink`; assistant text accumulates
/// and the final payload is captured verbatim. The timeout covers the
/// whole spawn-stream-wait sequence and kills the child on expiry.
pub async fn run_agent(
    command: &AgentCommand,
    prompt: &str,
    timeout: Duration,
    sink: &mut dyn EventSink,
) -> StreamOutcome {
    let mut child = match command.build(prompt).spawn() {
        Ok(child) => child,
        Err(e) => {
            return StreamOutcome::SpawnFailed {
                not_found: e.kind() == std::io::ErrorKind::NotFound,
                detail: e.to_string(),
            }
        }
    };
    let seconds = timeout.as_secs();
    match tokio::time::timeout(timeout, drive(&mut child, sink)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            StreamOutcome::TimedOut { seconds }
        }
    }
}

async fn drive(child: &mut Child, sink: &mut dyn EventSink) -> StreamOutcome {
    let stderr_task = tokio::spawn(read_stderr_capped(child.stderr.take()));

    let mut final_payload = None;
    let mut assistant_text = String::new();
    let mut duration_ms = None;
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            for event in decode_line(&line) {
                match &event {
                    StreamEvent::AssistantText { text } => {
                        if !assistant_text.is_empty() {
                            assistant_text.push('\n');
                        }
                        assistant_text.push_str(text);
                    }
                    StreamEvent::Final {
                        result,
                        duration_ms: elapsed,
                    } => {
                        final_payload = result.clone();
                        duration_ms = *elapsed;
                    }
                    _ => {}
                }
                sink.emit(&event);
            }
        }
    }

    let status = child.wait().await;
    let stderr = stderr_task.await.unwrap_or_default();
    match status {
        Ok(status) if status.success() => StreamOutcome::Completed {
            final_payload,
            assistant_text,
            duration_ms,
        },
        Ok(status) => StreamOutcome::Failed {
            exit_code: status.code(),
            stderr,
        },
        Err(e) => StreamOutcome::Failed {
            exit_code: None,
            stderr: format!("wait on agent process failed: {}", e),
        },
    }
}

async fn read_stderr_capped(stderr: Option<ChildStderr>) -> String {
    let Some(stderr) = stderr else {
        return String::new();
    };
    let mut raw = Vec::new();
    let _ = stderr
        .take((STDERR_CAP_CHARS * 4) as u64)
        .read_to_end(&mut raw)
        .await;
    String::from_utf8_lossy(&raw)
        .chars()
        .take(STDERR_CAP_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_matches_the_agent_cli_contract() {
        let command = AgentCommand {
            program: "claude".to_string(),
            mcp_config: PathBuf::from("/tmp/agentcheck-mcp-x.json"),
            cwd: PathBuf::from("/tmp"),
        };
        let built = command.build("do the test");
        let std_cmd = built.as_std();
        assert_eq!(std_cmd.get_program(), "claude");
        let args: Vec<String> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "do the test");
        let joined = args.join(" ");
        assert!(joined.contains("--mcp-config /tmp/agentcheck-mcp-x.json"));
        assert!(joined.contains("--allowedTools mcp__agentcheck__*"));
        assert!(joined.contains("--output-format stream-json"));
        assert!(joined.contains("--verbose"));
    }
}
