use std::fs;

use agentcheck::events::NullSink;
use agentcheck::runner::context::RunContext;
use agentcheck::runner::{run_test, RunOptions};
use agentcheck::spec::load_spec_file;
use agentcheck::verdict::VerdictLabel;
use tempfile::tempdir;

const SCENARIO: &str = r#"
test:
  name: health check
  timeout: 20
steps:
  - name: ping
    tool: http_get
    args:
      url: http://localhost:9/health
verdict:
  pass_if: the endpoint answered
"#;

/// Leftover config artifacts for one project root, identified by content.
fn leaked_artifacts(project_root: &str) -> Vec<std::path::PathBuf> {
    let mut leaked = Vec::new();
    let Ok(entries) = fs::read_dir(std::env::temp_dir()) else {
        return leaked;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
        if !name.starts_with("agentcheck-mcp-") || !name.ends_with(".json") {
            continue;
        }
        if let Ok(body) = fs::read_to_string(&path) {
            if body.contains(project_root) {
                leaked.push(path);
            }
        }
    }
    leaked
}

#[tokio::test]
async fn concurrent_runs_never_share_an_artifact_path() {
    let root = tempdir().unwrap();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let root = root.path().to_path_buf();
        handles.push(tokio::task::spawn_blocking(move || {
            RunContext::create_with_root(root).unwrap()
        }));
    }
    let mut contexts = Vec::new();
    for handle in handles {
        contexts.push(handle.await.unwrap());
    }

    let mut paths: Vec<_> = contexts.iter().map(|c| c.config_path.clone()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 8, "every run must get its own artifact");
    for context in &contexts {
        assert!(context.config_path.exists());
        context.cleanup();
    }
}

#[tokio::test]
async fn spawn_failure_yields_fail_verdict_and_tears_down_the_artifact() {
    let project = tempdir().unwrap();
    fs::write(project.path().join("Cargo.toml"), "[package]").unwrap();
    let spec_path = project.path().join("health.yaml");
    fs::write(&spec_path, SCENARIO).unwrap();
    let loaded = load_spec_file(&spec_path).unwrap();

    let opts = RunOptions {
        agent_program: "agentcheck-no-such-agent-cli".to_string(),
        timeout_override: None,
    };
    let verdict = run_test(&loaded, &spec_path, &opts, &mut NullSink).await;

    assert_eq!(verdict.verdict, VerdictLabel::Fail);
    assert!(
        verdict.reason.contains("'agentcheck-no-such-agent-cli' not found"),
        "{}",
        verdict.reason
    );
    assert!(!verdict.issues.is_empty());

    let root = project.path().canonicalize().unwrap();
    assert!(
        leaked_artifacts(&root.to_string_lossy()).is_empty(),
        "config artifact must be removed on the spawn-failure path"
    );
}

#[tokio::test]
async fn run_against_the_stub_agent_passes_end_to_end() {
    let Some(stub) = option_env!("CARGO_BIN_EXE_agent_stub") else {
        eprintln!("skipping: CARGO_BIN_EXE_agent_stub not set");
        return;
    };
    let project = tempdir().unwrap();
    fs::write(project.path().join("Cargo.toml"), "[package]").unwrap();
    let spec_path = project.path().join("health.yaml");
    fs::write(&spec_path, SCENARIO).unwrap();
    let loaded = load_spec_file(&spec_path).unwrap();

    // The stub defaults to a passing scenario when the prompt carries no
    // stub-mode token.
    let opts = RunOptions {
        agent_program: stub.to_string(),
        timeout_override: Some(15),
    };
    let verdict = run_test(&loaded, &spec_path, &opts, &mut NullSink).await;

    assert_eq!(verdict.verdict, VerdictLabel::Pass);
    assert_eq!(verdict.reason, "all steps passed");

    let root = project.path().canonicalize().unwrap();
    assert!(leaked_artifacts(&root.to_string_lossy()).is_empty());
}
