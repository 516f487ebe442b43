use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use uuid::Uuid;

/// Server key the agent sees in its MCP config; also the namespace in
/// the `mcp__<key>__*` tool allowlist.
pub const MCP_SERVER_KEY: &str = "agentcheck";

const ROOT_MARKERS: [&str; 3] = ["Cargo.toml", "pyproject.toml", ".git"];

/// Walks upward from `start` until a project marker is found. Falls back
/// to the file's own directory when nothing matches.
pub fn find_project_root(start: &Path) -> PathBuf {
    let start = start
        .canonicalize()
        .unwrap_or_else(|_| start.to_path_buf());
    let fallback = if start.is_dir() {
        start.clone()
    } else {
        start
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    };
    let mut current = fallback.clone();
    loop {
        if ROOT_MARKERS.iter().any(|m| current.join(m).exists()) {
            return current;
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return fallback,
        }
    }
}

/// Filesystem state owned by exactly one run: the resolved project root
/// and a uniquely named agent-config artifact telling the agent CLI how
/// to reach this run's tool registry. Concurrent runs never share an
/// artifact path.
#[derive(Debug)]
pub struct RunContext {
    pub project_root: PathBuf,
    pub config_path: PathBuf,
}

impl RunContext {
    pub fn create(test_path: &Path) -> Result<RunContext> {
        RunContext::create_with_root(find_project_root(test_path))
    }

    pub fn create_with_root(project_root: PathBuf) -> Result<RunContext> {
        let serve_program = std::env::current_exe().context("resolve current executable")?;
        let config_path =
            std::env::temp_dir().join(format!("agentcheck-mcp-{}.json", Uuid::new_v4()));
        let root = project_root.to_string_lossy().to_string();
        let config = json!({
            "mcpServers": {
                MCP_SERVER_KEY: {
                    "command": serve_program.to_string_lossy(),
                    "args": ["serve", "--project-root", root.as_str()],
                    "cwd": root.as_str(),
                }
            }
        });
        let body = serde_json::to_string_pretty(&config).context("encode agent config")?;
        std::fs::write(&config_path, body)
            .with_context(|| format!("write agent config {}", config_path.display()))?;
        Ok(RunContext {
            project_root,
            config_path,
        })
    }

    /// Removes the config artifact. Safe to call repeatedly, and after
    /// someone else already removed the file.
    pub fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.config_path);
    }
}
