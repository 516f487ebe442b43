use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Test identity block of a scenario document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whole-run budget in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
}

/// One declared action. `tool` names a registry tool; `expect` and
/// `analyze` are natural-language checks the executing agent applies to
/// the output; `save_as` stores the output for later `${stored.*}`
/// references. Steps may nest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyze: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default)]
    pub retry: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    /// Per-step budget in seconds, applied by the executing agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
}

/// Natural-language verdict criteria the agent judges the run against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictSpec {
    pub pass_if: String,
    #[serde(default)]
    pub fail_if: String,
}

/// One parsed scenario document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    pub test: TestMeta,
    #[serde(default)]
    pub setup: Vec<Step>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub teardown: Vec<Step>,
    pub verdict: VerdictSpec,
}

impl TestSpec {
    /// Structural checks the engine itself depends on. Anything softer
    /// (style hints, schema suggestions) belongs to outer tooling.
    pub fn validate(&self) -> Result<()> {
        if self.test.name.trim().is_empty() {
            bail!("test name is empty");
        }
        if self.test.timeout == 0 {
            bail!("test '{}' has a zero timeout", self.test.name);
        }
        if self.steps.is_empty() {
            bail!("test '{}' has no steps", self.test.name);
        }
        if self.verdict.pass_if.trim().is_empty() {
            bail!("test '{}' has an empty pass_if", self.test.name);
        }
        Ok(())
    }
}

/// A scenario document plus its original text, which is shown to the
/// executing agent verbatim.
#[derive(Debug, Clone)]
pub struct LoadedSpec {
    pub spec: TestSpec,
    pub raw_yaml: String,
}

pub fn load_spec_file(path: &Path) -> Result<LoadedSpec> {
    let raw_yaml = fs::read_to_string(path)
        .with_context(|| format!("read test spec {}", path.display()))?;
    let spec: TestSpec = serde_yaml::from_str(&raw_yaml)
        .with_context(|| format!("parse test spec {}", path.display()))?;
    spec.validate()?;
    Ok(LoadedSpec { spec, raw_yaml })
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_repeat() -> u32 {
    1
}

fn default_retry_delay() -> f64 {
    1.0
}
