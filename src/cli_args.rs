use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::runner::stream::DEFAULT_AGENT_PROGRAM;

#[derive(Debug, Parser)]
#[command(
    name = "agentcheck",
    about = "Declarative agent-driven test execution engine",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute one test scenario and print its verdict.
    Run(RunArgs),

    /// Serve the tool registry over stdio. The agent CLI spawns this
    /// from the run's config artifact; it is rarely run by hand.
    Serve(ServeArgs),

    /// Show the tool catalog a scenario in this project would see.
    Tools(ToolsArgs),

    /// Print version information.
    Version(VersionArgs),
}

#[derive(Debug, Clone, Parser)]
pub struct RunArgs {
    /// Path to the scenario YAML document.
    pub spec: PathBuf,

    /// Agent CLI to drive.
    #[arg(long, default_value = DEFAULT_AGENT_PROGRAM)]
    pub agent_cmd: String,

    /// Override the scenario's own timeout, in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Append each decoded stream event to a JSONL file.
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Print the verdict as JSON instead of the banner.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Suppress the live transcript.
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct ServeArgs {
    /// Project root whose plugins the registry should discover.
    #[arg(long)]
    pub project_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
pub struct ToolsArgs {
    /// Project root; resolved upward from the current directory if unset.
    #[arg(long)]
    pub project_root: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct VersionArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::parse_from(["agentcheck", "run", "tests/agent/login.yaml"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.spec, PathBuf::from("tests/agent/login.yaml"));
        assert_eq!(args.agent_cmd, DEFAULT_AGENT_PROGRAM);
        assert_eq!(args.timeout, None);
        assert!(!args.json);
        assert!(!args.quiet);
    }

    #[test]
    fn run_accepts_overrides() {
        let cli = Cli::parse_from([
            "agentcheck",
            "run",
            "case.yaml",
            "--agent-cmd",
            "claude-next",
            "--timeout",
            "30",
            "--events",
            "out.jsonl",
            "--json",
            "--quiet",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.agent_cmd, "claude-next");
        assert_eq!(args.timeout, Some(30));
        assert_eq!(args.events, Some(PathBuf::from("out.jsonl")));
        assert!(args.json && args.quiet);
    }

    #[test]
    fn serve_takes_a_project_root() {
        let cli = Cli::parse_from(["agentcheck", "serve", "--project-root", "/srv/app"]);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.project_root, Some(PathBuf::from("/srv/app")));
    }
}
