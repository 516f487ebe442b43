use anyhow::Result;
use clap::Parser;
use serde_json::json;

use agentcheck::cli_args::{Cli, Commands, RunArgs, ServeArgs, ToolsArgs, VersionArgs};
use agentcheck::events::{EventSink, JsonlFileSink, MultiSink};
use agentcheck::registry::ToolRegistry;
use agentcheck::render::{print_verdict, TranscriptFormatter};
use agentcheck::runner::context::find_project_root;
use agentcheck::runner::prompt::render_catalog;
use agentcheck::runner::{run_test, RunOptions};
use agentcheck::server;
use agentcheck::spec::load_spec_file;

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let code = rt.block_on(dispatch())?;
    std::process::exit(code);
}

async fn dispatch() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Serve(args) => serve(args).await,
        Commands::Tools(args) => tools(args).await,
        Commands::Version(args) => version(args),
    }
}

async fn run(args: RunArgs) -> Result<i32> {
    let loaded = load_spec_file(&args.spec)?;
    let mut sinks: Vec<Box<dyn EventSink>> = Vec::new();
    if !args.quiet {
        sinks.push(Box::new(TranscriptFormatter::new()));
    }
    if let Some(path) = &args.events {
        sinks.push(Box::new(JsonlFileSink::new(path)));
    }
    let mut sink = MultiSink::new(sinks);

    let opts = RunOptions {
        agent_program: args.agent_cmd.clone(),
        timeout_override: args.timeout,
    };
    let verdict = run_test(&loaded, &args.spec, &opts, &mut sink).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print_verdict(&verdict);
    }
    Ok(if verdict.is_pass() { 0 } else { 1 })
}

async fn serve(args: ServeArgs) -> Result<i32> {
    let root = match args.project_root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    server::serve_stdio(&root).await?;
    Ok(0)
}

async fn tools(args: ToolsArgs) -> Result<i32> {
    let start = match args.project_root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let root = find_project_root(&start);
    let registry = ToolRegistry::for_project(&root);
    let reserved: Vec<&String> = registry.reserved_names().iter().collect();
    if args.json {
        let listing = json!({
            "units": registry.catalog(),
            "reserved_names": reserved,
        });
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        print!("{}", render_catalog(&registry.catalog()));
        let names: Vec<String> = reserved.iter().map(|n| n.to_string()).collect();
        println!("Reserved unit names: {}", names.join(", "));
    }
    registry.shutdown().await;
    Ok(0)
}

fn version(args: VersionArgs) -> Result<i32> {
    if args.json {
        let info = json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    }
    Ok(0)
}
