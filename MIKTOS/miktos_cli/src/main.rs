use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use miktos_core::prelude::{
    BridgeAdapter, BridgeConfig, CommandPipeline, CommandResponse, LoopbackBridge, TcpBridge,
};
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "miktos", version, about = "Natural-language commands for a 3D host")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Host bridge address (`host:port`); an in-process scene when absent.
    #[arg(long, global = true)]
    host: Option<String>,
    /// JSON-lines log file.
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    /// JSON-lines event file.
    #[arg(long, global = true)]
    event_log: Option<PathBuf>,
    /// Confirm destructive commands.
    #[arg(long, global = true)]
    confirm: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Executes each argument as a command, in order, in one session.
    Run {
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Reads commands from stdin, one per line.
    Repl,
    /// Lists the skill catalogue.
    Skills {
        /// Only skills matching this query.
        #[arg(long)]
        query: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = Runtime::new()?;
    let pipeline = build_pipeline(&cli.global)?;
    match cli.command {
        Commands::Run { commands } => {
            let session = pipeline.sessions().open_anonymous();
            for text in commands {
                let response =
                    runtime.block_on(submit(&pipeline, &session, &text, cli.global.confirm))?;
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
            Ok(())
        }
        Commands::Repl => repl(&runtime, &pipeline, cli.global.confirm),
        Commands::Skills { query } => {
            let mut skills = pipeline.skills();
            if let Some(query) = query {
                let names = pipeline.dispatcher().registry().suggest(&query);
                skills.retain(|skill| names.contains(&skill.name));
            }
            for skill in skills {
                println!(
                    "{} | {} | {} | {}",
                    skill.name,
                    skill.category.label(),
                    skill.parameters.join(", "),
                    skill.description
                );
            }
            Ok(())
        }
    }
}

fn build_pipeline(args: &GlobalArgs) -> Result<CommandPipeline> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if let Some(path) = &args.log {
        config.telemetry.log_path = Some(path.clone());
    }
    if let Some(path) = &args.event_log {
        config.telemetry.event_log = Some(path.clone());
    }
    let bridge: Arc<dyn BridgeAdapter> = match &args.host {
        Some(address) => Arc::new(TcpBridge::new(address.clone())),
        None => Arc::new(LoopbackBridge::new()),
    };
    CommandPipeline::builder(config)
        .bridge(bridge)
        .build()
        .context("building command pipeline")
}

async fn submit(
    pipeline: &CommandPipeline,
    session: &str,
    text: &str,
    confirm: bool,
) -> Result<CommandResponse> {
    let response = if confirm {
        pipeline.submit_confirmed(session, text).await
    } else {
        pipeline.submit(session, text).await
    };
    response.with_context(|| format!("submitting '{text}'"))
}

fn repl(runtime: &Runtime, pipeline: &CommandPipeline, confirm: bool) -> Result<()> {
    let session = pipeline.sessions().open_anonymous();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    write!(stdout, "miktos> ")?;
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let text = line.trim();
        match text {
            "" => {}
            "exit" | "quit" => break,
            "status" => {
                let snapshot = pipeline.snapshot(&session);
                writeln!(stdout, "{}", serde_json::to_string_pretty(&snapshot)?)?;
            }
            _ => {
                let response = runtime.block_on(submit(pipeline, &session, text, confirm))?;
                writeln!(stdout, "{}", serde_json::to_string_pretty(&response)?)?;
            }
        }
        write!(stdout, "miktos> ")?;
        stdout.flush()?;
    }
    if let Some(snapshot) = pipeline.close_session(&session) {
        writeln!(stdout, "closed session with {} command(s)", snapshot.command_history.len())?;
    }
    Ok(())
}
