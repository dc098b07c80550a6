mod cli;

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use seeq_client::{spawn_transport, OperatorAction, SessionController, SessionOutcome};
use seeq_engine::{EngineEvent, SessionStatus};
use seeq_wire::ChannelId;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Handle subcommands first (before validating the query argument)
    if let Some(cmd) = &cli.command {
        match cmd {
            Commands::ShowConfig => {
                let config = load_config(&cli)?;
                println!("{}", toml::to_string_pretty(&config)?);
                return Ok(());
            }
        }
    }

    let query = cli
        .query
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no query given; run `seeq \"<question>\"`"))?;

    let config = load_config(&cli)?;
    let outcome = run_query(&cli, &config, &query).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome.channels)?);
    } else {
        print_outcome(&outcome);
    }

    match outcome.status {
        SessionStatus::Completed => Ok(()),
        other => anyhow::bail!("session ended with status {other:?}"),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<seeq_config::Config> {
    let mut config = seeq_config::load(cli.config.as_deref())?;
    if let Some(url) = &cli.url {
        config.backend.url = url.clone();
    }
    if let Some(token) = &cli.token {
        config.backend.token = Some(token.clone());
    }
    Ok(config)
}

async fn run_query(
    cli: &Cli,
    config: &seeq_config::Config,
    query: &str,
) -> anyhow::Result<SessionOutcome> {
    let (transport, transport_rx) =
        spawn_transport(config.backend.clone(), config.transport.clone());
    let (actions_tx, actions_rx) = mpsc::channel(16);
    let (events_tx, mut events_rx) = mpsc::channel(256);

    let controller =
        SessionController::new(&config.engine, transport, transport_rx, actions_rx, events_tx);
    let query_owned = query.to_string();
    let run = tokio::spawn(async move { controller.run(&query_owned).await });

    let interactive = cli.is_interactive();
    while let Some(event) = events_rx.recv().await {
        match event {
            EngineEvent::ChannelUpdated(id) => {
                eprintln!("[{}] updated", id);
            }
            EngineEvent::StatusChanged(status) => {
                eprintln!("-- session {status:?}");
            }
            EngineEvent::Notice(text) => {
                eprintln!("-- {text}");
            }
            EngineEvent::SessionFailed { message } => {
                eprintln!("!! {message}");
            }
            EngineEvent::FeedbackRequested { prompt } => {
                let action = if interactive {
                    ask_operator(&prompt).context("reading feedback reply")?
                } else {
                    // Unattended runs approve checkpoints so the pipeline can
                    // proceed without a human in the loop.
                    eprintln!("?? {prompt}");
                    eprintln!("-- auto-approving (non-interactive run)");
                    OperatorAction::Approve
                };
                if actions_tx.send(action).await.is_err() {
                    break;
                }
            }
        }
    }

    run.await.context("controller task panicked")?
}

/// Prompt the operator on stderr and read one reply line from stdin.
/// An empty line approves the checkpoint.
fn ask_operator(prompt: &str) -> anyhow::Result<OperatorAction> {
    eprintln!("\n?? {prompt}");
    eprint!("reply (empty = approve): ");
    std::io::stderr().flush().ok();

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("reading stdin")?;
    let line = line.trim();
    if line.is_empty() {
        Ok(OperatorAction::Approve)
    } else {
        Ok(OperatorAction::Reply(line.to_string()))
    }
}

fn print_outcome(outcome: &SessionOutcome) {
    for channel in &outcome.channels {
        // Skip channels the backend ruled out or never wrote to.
        if channel.not_applicable || (!channel.finalized && channel.history.is_empty()) {
            continue;
        }
        if channel.text.is_empty() {
            continue;
        }
        println!("═══ {} ═══", heading(channel.id));
        println!("{}\n", channel.text.trim_end());
    }
    println!("session {}: {:?}", outcome.session_id, outcome.status);
}

fn heading(id: ChannelId) -> &'static str {
    match id {
        ChannelId::Analysis => "Analysis",
        ChannelId::Sql => "SQL",
        ChannelId::Explanation => "Explanation",
        ChannelId::Data => "Results",
        ChannelId::Visualization => "Visualization",
        ChannelId::Process => "Process log",
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
