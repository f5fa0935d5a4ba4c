use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use diagram_model::{ActionType, EventKind, StateUpdate};
use serde::Deserialize;
use sync_engine::{DiagramEngine, EngineConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Engine settings file; `diagram.toml` in the working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Forces debug mode and debug-level logging.
    #[arg(long)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replays a JSON scenario and prints every delivered event as one JSON line.
    Run { script: PathBuf },
    /// Lists action wire names.
    Actions,
    /// Lists public event names.
    Events,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
enum Step {
    Apply {
        action: String,
        #[serde(default)]
        update: StateUpdate,
    },
    Transaction {
        actions: Vec<String>,
        #[serde(default)]
        update: StateUpdate,
    },
    SignalNode {
        id: String,
    },
    SignalEdge {
        id: String,
    },
    Wait {
        ms: u64,
    },
    Settle,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Command::Actions => {
            for action in ActionType::ALL {
                println!("{}", action.as_str());
            }
        }
        Command::Events => {
            for kind in EventKind::ALL.iter().filter(|kind| !kind.is_internal()) {
                println!("{kind}");
            }
        }
        Command::Run { script } => {
            let mut config = EngineConfig::load(cli.config.as_deref())?;
            config.debug_mode |= cli.debug;
            let raw = std::fs::read_to_string(&script)
                .with_context(|| format!("failed to read scenario {}", script.display()))?;
            let scenario: Scenario = serde_json::from_str(&raw)
                .with_context(|| format!("invalid scenario {}", script.display()))?;
            replay(config, scenario).await?;
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn replay(config: EngineConfig, scenario: Scenario) -> Result<()> {
    let engine = DiagramEngine::new(config);
    for kind in EventKind::ALL.iter().filter(|kind| !kind.is_internal()) {
        engine.events().on(*kind, |event| {
            println!("{}", serde_json::to_string(event)?);
            Ok(())
        });
    }

    for (index, step) in scenario.steps.into_iter().enumerate() {
        match step {
            Step::Apply { action, update } => {
                let outcome = engine.apply_named(&action, update).await?;
                info!(step = index, %action, outcome = ?outcome.flow(), "applied");
            }
            Step::Transaction { actions, update } => {
                let actions = actions
                    .iter()
                    .map(|name| name.parse::<ActionType>())
                    .collect::<Result<Vec<_>, _>>()?;
                let outcome = engine.transaction(actions, update).await?;
                info!(step = index, outcome = ?outcome.flow(), "applied transaction");
            }
            Step::SignalNode { id } => engine.measurements().signal_node_measurement(&id),
            Step::SignalEdge { id } => engine.measurements().signal_edge_measurement(&id),
            Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            Step::Settle => engine.measurements().wait_for_measurements().await,
        }
    }

    // Lets a pending diagram-initialized delivery run before teardown.
    engine.measurements().wait_for_measurements().await;
    tokio::task::yield_now().await;
    if engine.measurements().has_pending_measurements() {
        warn!("measurements still pending at exit");
    }
    engine.destroy();
    Ok(())
}
