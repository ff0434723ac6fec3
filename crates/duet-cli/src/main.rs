//! `duet`: run two-agent simulations k times and report pass@k.
//!
//! ## Commands
//!
//! - `run`: start a batch and stream committed turns as they land
//! - `models`: list the server's model catalog
//! - `show`: print a remote run's state
//! - `edit` / `rerun`: change a finished run's conversation

mod render;
mod sim_config;

use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use duet_core::observability::{LogSettings, init_observability};
use duet_core::{RemoteStatus, RunId};
use duet_harness::ClientConfig;
use duet_harness::prelude::*;

use crate::render::TurnPrinter;

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "duet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run candidate/sim simulations and score them with pass@k", long_about = None)]
struct Cli {
    /// Simulation server base URL (overrides DUET_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log filter such as `debug` or `duet_harness=trace` (overrides
    /// DUET_LOG_LEVEL and RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Shorthand for `--log-level debug`
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a batch of independent runs
    Run {
        /// Number of runs (k)
        #[arg(short, long, default_value = "1")]
        runs: usize,

        /// JSON simulation config (default: built-in scenario)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print final snapshots and score as JSON instead of live turns
        #[arg(long)]
        json: bool,
    },

    /// List available models
    Models,

    /// Print a remote run's state
    Show {
        run_id: String,
    },

    /// Replace the text of one committed turn
    Edit {
        run_id: String,
        turn: u32,
        content: String,

        /// Replacement reasoning (kept as is when omitted)
        #[arg(long)]
        reasoning: Option<String>,
    },

    /// Drop turns from TURN onwards so the run can continue from there
    Rerun {
        run_id: String,
        turn: u32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_observability(log_settings(&cli));

    if let Err(err) = dispatch(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

/// `warn` by default so routine progress does not interleave with turns.
fn log_settings(cli: &Cli) -> LogSettings {
    let settings = LogSettings::from_env("warn");
    match (&cli.log_level, cli.verbose) {
        (Some(filter), _) => settings.filter(filter.as_str()),
        (None, true) => settings.filter("debug"),
        (None, false) => settings,
    }
}

async fn dispatch(cli: Cli) -> CliResult {
    let mut client = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url {
        client = client.base_url(url);
    }
    let transport = Arc::new(HttpTransport::new(client)?);

    match cli.command {
        Commands::Run { runs, config, json } => {
            let config = sim_config::load(config.as_deref())?;
            let orchestrator = RunOrchestrator::new(transport, OrchestratorConfig::from_env()?);
            run(&orchestrator, &config, runs, json).await
        }
        Commands::Models => {
            let orchestrator = RunOrchestrator::new(transport, OrchestratorConfig::default());
            print!("{}", render::catalog(orchestrator.models().await?));
            Ok(())
        }
        Commands::Show { run_id } => show(transport.as_ref(), &RunId::new(run_id)).await,
        Commands::Edit {
            run_id,
            turn,
            content,
            reasoning,
        } => {
            let run_id = RunId::new(run_id);
            transport
                .update_turn(&run_id, turn, &content, reasoning.as_deref())
                .await?;
            info!(run_id = %run_id, turn, "turn updated");
            show(transport.as_ref(), &run_id).await
        }
        Commands::Rerun { run_id, turn } => {
            let run_id = RunId::new(run_id);
            transport.rerun_from(&run_id, turn).await?;
            info!(run_id = %run_id, turn, "run truncated for rerun");
            show(transport.as_ref(), &run_id).await
        }
    }
}

async fn run(
    orchestrator: &RunOrchestrator,
    config: &SimulationConfig,
    runs: usize,
    json: bool,
) -> CliResult {
    let batch = orchestrator.prepare(config, runs)?;
    let abort = batch.abort_handle();
    let mut updates = orchestrator.store().subscribe();
    let mut printer = TurnPrinter::default();
    let mut execute = pin!(orchestrator.execute(batch));
    let mut interrupt = pin!(tokio::signal::ctrl_c());

    let report = loop {
        tokio::select! {
            report = &mut execute => break report,
            _ = &mut interrupt, if !abort.is_aborted() => {
                warn!("interrupted, cancelling runs");
                abort.abort();
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut execute).await;
                }
                let runs = updates.borrow_and_update();
                if !json {
                    for line in printer.new_lines(&runs) {
                        println!("{line}");
                    }
                }
            }
        }
    };

    let snapshots = orchestrator.snapshots();
    if json {
        println!("{}", render::json_report(&report, &snapshots)?);
    } else {
        for line in printer.new_lines(&updates.borrow_and_update()) {
            println!("{line}");
        }
        println!("{}", render::summary(&report));
    }
    Ok(())
}

async fn show(transport: &dyn SimulationTransport, run_id: &RunId) -> CliResult {
    let state = transport.get_run(run_id).await?;
    let mut run = RunSnapshot::pending(1).with_remote_state(&state);
    if matches!(state.status, RemoteStatus::Completed | RemoteStatus::Failed) {
        run = run.finished();
    }
    print!("{}", render::transcript(&run));
    println!("status: {:?}, turn {}", state.status, state.current_turn);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("duet").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn log_flags_override_the_environment_filter() {
        assert_eq!(log_settings(&parse(&["-v", "models"])).filter, "debug");
        assert_eq!(
            log_settings(&parse(&["models", "--log-level", "duet_harness=trace", "-v"])).filter,
            "duet_harness=trace"
        );
    }

    #[test]
    fn run_arguments_parse() {
        let cli = parse(&["--api-url", "http://h/api", "run", "-r", "3", "--json"]);
        assert_eq!(cli.api_url.as_deref(), Some("http://h/api"));
        assert!(matches!(
            cli.command,
            Commands::Run {
                runs: 3,
                config: None,
                json: true
            }
        ));
    }
}
